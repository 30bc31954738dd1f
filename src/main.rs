use std::io::{self, Write};

use clap::Parser;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use hireflow::cli::Cli;
use hireflow::config::Settings;
use hireflow::error::RagError;
use hireflow::exit_codes;
use hireflow::pipeline::{JobSource, Pipeline, RunRequest};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Exit explicitly: an abandoned stdin read would otherwise hold the
    // runtime open until the next line arrives.
    match real_main(cli).await {
        Ok(()) => std::process::exit(exit_codes::EXIT_SUCCESS),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(exit_codes::for_error(&err));
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "hireflow=debug" } else { "hireflow=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}

async fn real_main(cli: Cli) -> Result<(), RagError> {
    cli.validate().map_err(RagError::InvalidArgument)?;

    let mut settings = Settings::load(cli.config.as_deref())?;
    settings.apply_env(|name| std::env::var(name).ok())?;
    cli.apply_to(&mut settings);

    let job = match (&cli.job_description, &cli.job_file) {
        (Some(text), _) => JobSource::Inline(text.clone()),
        (None, Some(path)) => JobSource::File(path.clone()),
        (None, None) if cli.ask_job_description => JobSource::Prompt,
        (None, None) => JobSource::Unspecified,
    };
    let request = RunRequest {
        mode: cli.mode,
        job,
        detailed_evaluation: cli.detailed_evaluation,
        interactive: cli.interactive_enabled(),
        skip_report: cli.skip_report,
        format: cli.output,
    };
    let pipeline = Pipeline::from_settings(settings, &request)?;

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let mut input = BufReader::new(tokio::io::stdin());
    let mut out = io::stdout();
    pipeline.run(&request, &mut input, &mut out, &cancel).await?;
    out.flush()?;
    Ok(())
}

/// First Ctrl-C cancels in-flight work; a second one exits immediately.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupted; finishing up (press Ctrl-C again to abort)");
        cancel.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(exit_codes::EXIT_INTERRUPTED);
        }
    });
}
