use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::{EmbeddingBackend, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Ingest, rank, report, evaluate and chat.
    Full,
    /// Ingest, rank and print the summary report.
    Search,
    /// Chat over a saved index.
    Chatbot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "hireflow",
    version,
    about = "Rank resumes against a job description and chat about the candidates"
)]
pub struct Cli {
    #[arg(long, value_enum, default_value_t = Mode::Full)]
    pub mode: Mode,

    #[arg(long)]
    pub resume_dir: Option<PathBuf>,

    #[arg(short = 'j', long)]
    pub job_description: Option<String>,

    #[arg(short = 'f', long)]
    pub job_file: Option<PathBuf>,

    /// Prompt for the job description on stdin.
    #[arg(long)]
    pub ask_job_description: bool,

    #[arg(long)]
    pub top_k: Option<usize>,

    #[arg(long)]
    pub top_n: Option<usize>,

    /// Boost candidates mentioning this keyword; repeatable.
    #[arg(long = "keyword")]
    pub keywords: Vec<String>,

    #[arg(long)]
    pub boost_weight: Option<f32>,

    // Chat is on by default; the last of the two flags wins.
    #[arg(short = 'i', long, overrides_with = "no_interactive")]
    pub interactive: bool,

    #[arg(long = "no-interactive", overrides_with = "interactive")]
    pub no_interactive: bool,

    #[arg(short = 'e', long)]
    pub detailed_evaluation: bool,

    #[arg(long)]
    pub skip_report: bool,

    #[arg(long)]
    pub index_path: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub embedding: Option<EmbeddingBackend>,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn validate(&self) -> Result<(), String> {
        let job_inputs = [
            self.job_description.is_some(),
            self.job_file.is_some(),
            self.ask_job_description,
        ];
        if job_inputs.iter().filter(|set| **set).count() > 1 {
            return Err(
                "use only one of --job-description, --job-file and --ask-job-description"
                    .to_string(),
            );
        }
        if self.top_k == Some(0) {
            return Err("top-k must be > 0".to_string());
        }
        if self.top_n == Some(0) {
            return Err("top-n must be > 0".to_string());
        }
        if let Some(w) = self.boost_weight {
            if !w.is_finite() || w < 0.0 {
                return Err("boost-weight must be a non-negative number".to_string());
            }
        }
        Ok(())
    }

    pub fn interactive_enabled(&self) -> bool {
        !self.no_interactive
    }

    /// Flags are the last configuration layer.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(dir) = &self.resume_dir {
            settings.resume_dir = dir.clone();
        }
        if let Some(path) = &self.index_path {
            settings.index_path = path.clone();
        }
        if let Some(k) = self.top_k {
            settings.retrieval.top_k = k;
        }
        if let Some(n) = self.top_n {
            settings.rerank.top_n = n;
        }
        if !self.keywords.is_empty() {
            settings.rerank.keywords = self.keywords.clone();
        }
        if let Some(w) = self.boost_weight {
            settings.rerank.boost_weight = w;
        }
        if let Some(backend) = self.embedding {
            settings.embedding.backend = backend;
        }
    }
}
