//! Terminal interaction: reading a job description and the chat loop.
//!
//! Both are generic over the input and output streams so they can be driven
//! from tests.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

use crate::chat::ConversationSession;
use crate::error::{RagError, Result};

pub const DEFAULT_JOB_DESCRIPTION: &str = "We are looking for a Senior Accountant with 5+ years of experience in \
financial reporting, tax preparation, and audit support. The ideal candidate \
should have strong knowledge of GAAP, proficiency in accounting software \
(QuickBooks, SAP), and excellent analytical skills. CPA certification is required.";

const EXIT_COMMANDS: &[&str] = &["exit", "quit", "bye", "q"];

/// Read lines until two consecutive blank lines or EOF. `default` on the first
/// line, or no text at all, selects [`DEFAULT_JOB_DESCRIPTION`].
pub async fn read_job_description<R, W>(input: &mut R, out: &mut W) -> Result<String>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "Enter the job description (finish with two empty lines).")?;
    writeln!(out, "Type 'default' to use the sample Senior Accountant role.")?;
    out.flush()?;

    let mut lines: Vec<String> = Vec::new();
    let mut blank_run = 0;
    let mut reader = input.lines();
    while let Some(line) = reader.next_line().await? {
        let line = line.trim_end().to_string();
        if lines.is_empty() && line.trim().eq_ignore_ascii_case("default") {
            return Ok(DEFAULT_JOB_DESCRIPTION.to_string());
        }
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run >= 2 {
                break;
            }
        } else {
            blank_run = 0;
            lines.push(line);
        }
    }

    let text = lines.join("\n").trim().to_string();
    if text.is_empty() {
        writeln!(out, "No job description entered. Using default.")?;
        return Ok(DEFAULT_JOB_DESCRIPTION.to_string());
    }
    Ok(text)
}

/// Drive a chat session from `input` until an exit command, EOF or
/// cancellation, then close the session. Failed turns are reported and the
/// loop continues.
pub async fn run_chat_loop<R, W>(
    session: &mut ConversationSession,
    input: &mut R,
    out: &mut W,
    cancel: &CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "Welcome to the HireFlow chatbot.")?;
    writeln!(out, "Ask about the candidates; follow-up questions keep their context.")?;
    writeln!(out, "Type 'reset' to start over, or 'exit', 'quit' or 'bye' to leave.")?;
    writeln!(out)?;

    let mut reader = input.lines();
    loop {
        write!(out, "You: ")?;
        out.flush()?;

        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            line = reader.next_line() => line?,
        };
        let Some(line) = next else {
            writeln!(out)?;
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if EXIT_COMMANDS.contains(&question.to_lowercase().as_str()) {
            writeln!(out, "Chatbot: Thank you for using HireFlow! Goodbye!")?;
            break;
        }
        if question.eq_ignore_ascii_case("reset") {
            session.reset()?;
            writeln!(out, "Chatbot: Conversation reset.")?;
            continue;
        }

        match session.send_with_cancel(question, cancel).await {
            Ok(reply) => writeln!(out, "Chatbot: {reply}\n")?,
            Err(RagError::Cancelled) => {
                writeln!(out, "\nChatbot: Chat interrupted. Goodbye!")?;
                break;
            }
            Err(err @ (RagError::SessionClosed | RagError::Unauthorized(_))) => return Err(err),
            Err(err) => {
                tracing::warn!("Chat turn failed: {err}");
                writeln!(out, "Chatbot: Sorry, I encountered an error: {err}\n")?;
            }
        }
    }

    session.close();
    Ok(())
}
