pub mod chat;
pub mod cli;
pub mod config;
pub mod embed;
pub mod error;
pub mod eval;
pub mod exit_codes;
pub mod gemini;
pub mod index;
pub mod interactive;
pub mod llm;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod rerank;
pub mod retrieval;
pub mod retry;
pub mod store;

pub use error::{RagError, Result};
