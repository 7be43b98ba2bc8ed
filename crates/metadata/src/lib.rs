pub mod arbitrator;
pub mod heuristics;
pub mod merge;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod validate;
pub mod writer;

use thiserror::Error;

pub use arbitrator::{ArbitrationInput, ArbitrationOutcome, LlmCandidate, arbitrate};
pub use heuristics::{HeuristicConfig, HeuristicHints, classify, fallback_record};
pub use merge::{MergeResult, merge};
pub use provider::{CompletionClient, LlmConfig, LlmProvider, build_client};
pub use validate::validate;
pub use writer::{MetadataDocument, WriteError, read_metadata, write_metadata};

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("provider error: {0}")]
    Provider(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
