pub mod config;
pub mod pipeline;

pub use config::ScanConfig;
pub use pipeline::{Outcome, PipelineError, run};
