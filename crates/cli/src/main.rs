use std::process::ExitCode;

use clap::Parser;
use discmeta_cli::{Outcome, PipelineError, ScanConfig, run};
use discmeta_metadata::{CompletionClient, build_client};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    // stdout carries the artifact path only
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cfg = ScanConfig::parse();

    let client: Option<Box<dyn CompletionClient>> = if cfg.llm_enable {
        match build_client(&cfg.llm_config()) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "LLM client unavailable, continuing with heuristics only");
                None
            }
        }
    } else {
        info!("LLM disabled");
        None
    };

    match run(&cfg, client.as_deref()).await {
        Ok(Outcome::NoOp(path)) => {
            info!(path = %path.display(), "nothing to do");
            Ok(ExitCode::SUCCESS)
        }
        Ok(Outcome::Written(path)) => {
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(PipelineError::Validation(err)) => {
            for violation in &err.violations {
                error!(field = %violation.field, "{}", violation.message);
            }
            error!(
                dir = %cfg.disc_dir.display(),
                violations = err.violations.len(),
                "metadata rejected, nothing written"
            );
            Ok(ExitCode::from(2))
        }
        Err(e) => {
            error!(dir = %cfg.disc_dir.display(), error = %e, "disc could not be processed");
            Ok(ExitCode::from(e.exit_code()))
        }
    }
}
