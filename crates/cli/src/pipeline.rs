//! One disc, end to end: probe, normalize, classify, arbitrate, merge,
//! validate, write.

use std::path::PathBuf;
use std::time::Instant;

use discmeta_core::{LlmSource, OcrSource, Sources, TechSource, ValidationError};
use discmeta_metadata::{
    ArbitrationInput, CompletionClient, WriteError, arbitrate, classify, fallback_record, merge,
    validate, write_metadata,
};
use discmeta_scanner::disc::{fingerprint_digest, load_fingerprint};
use discmeta_scanner::{DiscLayout, ScanError, labels, scan_titles};
use tracing::{info, warn};

use crate::config::ScanConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The artifact already existed; nothing was probed or written.
    NoOp(PathBuf),
    Written(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Write(#[from] WriteError),
}

impl PipelineError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Scan(_) | Self::Write(_) => 1,
        }
    }
}

/// Classify the disc under `cfg.disc_dir` and write its metadata artifact.
///
/// `client` is `None` when the LLM is disabled or could not be set up; the
/// heuristic record is then the only candidate.
pub async fn run(
    cfg: &ScanConfig,
    client: Option<&dyn CompletionClient>,
) -> Result<Outcome, PipelineError> {
    let started = Instant::now();
    let layout = DiscLayout::new(&cfg.disc_dir);
    let target = layout.metadata_path();

    if target.exists() {
        info!(path = %target.display(), "metadata already present, skipping disc");
        return Ok(Outcome::NoOp(target));
    }

    let fingerprint = load_fingerprint(&layout.fingerprint_path());
    let digest = fingerprint.as_ref().map(fingerprint_digest);
    let disc_uid = layout.disc_uid(digest.as_deref());
    info!(disc_uid = %disc_uid, dir = %cfg.disc_dir.display(), "processing disc");

    let report = scan_titles(&layout, &cfg.probe_config()).await?;
    for error in &report.errors {
        warn!(disc_uid = %disc_uid, error = %error, "probe diagnostic");
    }

    let ocr_path = layout.ocr_path();
    let observations = labels::read_observations(&ocr_path);
    let labels = labels::normalize(&observations);

    let hints = classify(&report.titles, Some(&labels), &cfg.heuristic_config());
    let fallback = fallback_record(&disc_uid, &report.titles, &hints);
    info!(
        disc_uid = %disc_uid,
        titles = report.titles.len(),
        content_type = %hints.content_type,
        confidence = hints.confidence,
        "heuristic classification"
    );

    let input = ArbitrationInput {
        disc_uid: &disc_uid,
        titles: &report.titles,
        labels: &labels,
        fingerprint: fingerprint.as_ref(),
        hints: &hints,
        fallback: &fallback,
    };
    let arbitration = arbitrate(client, &input).await;

    let mut record = merge(&fallback, arbitration.parsed.as_ref(), &report.titles).record;
    record.sources = Sources {
        tech: TechSource {
            tool: report.source.clone(),
            tool_version: report.tool_version.clone(),
            dump: report.dump.as_ref().map(|p| p.display().to_string()),
            errors: report.errors.clone(),
        },
        ocr: OcrSource {
            path: ocr_path.is_file().then(|| ocr_path.display().to_string()),
            observations: observations.len(),
            language: labels.language.clone(),
        },
        llm: LlmSource {
            provider: client.map_or_else(|| cfg.llm_provider.to_string(), |c| c.name().to_string()),
            model: client.map_or_else(|| cfg.llm_model.clone(), |c| c.model().to_string()),
            used: arbitration.parsed.is_some(),
            attempts: arbitration.attempts,
            error: arbitration.error,
        },
        fingerprint_sha256: digest,
        layout_version: cfg.layout_version.clone(),
        elapsed_seconds: (started.elapsed().as_secs_f64() * 1000.0).round() / 1000.0,
    };

    let record = validate(record, &report.titles)?;
    write_metadata(&target, &record)?;
    Ok(Outcome::Written(target))
}
