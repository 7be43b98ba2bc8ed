use std::path::{Path, PathBuf};

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::probe::{ProbeReport, probe_files};
use crate::{ProbeConfig, ScanError, dump, walk};

/// Well-known paths inside a ripped disc directory.
#[derive(Debug, Clone)]
pub struct DiscLayout {
    pub root: PathBuf,
}

impl DiscLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn dump_path(&self) -> PathBuf {
        self.root.join("tech").join("structure.lsdvd.yml")
    }

    pub fn fingerprint_path(&self) -> PathBuf {
        self.root.join("tech").join("fingerprint.json")
    }

    pub fn video_dir(&self) -> PathBuf {
        self.root.join("mkv")
    }

    pub fn ocr_path(&self) -> PathBuf {
        self.root.join("meta").join("menu_ocr.json")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join("meta").join("metadata_ia.json")
    }

    /// Directory name, or the head of the fingerprint digest when there is none.
    pub fn disc_uid(&self, fingerprint_sha256: Option<&str>) -> String {
        let name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().trim().to_string())
            .filter(|n| !n.is_empty());
        match (name, fingerprint_sha256) {
            (Some(name), _) => name,
            (None, Some(digest)) => digest.chars().take(16).collect(),
            (None, None) => "unknown-disc".to_string(),
        }
    }
}

/// Load the fingerprint blob. Absent or malformed files yield `None`.
pub fn load_fingerprint(path: &Path) -> Option<Value> {
    let bytes = std::fs::read(path).ok()?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(value @ Value::Object(_)) => Some(value),
        Ok(_) => {
            warn!(path = %path.display(), "fingerprint is not a JSON object, ignoring");
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "invalid fingerprint, ignoring");
            None
        }
    }
}

/// SHA-256 of the fingerprint's canonical (key-sorted, compact) JSON form.
pub fn fingerprint_digest(fingerprint: &Value) -> String {
    // serde_json's default map keeps keys sorted, so this is canonical.
    let canonical = fingerprint.to_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Extract the title list of a disc from its structure dump and/or video files.
///
/// Fails only when the disc holds no media at all, or when nothing could be
/// turned into a title.
pub async fn scan_titles(layout: &DiscLayout, cfg: &ProbeConfig) -> Result<ProbeReport, ScanError> {
    let dump_path = layout.dump_path();
    let files = walk::video_files(&layout.video_dir());
    let has_dump = dump_path.is_file();

    if !has_dump && files.is_empty() {
        return Err(ScanError::NoMedia(layout.root.clone()));
    }

    let mut report = if files.is_empty() {
        ProbeReport::default()
    } else {
        probe_files(&files, cfg).await
    };

    if has_dump {
        match dump::read_dump(&dump_path) {
            Ok(dumped) if !dumped.titles.is_empty() => {
                report.errors.extend(dumped.errors);
                report.titles = dump::merge_dump(dumped.titles, &report.titles);
                report.source = "lsdvd".to_string();
                report.dump = Some(dump_path);
            }
            Ok(dumped) => {
                report.errors.extend(dumped.errors);
                warn!(path = %dump_path.display(), "structure dump lists no titles");
                report.errors.push("structure dump lists no titles".to_string());
            }
            Err(e) => {
                warn!(path = %dump_path.display(), error = %e, "cannot use structure dump");
                report.errors.push(format!("structure dump: {e}"));
            }
        }
    }

    if report.titles.is_empty() {
        return Err(ScanError::NoTitles {
            path: layout.root.clone(),
            errors: report.errors,
        });
    }

    info!(
        source = %report.source,
        titles = report.titles.len(),
        errors = report.errors.len(),
        "disc structure extracted"
    );
    Ok(report)
}
