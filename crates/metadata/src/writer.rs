use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use discmeta_core::MetadataRecord;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize metadata: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("persist metadata: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// The on-disk artifact: the record plus its generation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    #[serde(flatten)]
    pub record: MetadataRecord,
    pub generated_at: DateTime<Utc>,
}

/// Write a validated record as pretty JSON.
///
/// The document is written to a temporary file next to `path` and renamed
/// over it, so readers never observe a partial artifact.
pub fn write_metadata(path: &Path, record: &MetadataRecord) -> Result<MetadataDocument, WriteError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let doc = MetadataDocument {
        record: record.clone(),
        generated_at: Utc::now(),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, &doc)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;

    info!(
        path = %path.display(),
        disc_uid = %doc.record.disc_uid,
        content_type = %doc.record.content_type,
        items = doc.record.items.len(),
        "metadata written"
    );
    Ok(doc)
}

pub fn read_metadata(path: &Path) -> Result<MetadataDocument, WriteError> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
