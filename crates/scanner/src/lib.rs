use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod disc;
pub mod dump;
pub mod labels;
pub mod lang;
pub mod probe;
pub mod walk;

pub use disc::{DiscLayout, scan_titles};
pub use labels::{NormalizedLabels, OcrObservation};
pub use probe::{ProbeReport, ProbeTool};

/// Binaries and limits used when probing extracted video files.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub mkvmerge_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
    /// Last-resort tool; `None` disables it.
    pub mediainfo_bin: Option<PathBuf>,
    /// Per-invocation limit.
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            mkvmerge_bin: PathBuf::from("mkvmerge"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            mediainfo_bin: Some(PathBuf::from("mediainfo")),
            timeout: Duration::from_secs(120),
        }
    }
}

impl ProbeConfig {
    /// Tools in the order they are tried.
    pub fn tools(&self) -> Vec<(ProbeTool, &Path)> {
        let mut tools = vec![
            (ProbeTool::Mkvmerge, self.mkvmerge_bin.as_path()),
            (ProbeTool::Ffprobe, self.ffprobe_bin.as_path()),
        ];
        if let Some(bin) = &self.mediainfo_bin {
            tools.push((ProbeTool::Mediainfo, bin.as_path()));
        }
        tools
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("no structure dump and no video files in {0}")]
    NoMedia(PathBuf),
    #[error("no titles could be probed in {path}: {}", .errors.join("; "))]
    NoTitles { path: PathBuf, errors: Vec<String> },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
