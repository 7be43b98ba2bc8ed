use std::path::{Path, PathBuf};
use tracing::debug;

static VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "m4v", "m2ts", "mts", "ts", "vob", "mpg", "mpeg", "avi", "mov", "webm",
];

/// Check if a file has a video extension.
pub fn is_video_file(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        }
        _ => false,
    }
}

/// List the extracted video files of a disc, sorted by file name.
///
/// A missing or unreadable directory yields an empty list.
pub fn video_files(dir: &Path) -> Vec<PathBuf> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) => {
            debug!(path = %dir.display(), error = %e, "cannot read video directory");
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = read_dir
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !is_video_file(&name) {
                debug!(file = %name, "skipping non-video entry");
                return None;
            }
            Some(entry.path())
        })
        .collect();

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    files
}
