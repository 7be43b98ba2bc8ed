use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use discmeta_core::Title;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{ProbeConfig, lang};

/// External tools able to describe a video file as JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeTool {
    Mkvmerge,
    Ffprobe,
    Mediainfo,
}

impl ProbeTool {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mkvmerge => "mkvmerge",
            Self::Ffprobe => "ffprobe",
            Self::Mediainfo => "mediainfo",
        }
    }

    fn probe_args(self) -> &'static [&'static str] {
        match self {
            Self::Mkvmerge => &["-J"],
            Self::Ffprobe => &[
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-show_chapters",
            ],
            Self::Mediainfo => &["--Output=JSON"],
        }
    }

    fn version_flag(self) -> &'static str {
        match self {
            Self::Mkvmerge => "--version",
            Self::Ffprobe => "-version",
            Self::Mediainfo => "--Version",
        }
    }

    /// mkvmerge exits with 1 when it only emitted warnings.
    fn accepts(self, output: &Output) -> bool {
        match self {
            Self::Mkvmerge => matches!(output.status.code(), Some(0) | Some(1)),
            _ => output.status.success(),
        }
    }

    /// Parse this tool's JSON description of a single file.
    pub fn parse(self, raw: &Value) -> Result<ProbedFile, String> {
        match self {
            Self::Mkvmerge => parse_mkvmerge(raw),
            Self::Ffprobe => parse_ffprobe(raw),
            Self::Mediainfo => parse_mediainfo(raw),
        }
    }
}

impl std::fmt::Display for ProbeTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Technical facts extracted from one file, before it is numbered as a title.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbedFile {
    pub runtime_seconds: f64,
    pub audio_langs: BTreeSet<String>,
    pub sub_langs: BTreeSet<String>,
    pub container_title: Option<String>,
    pub chapters: Option<u32>,
}

impl ProbedFile {
    fn into_title(self, index: u32, filename: String, size_bytes: Option<u64>) -> Title {
        Title {
            index,
            runtime_seconds: self.runtime_seconds,
            audio_langs: self.audio_langs,
            sub_langs: self.sub_langs,
            filename: Some(filename),
            container_title: self.container_title,
            chapters: self.chapters,
            size_bytes,
        }
    }
}

/// What the prober learned about a disc, plus per-file diagnostics.
#[derive(Debug, Clone, Default)]
pub struct ProbeReport {
    /// Name of the tool (or dump format) the titles came from.
    pub source: String,
    pub tool_version: Option<String>,
    /// Structure dump the titles were read from, if any.
    pub dump: Option<PathBuf>,
    pub titles: Vec<Title>,
    pub errors: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error("binary not found: {0}")]
    Missing(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("spawn failed: {0}")]
    Spawn(std::io::Error),
}

async fn run_command(bin: &Path, args: &[OsString], timeout: Duration) -> Result<Output, RunError> {
    let mut cmd = tokio::process::Command::new(bin);
    cmd.args(args).kill_on_drop(true);
    debug!(command = ?cmd.as_std(), "running probe command");

    match tokio::time::timeout(timeout, cmd.output()).await {
        Err(_) => Err(RunError::Timeout(timeout)),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(RunError::Missing(bin.display().to_string()))
        }
        Ok(Err(e)) => Err(RunError::Spawn(e)),
        Ok(Ok(output)) => Ok(output),
    }
}

/// Probe `files` with the first configured tool that is installed and yields titles.
///
/// Never fails: a file the tool chokes on is skipped and recorded in
/// `errors`; an empty `titles` list means nothing could be probed.
pub async fn probe_files(files: &[PathBuf], cfg: &ProbeConfig) -> ProbeReport {
    let mut errors = Vec::new();

    for (tool, bin) in cfg.tools() {
        info!(tool = %tool, files = files.len(), "probing video files");
        match probe_with_tool(tool, bin, files, cfg.timeout).await {
            Ok(mut report) if !report.titles.is_empty() => {
                errors.append(&mut report.errors);
                report.errors = errors;
                return report;
            }
            Ok(report) => {
                warn!(tool = %tool, "probe tool returned no titles, trying next tool");
                errors.extend(report.errors);
            }
            Err(e) => {
                warn!(tool = %tool, error = %e, "probe tool unavailable");
                errors.push(format!("{tool} unavailable: {e}"));
            }
        }
    }

    ProbeReport {
        source: "none".to_string(),
        errors,
        ..Default::default()
    }
}

async fn probe_with_tool(
    tool: ProbeTool,
    bin: &Path,
    files: &[PathBuf],
    timeout: Duration,
) -> Result<ProbeReport, RunError> {
    let mut titles = Vec::new();
    let mut errors = Vec::new();

    for (pos, file) in files.iter().enumerate() {
        let index = pos as u32 + 1;
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());

        let mut args: Vec<OsString> = tool.probe_args().iter().map(OsString::from).collect();
        args.push(file.as_os_str().to_owned());

        let output = match run_command(bin, &args, timeout).await {
            Ok(output) => output,
            Err(e @ RunError::Missing(_)) => return Err(e),
            Err(e) => {
                errors.push(format!("{tool} failed ({name}): {e}"));
                continue;
            }
        };

        if !tool.accepts(&output) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            errors.push(format!(
                "{tool} failed ({name}): {} {}",
                output.status,
                stderr.trim()
            ));
            continue;
        }

        let parsed = serde_json::from_slice::<Value>(&output.stdout)
            .map_err(|e| format!("invalid JSON: {e}"))
            .and_then(|raw| tool.parse(&raw));

        match parsed {
            Ok(probed) => {
                let size = tokio::fs::metadata(file).await.ok().map(|m| m.len());
                debug!(file = %name, index, runtime = probed.runtime_seconds, "probed title");
                titles.push(probed.into_title(index, name, size));
            }
            Err(e) => errors.push(format!("{tool} failed ({name}): {e}")),
        }
    }

    let tool_version = tool_version(tool, bin, timeout).await;
    Ok(ProbeReport {
        source: tool.as_str().to_string(),
        tool_version,
        dump: None,
        titles,
        errors,
    })
}

async fn tool_version(tool: ProbeTool, bin: &Path, timeout: Duration) -> Option<String> {
    let output = run_command(bin, &[OsString::from(tool.version_flag())], timeout)
        .await
        .ok()?;
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

// ─── Tool output parsers ─────────────────────────────────────────────────────

fn parse_mkvmerge(raw: &Value) -> Result<ProbedFile, String> {
    let container = raw
        .get("container")
        .ok_or_else(|| "missing 'container'".to_string())?;
    if container.get("recognized").and_then(Value::as_bool) == Some(false) {
        return Err("container not recognized".into());
    }
    let props = &container["properties"];

    let runtime_seconds = number_like(&props["duration"])
        .map(|ns| round_millis(ns / 1e9))
        .unwrap_or(0.0);

    let mut probed = ProbedFile {
        runtime_seconds,
        container_title: non_blank(&props["title"]),
        ..Default::default()
    };

    for track in raw["tracks"].as_array().into_iter().flatten() {
        let Some(lang) = track["properties"]["language"].as_str().and_then(lang::normalize) else {
            continue;
        };
        match track["type"].as_str() {
            Some("audio") => {
                probed.audio_langs.insert(lang);
            }
            Some("subtitles") => {
                probed.sub_langs.insert(lang);
            }
            _ => {}
        }
    }

    probed.chapters = raw["chapters"].as_array().map(|editions| {
        editions
            .iter()
            .filter_map(|c| c["num_entries"].as_u64())
            .sum::<u64>() as u32
    });

    Ok(probed)
}

fn parse_ffprobe(raw: &Value) -> Result<ProbedFile, String> {
    let format = raw
        .get("format")
        .ok_or_else(|| "missing 'format'".to_string())?;

    let mut probed = ProbedFile {
        runtime_seconds: number_like(&format["duration"])
            .map(round_millis)
            .unwrap_or(0.0),
        container_title: non_blank(&format["tags"]["title"]),
        chapters: raw["chapters"].as_array().map(|c| c.len() as u32),
        ..Default::default()
    };

    for stream in raw["streams"].as_array().into_iter().flatten() {
        let Some(lang) = stream["tags"]["language"].as_str().and_then(lang::normalize) else {
            continue;
        };
        match stream["codec_type"].as_str() {
            Some("audio") => {
                probed.audio_langs.insert(lang);
            }
            Some("subtitle") => {
                probed.sub_langs.insert(lang);
            }
            _ => {}
        }
    }

    Ok(probed)
}

/// Durations above this are taken to be milliseconds (older mediainfo builds).
const MEDIAINFO_MS_THRESHOLD: f64 = 100_000.0;

fn parse_mediainfo(raw: &Value) -> Result<ProbedFile, String> {
    let tracks = raw["media"]["track"]
        .as_array()
        .ok_or_else(|| "missing 'media.track'".to_string())?;

    let general = tracks
        .iter()
        .find(|t| t["@type"].as_str() == Some("General"))
        .ok_or_else(|| "missing General track".to_string())?;

    let runtime_seconds = number_like(&general["Duration"])
        .map(|d| {
            if d > MEDIAINFO_MS_THRESHOLD {
                d / 1000.0
            } else {
                d
            }
        })
        .map(round_millis)
        .unwrap_or(0.0);

    let mut probed = ProbedFile {
        runtime_seconds,
        container_title: non_blank(&general["Title"]).or_else(|| non_blank(&general["Movie"])),
        ..Default::default()
    };

    for track in tracks {
        let Some(lang) = track["Language"].as_str().and_then(lang::normalize) else {
            continue;
        };
        match track["@type"].as_str() {
            Some("Audio") => {
                probed.audio_langs.insert(lang);
            }
            Some("Text") => {
                probed.sub_langs.insert(lang);
            }
            _ => {}
        }
    }

    Ok(probed)
}

/// A non-negative number given either as JSON number or numeric string.
pub(crate) fn number_like(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|n: &f64| n.is_finite() && *n >= 0.0)
}

fn non_blank(v: &Value) -> Option<String> {
    v.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn round_millis(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}
