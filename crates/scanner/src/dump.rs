//! Disc-structure dumps (`lsdvd -Oy` style YAML).
//!
//! Older dumps list titles under `track`, newer ones under `title`; in the
//! latter layout a scalar `title` is the disc label instead.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use discmeta_core::Title;
use serde::Deserialize;
use serde::de::IgnoredAny;
use tracing::{debug, warn};

use crate::lang;
use crate::probe::round_millis;

#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid structure dump: {0}")]
    Yaml(#[from] serde_yml::Error),
}

#[derive(Debug, Default, Deserialize)]
struct DumpDoc {
    #[serde(default)]
    lsdvd: Option<Box<DumpDoc>>,
    #[serde(default)]
    track: Vec<DumpTitle>,
    #[serde(default)]
    title: Option<TitleField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TitleField {
    Titles(Vec<DumpTitle>),
    #[allow(dead_code)]
    Label(String),
}

#[derive(Debug, Deserialize)]
struct DumpTitle {
    ix: Option<u32>,
    length: Option<Length>,
    #[serde(default)]
    audio: Vec<Option<DumpStream>>,
    #[serde(default, alias = "subpicture")]
    subp: Vec<Option<DumpStream>>,
    #[serde(default)]
    chapter: Vec<IgnoredAny>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Length {
    Seconds(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct DumpStream {
    langcode: Option<String>,
}

/// Parse a duration given as plain seconds or `H:MM:SS[.fff]` / `MM:SS`.
pub fn parse_runtime(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Ok(seconds) = text.parse::<f64>() {
        return (seconds.is_finite() && seconds >= 0.0).then_some(seconds);
    }
    let parts = text
        .split(':')
        .map(|p| p.trim().parse::<f64>().ok())
        .collect::<Option<Vec<_>>>()?;
    let seconds = match parts.as_slice() {
        [h, m, s] => h * 3600.0 + m * 60.0 + s,
        [m, s] => m * 60.0 + s,
        _ => return None,
    };
    (seconds.is_finite() && seconds >= 0.0).then_some(seconds)
}

fn langs(streams: &[Option<DumpStream>]) -> BTreeSet<String> {
    streams
        .iter()
        .flatten()
        .filter_map(|s| s.langcode.as_deref())
        .filter_map(lang::normalize)
        .collect()
}

/// Titles read from a dump, plus a note for every entry that was skipped.
#[derive(Debug, Default)]
pub struct ParsedDump {
    pub titles: Vec<Title>,
    pub errors: Vec<String>,
}

/// Parse dump text into titles, in the order the dump lists them.
///
/// Entries with `ix: 0` or an `ix` already seen are skipped.
pub fn parse_dump(text: &str) -> Result<ParsedDump, DumpError> {
    let mut parsed = ParsedDump::default();
    if text.trim().is_empty() {
        return Ok(parsed);
    }
    let mut doc: DumpDoc = serde_yml::from_str(text)?;
    if let Some(inner) = doc.lsdvd.take() {
        doc = *inner;
    }

    let mut raw = doc.track;
    if let Some(TitleField::Titles(titles)) = doc.title {
        raw.extend(titles);
    }

    let mut seen = HashSet::new();
    for (pos, t) in raw.into_iter().enumerate() {
        let index = t.ix.unwrap_or(pos as u32 + 1);
        if index == 0 || !seen.insert(index) {
            let reason = if index == 0 { "invalid" } else { "duplicate" };
            warn!(index, position = pos + 1, "skipping dump title with {reason} ix");
            parsed
                .errors
                .push(format!("structure dump: {reason} title ix {index} at position {}", pos + 1));
            continue;
        }

        let runtime = match &t.length {
            Some(Length::Seconds(s)) if s.is_finite() && *s >= 0.0 => *s,
            Some(Length::Text(text)) => parse_runtime(text).unwrap_or(0.0),
            _ => 0.0,
        };
        let mut title = Title::new(index, round_millis(runtime));
        title.audio_langs = langs(&t.audio);
        title.sub_langs = langs(&t.subp);
        title.chapters = (!t.chapter.is_empty()).then_some(t.chapter.len() as u32);
        parsed.titles.push(title);
    }
    Ok(parsed)
}

pub fn read_dump(path: &Path) -> Result<ParsedDump, DumpError> {
    let text = std::fs::read_to_string(path)?;
    let parsed = parse_dump(&text)?;
    debug!(
        path = %path.display(),
        titles = parsed.titles.len(),
        skipped = parsed.errors.len(),
        "read structure dump"
    );
    Ok(parsed)
}

/// Enrich dump titles with what the file probe learned about the same index.
///
/// Dump values win; probe values only fill gaps.
pub fn merge_dump(mut titles: Vec<Title>, probed: &[Title]) -> Vec<Title> {
    for title in &mut titles {
        let Some(p) = probed.iter().find(|p| p.index == title.index) else {
            continue;
        };
        if title.filename.is_none() {
            title.filename = p.filename.clone();
        }
        if title.container_title.is_none() {
            title.container_title = p.container_title.clone();
        }
        if title.audio_langs.is_empty() {
            title.audio_langs = p.audio_langs.clone();
        }
        if title.sub_langs.is_empty() {
            title.sub_langs = p.sub_langs.clone();
        }
        if !title.has_runtime() && p.has_runtime() {
            title.runtime_seconds = p.runtime_seconds;
        }
        if title.chapters.is_none() {
            title.chapters = p.chapters;
        }
        if title.size_bytes.is_none() {
            title.size_bytes = p.size_bytes;
        }
    }
    titles
}
