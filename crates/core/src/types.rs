use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a whole disc holds, stored in `content_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Film,
    Serie,
    Autre,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Film => "film",
            Self::Serie => "serie",
            Self::Autre => "autre",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "film" => Ok(Self::Film),
            "serie" => Ok(Self::Serie),
            "autre" => Ok(Self::Autre),
            other => Err(format!("unknown content type '{other}'")),
        }
    }
}

/// Semantic role of one title inside the record, stored in `items[].type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Main,
    Episode,
    Bonus,
    Trailer,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Episode => "episode",
            Self::Bonus => "bonus",
            Self::Trailer => "trailer",
        }
    }

    /// Bonus material rather than primary content.
    pub fn is_extra(self) -> bool {
        matches!(self, Self::Bonus | Self::Trailer)
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "main" => Ok(Self::Main),
            "episode" => Ok(Self::Episode),
            "bonus" => Ok(Self::Bonus),
            "trailer" => Ok(Self::Trailer),
            other => Err(format!("unknown item type '{other}'")),
        }
    }
}

/// Canonical menu label keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelCategory {
    Play,
    Chapters,
    Bonus,
    Audio,
    Subtitles,
    Episodes,
}

impl LabelCategory {
    pub const ALL: [LabelCategory; 6] = [
        Self::Play,
        Self::Chapters,
        Self::Bonus,
        Self::Audio,
        Self::Subtitles,
        Self::Episodes,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Chapters => "chapters",
            Self::Bonus => "bonus",
            Self::Audio => "audio",
            Self::Subtitles => "subtitles",
            Self::Episodes => "episodes",
        }
    }
}

impl std::fmt::Display for LabelCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One playable video track or file found on a disc.
///
/// Created once by the prober and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Title {
    pub index: u32,
    /// Zero means the duration is unknown.
    #[serde(default)]
    pub runtime_seconds: f64,
    #[serde(default)]
    pub audio_langs: BTreeSet<String>,
    #[serde(default)]
    pub sub_langs: BTreeSet<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub container_title: Option<String>,
    #[serde(default)]
    pub chapters: Option<u32>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

impl Title {
    pub fn new(index: u32, runtime_seconds: f64) -> Self {
        Self {
            index,
            runtime_seconds,
            audio_langs: BTreeSet::new(),
            sub_langs: BTreeSet::new(),
            filename: None,
            container_title: None,
            chapters: None,
            size_bytes: None,
        }
    }

    pub fn has_runtime(&self) -> bool {
        self.runtime_seconds.is_finite() && self.runtime_seconds > 0.0
    }

    pub fn mapping_key(&self) -> String {
        mapping_key(self.index)
    }
}

/// Key under which a title appears in `MetadataRecord::mapping`.
pub fn mapping_key(index: u32) -> String {
    format!("title_{index}")
}

/// A categorized OCR observation from a disc menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuLabel {
    pub text: String,
    pub frame: Option<String>,
    pub confidence: Option<f64>,
    pub category: Option<LabelCategory>,
}

/// One title reinterpreted semantically in the final record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "type")]
    pub kind: ItemType,
    pub title_index: u32,
    #[serde(default)]
    pub runtime_seconds: f64,
    #[serde(default)]
    pub audio_langs: BTreeSet<String>,
    #[serde(default)]
    pub sub_langs: BTreeSet<String>,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub episode: Option<u32>,
    #[serde(default)]
    pub episode_title: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

impl Item {
    /// Build an item carrying the technical fields of `title`.
    pub fn from_title(title: &Title, kind: ItemType, label: impl Into<String>) -> Self {
        Self {
            kind,
            title_index: title.index,
            runtime_seconds: title.runtime_seconds,
            audio_langs: title.audio_langs.clone(),
            sub_langs: title.sub_langs.clone(),
            season: None,
            episode: None,
            episode_title: None,
            label: Some(label.into()),
        }
    }

    pub fn mapping_key(&self) -> String {
        mapping_key(self.title_index)
    }

    /// Copy runtime and languages from the title this item points at.
    pub fn backfill_from(&mut self, title: &Title) {
        if !(self.runtime_seconds.is_finite() && self.runtime_seconds > 0.0) {
            self.runtime_seconds = title.runtime_seconds;
        }
        if self.audio_langs.is_empty() {
            self.audio_langs = title.audio_langs.clone();
        }
        if self.sub_langs.is_empty() {
            self.sub_langs = title.sub_langs.clone();
        }
    }
}

/// The per-disc artifact handed to downstream tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub disc_uid: String,
    pub content_type: ContentType,
    #[serde(default)]
    pub movie_title: Option<String>,
    #[serde(default)]
    pub series_title: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    pub language: String,
    pub items: Vec<Item>,
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,
    pub confidence: f64,
    #[serde(default)]
    pub sources: Sources,
}

impl MetadataRecord {
    pub fn items_of(&self, kind: ItemType) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(move |item| item.kind == kind)
    }
}

/// Provenance block: which tools and model produced the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sources {
    #[serde(default)]
    pub tech: TechSource,
    #[serde(default)]
    pub ocr: OcrSource,
    #[serde(default)]
    pub llm: LlmSource,
    #[serde(default)]
    pub fingerprint_sha256: Option<String>,
    #[serde(default)]
    pub layout_version: String,
    #[serde(default)]
    pub elapsed_seconds: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechSource {
    pub tool: String,
    pub tool_version: Option<String>,
    pub dump: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrSource {
    pub path: Option<String>,
    pub observations: usize,
    pub language: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmSource {
    pub provider: String,
    pub model: String,
    pub used: bool,
    pub attempts: u8,
    pub error: Option<String>,
}
