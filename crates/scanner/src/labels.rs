use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use discmeta_core::{LabelCategory, MenuLabel};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

/// One raw OCR hit from a menu frame.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OcrObservation {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub frame: Option<String>,
    #[serde(default, alias = "conf")]
    pub confidence: Option<f64>,
}

impl OcrObservation {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Menu labels sorted into canonical categories.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedLabels {
    pub labels: Vec<MenuLabel>,
    /// Distinct texts per category, in first-seen order. Only non-empty categories appear.
    pub categories: BTreeMap<LabelCategory, Vec<String>>,
    pub raw_labels: Vec<String>,
    /// Detected UI language, or `unknown`.
    pub language: String,
}

impl Default for NormalizedLabels {
    fn default() -> Self {
        Self {
            labels: Vec::new(),
            categories: BTreeMap::new(),
            raw_labels: Vec::new(),
            language: "unknown".to_string(),
        }
    }
}

impl NormalizedLabels {
    pub fn has(&self, category: LabelCategory) -> bool {
        self.categories.contains_key(&category)
    }

    pub fn is_empty(&self) -> bool {
        self.raw_labels.is_empty()
    }
}

fn category_pattern(alternatives: &[&str]) -> Regex {
    Regex::new(&format!("(?:{})", alternatives.join("|"))).unwrap()
}

// play: "Play", "Lecture", "Lire", "Iniciar", "Start"
static RE_PLAY: LazyLock<Regex> = LazyLock::new(|| {
    category_pattern(&[r"\bplay\b", r"\blecture\b", r"\blire\b", r"\biniciar\b", r"\bstart\b"])
});

static RE_CHAPTERS: LazyLock<Regex> = LazyLock::new(|| {
    category_pattern(&["chapitre", "chapters?", "scene", "escena", "kapitel"])
});

static RE_BONUS: LazyLock<Regex> = LazyLock::new(|| {
    category_pattern(&["bonus", "suppl", "extras?", "contenu special", "making"])
});

static RE_AUDIO: LazyLock<Regex> = LazyLock::new(|| {
    category_pattern(&["audio", "langue", "idioma", "sprache", "version"])
});

static RE_SUBTITLES: LazyLock<Regex> = LazyLock::new(|| {
    category_pattern(&["sous[- ]titres", "subtitles?", "subt[ií]t", "untertitel"])
});

static RE_EPISODES: LazyLock<Regex> = LazyLock::new(|| {
    category_pattern(&["episode", "épisode", "cap[ií]tulo", "episodio", "folge"])
});

fn pattern(category: LabelCategory) -> &'static Regex {
    match category {
        LabelCategory::Play => &*RE_PLAY,
        LabelCategory::Chapters => &*RE_CHAPTERS,
        LabelCategory::Bonus => &*RE_BONUS,
        LabelCategory::Audio => &*RE_AUDIO,
        LabelCategory::Subtitles => &*RE_SUBTITLES,
        LabelCategory::Episodes => &*RE_EPISODES,
    }
}

/// Substring hints per UI language, sorted by language code.
const LANGUAGE_HINTS: &[(&str, &[&str])] = &[
    ("de", &["wieder", "kapitel", "sprache", "untertitel"]),
    ("en", &["play", "chapter", "bonus", "audio", "subtitle"]),
    ("es", &["reproduc", "cap", "idioma", "subt"]),
    ("fr", &["lecture", "chapitre", "bonus", "version", "sous"]),
    ("it", &["riprod", "capit", "lingua", "sottotit"]),
];

/// Every category whose pattern matches `text`, in canonical order.
pub fn categorize(text: &str) -> Vec<LabelCategory> {
    let lowered = text.to_lowercase();
    LabelCategory::ALL
        .into_iter()
        .filter(|c| pattern(*c).is_match(&lowered))
        .collect()
}

/// Majority vote over language hints; ties go to the lexically first code.
pub fn detect_language<'a>(texts: impl IntoIterator<Item = &'a str>) -> String {
    let mut votes: BTreeMap<&str, usize> = BTreeMap::new();
    for text in texts {
        let lowered = text.to_lowercase();
        for (lang, hints) in LANGUAGE_HINTS {
            if hints.iter().any(|h| lowered.contains(h)) {
                *votes.entry(*lang).or_default() += 1;
            }
        }
    }

    // BTreeMap iterates in code order, so keeping the first maximum breaks ties lexically.
    let mut best: Option<(&str, usize)> = None;
    for (lang, count) in votes {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((lang, count));
        }
    }
    best.map(|(lang, _)| lang.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Sort raw OCR observations into canonical menu categories.
///
/// Never fails; no observations give an empty result with language `unknown`.
pub fn normalize(observations: &[OcrObservation]) -> NormalizedLabels {
    let mut out = NormalizedLabels::default();

    for obs in observations {
        let text = obs.text.trim();
        if text.is_empty() {
            continue;
        }
        out.raw_labels.push(text.to_string());

        let matched = categorize(text);
        for category in &matched {
            let texts = out.categories.entry(*category).or_default();
            if !texts.iter().any(|t| t == text) {
                texts.push(text.to_string());
            }
        }

        out.labels.push(MenuLabel {
            text: text.to_string(),
            frame: obs.frame.clone(),
            confidence: obs.confidence.and_then(unit_confidence),
            category: matched.first().copied(),
        });
    }

    out.language = detect_language(out.raw_labels.iter().map(String::as_str));
    debug!(
        observations = observations.len(),
        labels = out.labels.len(),
        categories = out.categories.len(),
        language = %out.language,
        "normalized menu labels"
    );
    out
}

/// OCR engines report either 0-1 or 0-100.
fn unit_confidence(value: f64) -> Option<f64> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    if value <= 1.0 {
        Some(value)
    } else if value <= 100.0 {
        Some(value / 100.0)
    } else {
        None
    }
}

/// Read OCR observations from a JSON file.
///
/// Accepts a bare array or an object with an `observations`/`items` array.
/// A missing or unreadable file yields no observations.
pub fn read_observations(path: &Path) -> Vec<OcrObservation> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OcrFile {
        List(Vec<OcrObservation>),
        Wrapped {
            #[serde(alias = "items")]
            observations: Vec<OcrObservation>,
        },
    }

    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no OCR observations");
            return Vec::new();
        }
    };
    match serde_json::from_slice::<OcrFile>(&bytes) {
        Ok(OcrFile::List(obs)) | Ok(OcrFile::Wrapped { observations: obs }) => obs,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "invalid OCR file, ignoring");
            Vec::new()
        }
    }
}
