//! Duration-based content classification and the offline fallback record.
//!
//! Everything here is deterministic: the same titles and labels always give
//! the same hints and the same fallback record.

use std::collections::{BTreeMap, BTreeSet};

use discmeta_core::{ContentType, Item, ItemType, LabelCategory, MetadataRecord, Sources, Title};
use discmeta_scanner::NormalizedLabels;
use tracing::debug;

/// Heuristic confidence without any menu evidence.
pub const CONFIDENCE_NO_OCR: f64 = 0.2;
/// Menu labels exist but say nothing in favour of the decision.
pub const CONFIDENCE_UNCORROBORATED: f64 = 0.3;
/// Menu labels agree with the decision.
pub const CONFIDENCE_CORROBORATED: f64 = 0.4;

#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicConfig {
    pub runtime_tolerance_seconds: f64,
    pub episode_group_min: usize,
    pub main_feature_minutes: f64,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            runtime_tolerance_seconds: 120.0,
            episode_group_min: 2,
            main_feature_minutes: 60.0,
        }
    }
}

impl HeuristicConfig {
    fn main_feature_seconds(&self) -> f64 {
        self.main_feature_minutes * 60.0
    }

    fn bucket_key(&self, runtime: f64) -> i64 {
        if self.runtime_tolerance_seconds > 0.0 {
            (runtime / self.runtime_tolerance_seconds).round() as i64
        } else {
            runtime.round() as i64
        }
    }
}

/// What the duration heuristics concluded about a disc.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicHints {
    pub content_type: ContentType,
    /// Index of the longest title.
    pub main_feature: Option<u32>,
    /// Indexes of every title within tolerance of the longest one.
    pub main_equal: Vec<u32>,
    /// Clusters of title indexes with matching runtimes, each sorted by index.
    pub episode_groups: Vec<Vec<u32>>,
    pub language_hint: String,
    pub confidence: f64,
}

impl HeuristicHints {
    pub fn is_episode(&self, index: u32) -> bool {
        self.episode_groups.iter().any(|g| g.contains(&index))
    }
}

/// Classify a disc from its titles, optionally corroborated by menu labels.
///
/// Titles with an unknown runtime take no part in main-feature detection or
/// episode clustering. Menu labels only move the confidence; they never
/// change the content type.
pub fn classify(
    titles: &[Title],
    labels: Option<&NormalizedLabels>,
    cfg: &HeuristicConfig,
) -> HeuristicHints {
    let known: Vec<&Title> = titles.iter().filter(|t| t.has_runtime()).collect();

    let longest = known.iter().copied().max_by(|a, b| {
        a.runtime_seconds
            .total_cmp(&b.runtime_seconds)
            .then(b.index.cmp(&a.index))
    });

    let mut main_equal: Vec<u32> = match longest {
        Some(main) => known
            .iter()
            .filter(|t| main.runtime_seconds - t.runtime_seconds <= cfg.runtime_tolerance_seconds)
            .map(|t| t.index)
            .collect(),
        None => Vec::new(),
    };
    main_equal.sort_unstable();

    let episode_groups = episode_groups(&known, &main_equal, cfg);
    let main_runtime = longest.map(|t| t.runtime_seconds).unwrap_or(0.0);

    let content_type = match known.len() {
        0 => ContentType::Autre,
        1 if main_runtime >= cfg.main_feature_seconds() => ContentType::Film,
        1 => ContentType::Autre,
        _ if !episode_groups.is_empty() => ContentType::Serie,
        _ if main_equal.len() == 1 && main_runtime >= cfg.main_feature_seconds() => {
            ContentType::Film
        }
        _ => ContentType::Autre,
    };

    let hints = HeuristicHints {
        content_type,
        main_feature: longest.map(|t| t.index),
        main_equal,
        episode_groups,
        language_hint: language_hint(titles, labels),
        confidence: confidence(content_type, labels),
    };
    debug!(
        content_type = %hints.content_type,
        main_feature = ?hints.main_feature,
        groups = hints.episode_groups.len(),
        language = %hints.language_hint,
        confidence = hints.confidence,
        "heuristic classification"
    );
    hints
}

fn episode_groups(known: &[&Title], main_equal: &[u32], cfg: &HeuristicConfig) -> Vec<Vec<u32>> {
    let min_members = cfg.episode_group_min.max(1);

    let mut buckets: BTreeMap<i64, Vec<&Title>> = BTreeMap::new();
    for &title in known {
        buckets
            .entry(cfg.bucket_key(title.runtime_seconds))
            .or_default()
            .push(title);
    }
    let mut groups: Vec<Vec<&Title>> = buckets
        .into_values()
        .filter(|bucket| bucket.len() >= min_members)
        .collect();

    // Several titles tied for longest count as one group even across a bucket edge.
    if groups.is_empty() && main_equal.len() >= min_members.max(2) {
        groups.push(
            known
                .iter()
                .copied()
                .filter(|t| main_equal.contains(&t.index))
                .collect(),
        );
    }

    // A title that fell just across a bucket edge joins the first group holding
    // a member within tolerance of it.
    let seeds: Vec<Vec<f64>> = groups
        .iter()
        .map(|g| g.iter().map(|t| t.runtime_seconds).collect())
        .collect();
    for &title in known {
        if groups.iter().any(|g| g.iter().any(|m| m.index == title.index)) {
            continue;
        }
        let near = seeds.iter().position(|runtimes| {
            runtimes
                .iter()
                .any(|r| (r - title.runtime_seconds).abs() <= cfg.runtime_tolerance_seconds)
        });
        if let Some(pos) = near {
            groups[pos].push(title);
        }
    }

    groups
        .into_iter()
        .map(|g| {
            let mut indexes: Vec<u32> = g.iter().map(|t| t.index).collect();
            indexes.sort_unstable();
            indexes
        })
        .collect()
}

/// Most common audio language, then the menu language, then `unknown`.
fn language_hint(titles: &[Title], labels: Option<&NormalizedLabels>) -> String {
    let mut votes: BTreeMap<&str, usize> = BTreeMap::new();
    for lang in titles.iter().flat_map(|t| t.audio_langs.iter()) {
        if lang != "und" {
            *votes.entry(lang.as_str()).or_default() += 1;
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (lang, count) in votes {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((lang, count));
        }
    }
    if let Some((lang, _)) = best {
        return lang.to_string();
    }

    labels
        .map(|l| l.language.as_str())
        .filter(|l| *l != "unknown")
        .unwrap_or("unknown")
        .to_string()
}

fn confidence(content_type: ContentType, labels: Option<&NormalizedLabels>) -> f64 {
    let Some(labels) = labels.filter(|l| !l.is_empty()) else {
        return CONFIDENCE_NO_OCR;
    };
    let corroborated = match content_type {
        ContentType::Serie => labels.has(LabelCategory::Episodes),
        ContentType::Film => {
            (labels.has(LabelCategory::Play) || labels.has(LabelCategory::Chapters))
                && !labels.has(LabelCategory::Episodes)
        }
        ContentType::Autre => labels.has(LabelCategory::Bonus),
    };
    if corroborated {
        CONFIDENCE_CORROBORATED
    } else {
        CONFIDENCE_UNCORROBORATED
    }
}

/// Titles by descending runtime; unknown runtimes last, ties by index.
fn ranked(titles: &[Title]) -> Vec<&Title> {
    let runtime = |t: &Title| if t.has_runtime() { t.runtime_seconds } else { 0.0 };
    let mut ranked: Vec<&Title> = titles.iter().collect();
    ranked.sort_by(|a, b| {
        runtime(b)
            .total_cmp(&runtime(a))
            .then(a.index.cmp(&b.index))
    });
    ranked
}

/// Build the conservative record used whenever no model answer is usable.
pub fn fallback_record(disc_uid: &str, titles: &[Title], hints: &HeuristicHints) -> MetadataRecord {
    let mut items = Vec::with_capacity(titles.len());
    let mut movie_title = None;
    let mut series_title = None;

    match hints.content_type {
        ContentType::Film => {
            let main = hints.main_feature;
            for (n, title) in ranked(titles)
                .into_iter()
                .filter(|t| Some(t.index) != main)
                .enumerate()
            {
                items.push(Item::from_title(title, ItemType::Bonus, format!("Bonus {}", n + 1)));
            }
            if let Some(main) = titles.iter().find(|t| Some(t.index) == main) {
                items.insert(0, Item::from_title(main, ItemType::Main, "Main Feature"));
                movie_title = main.container_title.clone();
            }
        }
        ContentType::Serie => {
            let mut episodes: Vec<&Title> = titles.iter().filter(|t| hints.is_episode(t.index)).collect();
            episodes.sort_by_key(|t| t.index);

            let shared: BTreeSet<Option<&str>> = episodes
                .iter()
                .map(|t| t.container_title.as_deref())
                .collect();
            if let [Some(name)] = shared.into_iter().collect::<Vec<_>>().as_slice() {
                series_title = Some(name.to_string());
            }

            for (n, title) in episodes.into_iter().enumerate() {
                let number = n as u32 + 1;
                let mut item = Item::from_title(title, ItemType::Episode, format!("Episode {number}"));
                item.season = Some(1);
                item.episode = Some(number);
                items.push(item);
            }
            for (n, title) in ranked(titles)
                .into_iter()
                .filter(|t| !hints.is_episode(t.index))
                .enumerate()
            {
                items.push(Item::from_title(title, ItemType::Bonus, format!("Bonus {}", n + 1)));
            }
        }
        ContentType::Autre => {
            for (n, title) in ranked(titles).into_iter().enumerate() {
                items.push(Item::from_title(title, ItemType::Bonus, format!("Item {}", n + 1)));
            }
        }
    }

    let mapping = items
        .iter()
        .map(|item| (item.mapping_key(), item.label.clone().unwrap_or_default()))
        .collect();

    MetadataRecord {
        disc_uid: disc_uid.to_string(),
        content_type: hints.content_type,
        movie_title,
        series_title,
        year: None,
        language: hints.language_hint.clone(),
        items,
        mapping,
        confidence: hints.confidence,
        sources: Sources::default(),
    }
}
