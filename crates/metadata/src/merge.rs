//! Record merge engine.
//!
//! Merge rules:
//! 1. Start from the heuristic fallback record.
//! 2. Every field the model candidate supplies overwrites the fallback value.
//! 3. `items` only overwrite when non-empty; `mapping` is rebuilt from the
//!    final items, model labels first.
//! 4. Titles that no longer match the content type are cleared, unless the
//!    model set them itself.

use std::collections::{BTreeMap, HashSet};

use discmeta_core::{ContentType, MetadataRecord, Title};
use tracing::debug;

use crate::arbitrator::LlmCandidate;

#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    pub record: MetadataRecord,
    pub updated_fields: Vec<String>,
}

/// Merge a model candidate into the heuristic fallback record.
///
/// Pure: the same inputs always give the same record, and merging the result
/// again with the same candidate changes nothing.
pub fn merge(
    fallback: &MetadataRecord,
    candidate: Option<&LlmCandidate>,
    titles: &[Title],
) -> MergeResult {
    let mut merged = fallback.clone();
    let mut updated_fields = Vec::new();

    if let Some(candidate) = candidate {
        macro_rules! merge_field {
            ($field:ident) => {
                if let Some(value) = &candidate.$field {
                    if merged.$field != *value {
                        merged.$field = value.clone();
                        updated_fields.push(stringify!($field).to_string());
                    }
                }
            };
        }

        merge_field!(content_type);
        merge_field!(movie_title);
        merge_field!(series_title);
        merge_field!(year);
        merge_field!(language);

        if let Some(confidence) = candidate.confidence.filter(|c| c.is_finite()) {
            let confidence = confidence.clamp(0.0, 1.0);
            if merged.confidence != confidence {
                merged.confidence = confidence;
                updated_fields.push("confidence".to_string());
            }
        }
        if !candidate.items.is_empty() && merged.items != candidate.items {
            merged.items = candidate.items.clone();
            updated_fields.push("items".to_string());
        }
    }

    let model_set = |field: fn(&LlmCandidate) -> bool| candidate.is_some_and(field);
    if merged.content_type != ContentType::Film
        && merged.movie_title.is_some()
        && !model_set(|c| c.movie_title.is_some())
    {
        merged.movie_title = None;
        updated_fields.push("movie_title".to_string());
    }
    if merged.content_type != ContentType::Serie
        && merged.series_title.is_some()
        && !model_set(|c| c.series_title.is_some())
    {
        merged.series_title = None;
        updated_fields.push("series_title".to_string());
    }

    let mut seen = HashSet::new();
    merged.items.retain(|item| seen.insert(item.title_index));

    // The mapping is a view of the items: model mapping labels win per key,
    // every other item keeps its own label.
    let mut mapping = BTreeMap::new();
    for item in &mut merged.items {
        if let Some(title) = titles.iter().find(|t| t.index == item.title_index) {
            item.backfill_from(title);
        }
        let key = item.mapping_key();
        let label = candidate
            .and_then(|c| c.mapping.get(&key))
            .or(item.label.as_ref())
            .or_else(|| fallback.mapping.get(&key))
            .cloned()
            .unwrap_or_else(|| key.clone());
        mapping.insert(key, label);
    }
    if merged.mapping != mapping {
        merged.mapping = mapping;
        updated_fields.push("mapping".to_string());
    }

    if !updated_fields.is_empty() {
        debug!(disc_uid = %merged.disc_uid, ?updated_fields, "merged LLM candidate");
    }

    MergeResult {
        record: merged,
        updated_fields,
    }
}
