//! Model arbitration: prompt construction, the two-attempt protocol, and
//! field-by-field sanitizing of the model's answer.
//!
//! The model's output is untrusted input. Nothing from it reaches a record
//! before it has been checked against the known titles and converted into
//! typed values; anything that fails a check is dropped and the heuristic
//! value stays in place.

use std::collections::{BTreeMap, HashMap, HashSet};

use discmeta_core::types::mapping_key;
use discmeta_core::{ContentType, Item, ItemType, MetadataRecord, Title};
use discmeta_scanner::NormalizedLabels;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::heuristics::HeuristicHints;
use crate::provider::CompletionClient;

pub const MAX_ATTEMPTS: u8 = 2;

const OUTPUT_SCHEMA: &str = r#"{
  "content_type": "film" | "serie" | "autre",
  "movie_title": string | null,
  "series_title": string | null,
  "year": integer | null,
  "language": "ISO 639-1 code or unknown",
  "confidence": number between 0.0 and 1.0,
  "items": [
    {
      "title_index": integer (must be one of the titles listed above),
      "type": "main" | "episode" | "bonus" | "trailer",
      "label": string,
      "season": integer | null,
      "episode": integer | null,
      "episode_title": string | null,
      "order": integer
    }
  ],
  "mapping": { "title_<index>": "label" }
}"#;

const RETRY_REMINDER: &str = "Your previous response was not valid JSON. Try again: answer with a single JSON object matching the schema, and nothing else.";

/// Evidence handed to the model.
#[derive(Debug, Clone, Copy)]
pub struct ArbitrationInput<'a> {
    pub disc_uid: &'a str,
    pub titles: &'a [Title],
    pub labels: &'a NormalizedLabels,
    pub fingerprint: Option<&'a Value>,
    pub hints: &'a HeuristicHints,
    pub fallback: &'a MetadataRecord,
}

/// A sanitized model answer.
///
/// `None` means the model did not supply a usable value. For the nullable
/// record fields, `Some(None)` is an explicit null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmCandidate {
    pub content_type: Option<ContentType>,
    pub movie_title: Option<Option<String>>,
    pub series_title: Option<Option<String>>,
    pub year: Option<Option<i32>>,
    pub language: Option<String>,
    /// Empty when the model supplied no valid item; otherwise covers every title once.
    pub items: Vec<Item>,
    pub mapping: BTreeMap<String, String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArbitrationOutcome {
    pub parsed: Option<LlmCandidate>,
    pub raw_response: Option<String>,
    pub attempts: u8,
    /// `llm_disabled`, `invalid_json_attempt_N`, or the transport error.
    pub error: Option<String>,
}

impl ArbitrationOutcome {
    pub fn disabled() -> Self {
        Self {
            error: Some("llm_disabled".to_string()),
            ..Default::default()
        }
    }
}

pub fn build_prompt(input: &ArbitrationInput<'_>) -> String {
    let titles: Vec<Value> = input
        .titles
        .iter()
        .map(|t| {
            json!({
                "title_index": t.index,
                "file": t.filename,
                "runtime_seconds": t.runtime_seconds,
                "audio_langs": t.audio_langs,
                "sub_langs": t.sub_langs,
                "container_title": t.container_title,
                "chapters": t.chapters,
            })
        })
        .collect();

    let categories: Map<String, Value> = input
        .labels
        .categories
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), json!(v)))
        .collect();

    let evidence = json!({
        "disc_uid": input.disc_uid,
        "fingerprint": input.fingerprint,
        "titles": titles,
        "menu_labels": {
            "categories": categories,
            "raw_labels": input.labels.raw_labels,
            "language": input.labels.language,
        },
        "heuristics": {
            "content_type": input.hints.content_type,
            "main_feature": input.hints.main_feature,
            "episode_groups": input.hints.episode_groups,
            "mapping": input.fallback.mapping,
        },
    });
    let evidence = serde_json::to_string_pretty(&evidence).unwrap_or_else(|_| evidence.to_string());

    format!(
        "You classify the content of a ripped optical disc.\n\
         Decide whether it holds a film, the episodes of a series, or something else, \
         and give every title a role.\n\n\
         Evidence:\n{evidence}\n\n\
         Answer ONLY with one JSON object matching this schema, without any other text:\n\
         {OUTPUT_SCHEMA}\n\n\
         Rules:\n\
         - Only use title_index values listed in the evidence.\n\
         - Every episode needs a season and an episode number.\n\
         - Use null for titles you do not know; do not invent them.\n"
    )
}

/// Ask the model for a candidate record.
///
/// Never fails: without a client, on transport errors, or after two
/// unparseable answers, `parsed` is `None` and the caller falls back to the
/// heuristic record.
pub async fn arbitrate(
    client: Option<&dyn CompletionClient>,
    input: &ArbitrationInput<'_>,
) -> ArbitrationOutcome {
    let Some(client) = client else {
        return ArbitrationOutcome::disabled();
    };

    let prompt = build_prompt(input);
    let mut request = prompt.clone();
    let mut outcome = ArbitrationOutcome::default();

    for attempt in 1..=MAX_ATTEMPTS {
        outcome.attempts = attempt;
        info!(provider = client.name(), model = client.model(), attempt, "querying LLM");

        let raw = match client.complete(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(provider = client.name(), error = %e, "LLM call failed, using heuristics");
                outcome.error = Some(e.to_string());
                return outcome;
            }
        };

        let parsed = parse_object(&raw);
        outcome.raw_response = Some(raw);
        match parsed {
            Some(obj) => {
                let candidate = sanitize(&obj, input.titles, input.fallback);
                debug!(?candidate, "sanitized LLM candidate");
                outcome.parsed = Some(candidate);
                outcome.error = None;
                return outcome;
            }
            None => {
                warn!(attempt, "LLM reply is not a JSON object");
                outcome.error = Some(format!("invalid_json_attempt_{attempt}"));
                request = format!("{prompt}\n{RETRY_REMINDER}\n");
            }
        }
    }

    outcome
}

/// Strip a surrounding Markdown code fence, if any.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`) on the opening line.
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn parse_object(raw: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(strip_fences(raw)) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

// ─── Sanitizing ──────────────────────────────────────────────────────────────

fn non_blank(v: &Value) -> Option<String> {
    v.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn positive_int(v: &Value) -> Option<u32> {
    let n = match v {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    u32::try_from(n).ok().filter(|n| *n > 0)
}

/// `Some(None)` for an explicit null or blank string, `Some(Some(_))` for text.
fn nullable_text(obj: &Map<String, Value>, key: &str) -> Option<Option<String>> {
    match obj.get(key)? {
        Value::Null => Some(None),
        v @ Value::String(_) => Some(non_blank(v)),
        _ => None,
    }
}

fn nullable_year(obj: &Map<String, Value>) -> Option<Option<i32>> {
    match obj.get("year")? {
        Value::Null => Some(None),
        v => positive_int(v)
            .and_then(|y| i32::try_from(y).ok())
            .filter(|y| (1880..=2200).contains(y))
            .map(Some),
    }
}

fn confidence(v: &Value) -> Option<f64> {
    let c = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    c.is_finite().then(|| c.clamp(0.0, 1.0))
}

/// Resolve a model reference (`title_index`, `title_N`, or a file name) to a known title.
fn resolve<'t>(titles: &'t [Title], reference: &Value) -> Option<&'t Title> {
    if let Some(index) = positive_int(reference) {
        return titles.iter().find(|t| t.index == index);
    }
    let text = reference.as_str()?.trim();
    if let Some(index) = text
        .strip_prefix("title_")
        .and_then(|n| n.parse::<u32>().ok())
    {
        return titles.iter().find(|t| t.index == index);
    }
    let base = text.rsplit(['/', '\\']).next().unwrap_or(text);
    titles
        .iter()
        .find(|t| t.filename.as_deref().is_some_and(|f| f == text || f == base))
}

fn sanitize_mapping(obj: &Map<String, Value>, titles: &[Title]) -> BTreeMap<String, String> {
    let Some(Value::Object(raw)) = obj.get("mapping") else {
        return BTreeMap::new();
    };
    let mut mapping = BTreeMap::new();
    for (key, value) in raw {
        let Some(label) = non_blank(value) else {
            continue;
        };
        match resolve(titles, &Value::String(key.clone())) {
            Some(title) => {
                mapping.entry(title.mapping_key()).or_insert(label);
            }
            None => debug!(key = %key, "dropping mapping entry for unknown title"),
        }
    }
    mapping
}

fn sanitize_item(
    raw: &Value,
    titles: &[Title],
    mapping: &BTreeMap<String, String>,
    fallback: &MetadataRecord,
) -> Option<(Item, Option<i64>)> {
    let obj = raw.as_object()?;
    let reference = obj
        .get("title_index")
        .filter(|v| !v.is_null())
        .or_else(|| obj.get("file"))?;
    let Some(title) = resolve(titles, reference) else {
        debug!(reference = %reference, "dropping item for unknown title");
        return None;
    };
    let kind: ItemType = match obj.get("type").and_then(Value::as_str).map(str::parse::<ItemType>) {
        Some(Ok(kind)) => kind,
        _ => {
            debug!(title_index = title.index, "dropping item without a valid type");
            return None;
        }
    };

    let previous = fallback.items.iter().find(|i| i.title_index == title.index);
    let label = obj
        .get("label")
        .and_then(non_blank)
        .or_else(|| mapping.get(&title.mapping_key()).cloned())
        .or_else(|| previous.filter(|p| p.kind == kind).and_then(|p| p.label.clone()))
        .unwrap_or_else(|| title.mapping_key());

    let mut item = Item::from_title(title, kind, label);
    if kind == ItemType::Episode {
        let previous_episode = previous.filter(|p| p.kind == ItemType::Episode);
        item.season = obj
            .get("season")
            .and_then(positive_int)
            .or_else(|| previous_episode.and_then(|p| p.season))
            .or(Some(1));
        item.episode = obj
            .get("episode")
            .and_then(positive_int)
            .or_else(|| previous_episode.and_then(|p| p.episode));
        item.episode_title = obj.get("episode_title").and_then(non_blank);
    }

    let order = obj
        .get("order")
        .or_else(|| obj.get("rank"))
        .and_then(|v| v.as_i64().or_else(|| v.as_str()?.trim().parse().ok()));
    Some((item, order))
}

/// Give each unnumbered episode the next free number in its season, in item order.
fn number_episodes(items: &mut [Item]) {
    let mut taken: HashSet<(u32, u32)> = items
        .iter()
        .filter(|i| i.kind == ItemType::Episode)
        .filter_map(|i| Some((i.season?, i.episode?)))
        .collect();
    let mut next: HashMap<u32, u32> = HashMap::new();
    for item in items
        .iter_mut()
        .filter(|i| i.kind == ItemType::Episode && i.episode.is_none())
    {
        let season = item.season.unwrap_or(1);
        let counter = next.entry(season).or_insert(0);
        loop {
            *counter += 1;
            if taken.insert((season, *counter)) {
                break;
            }
        }
        item.episode = Some(*counter);
    }
}

/// Check a parsed model answer against the known titles and type it.
pub fn sanitize(obj: &Map<String, Value>, titles: &[Title], fallback: &MetadataRecord) -> LlmCandidate {
    let mut mapping = sanitize_mapping(obj, titles);

    let mut ordered: Vec<(usize, Option<i64>, Item)> = obj
        .get("items")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|raw| sanitize_item(raw, titles, &mapping, fallback))
        .enumerate()
        .map(|(pos, (item, order))| (pos, order, item))
        .collect();
    ordered.sort_by_key(|(pos, order, _)| (order.is_none(), *order, *pos));

    let mut seen = HashSet::new();
    let mut items: Vec<Item> = ordered
        .into_iter()
        .map(|(_, _, item)| item)
        .filter(|item| seen.insert(item.title_index))
        .collect();
    number_episodes(&mut items);

    if !items.is_empty() {
        // Titles the model left out keep their heuristic role.
        for previous in &fallback.items {
            if seen.contains(&previous.title_index) {
                continue;
            }
            if let Some(title) = titles.iter().find(|t| t.index == previous.title_index) {
                let mut item = previous.clone();
                item.backfill_from(title);
                seen.insert(item.title_index);
                items.push(item);
            }
        }
        for title in titles {
            if seen.insert(title.index) {
                items.push(Item::from_title(title, ItemType::Bonus, title.mapping_key()));
            }
        }
        for item in &items {
            mapping
                .entry(item.mapping_key())
                .or_insert_with(|| item.label.clone().unwrap_or_else(|| mapping_key(item.title_index)));
        }
    }

    LlmCandidate {
        content_type: obj
            .get("content_type")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok()),
        movie_title: nullable_text(obj, "movie_title"),
        series_title: nullable_text(obj, "series_title"),
        year: nullable_year(obj),
        language: obj
            .get("language")
            .and_then(non_blank)
            .map(|l| l.to_lowercase()),
        items,
        mapping,
        confidence: obj.get("confidence").and_then(confidence),
    }
}
