use std::collections::HashSet;

use discmeta_core::{ContentType, ItemType, MetadataRecord, Title, ValidationError, Violation};
use tracing::debug;

/// An untitled film is only accepted above this confidence.
pub const MIN_UNTITLED_FILM_CONFIDENCE: f64 = 0.70;
/// `autre` records are only accepted above this confidence.
pub const MIN_AUTRE_CONFIDENCE: f64 = 0.50;

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|s| s.trim().is_empty())
}

/// Gate a merged record before it is written.
///
/// Collects every broken rule instead of stopping at the first one.
pub fn validate(record: MetadataRecord, titles: &[Title]) -> Result<MetadataRecord, ValidationError> {
    let mut violations = Vec::new();
    let mut reject = |field: String, message: String| violations.push(Violation::new(field, message));

    if record.disc_uid.trim().is_empty() {
        reject("disc_uid".into(), "must not be empty".into());
    }
    if record.language.trim().is_empty() {
        reject("language".into(), "must be a language code or 'unknown'".into());
    }
    if !record.confidence.is_finite() || !(0.0..=1.0).contains(&record.confidence) {
        reject("confidence".into(), format!("{} is outside [0.0, 1.0]", record.confidence));
    }

    if record.items.is_empty() {
        reject("items".into(), "at least one item is required".into());
    }
    let mut seen = HashSet::new();
    for (pos, item) in record.items.iter().enumerate() {
        if !titles.iter().any(|t| t.index == item.title_index) {
            reject(
                format!("items[{pos}].title_index"),
                format!("refers to unknown title {}", item.title_index),
            );
        }
        if !seen.insert(item.title_index) {
            reject(
                format!("items[{pos}].title_index"),
                format!("title {} appears more than once", item.title_index),
            );
        }
        if item.kind == ItemType::Episode {
            if !item.season.is_some_and(|s| s > 0) {
                reject(format!("items[{pos}].season"), "an episode needs a positive season".into());
            }
            if !item.episode.is_some_and(|e| e > 0) {
                reject(format!("items[{pos}].episode"), "an episode needs a positive episode number".into());
            }
        }
    }

    match record.content_type {
        ContentType::Film => {
            if !is_blank(&record.series_title) {
                reject("series_title".into(), "must be null for a film".into());
            }
            let mains: Vec<_> = record.items_of(ItemType::Main).collect();
            if mains.is_empty() {
                reject("items".into(), "a film needs a main item".into());
            }
            for main in mains {
                if !record.mapping.contains_key(&main.mapping_key()) {
                    reject("mapping".into(), format!("missing {} for the main item", main.mapping_key()));
                }
            }
            if is_blank(&record.movie_title) && record.confidence < MIN_UNTITLED_FILM_CONFIDENCE {
                reject(
                    "confidence".into(),
                    format!(
                        "an untitled film needs confidence >= {MIN_UNTITLED_FILM_CONFIDENCE:.2}, got {:.2}",
                        record.confidence
                    ),
                );
            }
        }
        ContentType::Serie => {
            if is_blank(&record.series_title) {
                reject("series_title".into(), "a series needs a title".into());
            }
            if !is_blank(&record.movie_title) {
                reject("movie_title".into(), "must be null for a series".into());
            }
            let episodes: Vec<_> = record.items_of(ItemType::Episode).collect();
            if episodes.is_empty() {
                reject("items".into(), "a series needs at least one episode".into());
            }
            for episode in episodes {
                if !record.mapping.contains_key(&episode.mapping_key()) {
                    reject("mapping".into(), format!("missing {} for an episode", episode.mapping_key()));
                }
            }
        }
        ContentType::Autre => {
            if record.confidence < MIN_AUTRE_CONFIDENCE {
                reject(
                    "confidence".into(),
                    format!(
                        "'autre' needs confidence >= {MIN_AUTRE_CONFIDENCE:.2}, got {:.2}",
                        record.confidence
                    ),
                );
            }
            let has_main = record.items_of(ItemType::Main).next().is_some();
            let extras = record.items.iter().filter(|i| i.kind.is_extra()).count();
            if !has_main && extras < 2 {
                reject("items".into(), "'autre' needs a main item or at least two bonus/trailer items".into());
            }
        }
    }

    if violations.is_empty() {
        debug!(disc_uid = %record.disc_uid, content_type = %record.content_type, "record accepted");
        Ok(record)
    } else {
        Err(ValidationError { violations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use discmeta_core::Item;

    fn titles(n: u32) -> Vec<Title> {
        (1..=n).map(|i| Title::new(i, 1500.0)).collect()
    }

    fn film(confidence: f64, movie_title: Option<&str>) -> MetadataRecord {
        let titles = titles(2);
        let items = vec![
            Item::from_title(&titles[0], ItemType::Main, "Main Feature"),
            Item::from_title(&titles[1], ItemType::Bonus, "Bonus 1"),
        ];
        MetadataRecord {
            disc_uid: "DISC".into(),
            content_type: ContentType::Film,
            movie_title: movie_title.map(str::to_string),
            series_title: None,
            year: None,
            language: "fr".into(),
            mapping: items
                .iter()
                .map(|i| (i.mapping_key(), i.label.clone().unwrap()))
                .collect(),
            items,
            confidence,
            sources: Default::default(),
        }
    }

    fn episode(title: &Title, number: Option<u32>) -> Item {
        let mut item = Item::from_title(title, ItemType::Episode, "Episode");
        item.season = Some(1);
        item.episode = number;
        item
    }

    #[test]
    fn titled_film_is_accepted() {
        let record = film(0.2, Some("Le Grand Voyage"));
        assert_eq!(validate(record.clone(), &titles(2)).unwrap(), record);
    }

    #[test]
    fn untitled_film_needs_high_confidence() {
        let err = validate(film(0.6, None), &titles(2)).unwrap_err();
        assert!(err.violates("confidence"));
        assert_eq!(err.violations.len(), 1);

        assert!(validate(film(0.7, None), &titles(2)).is_ok());
        assert!(validate(film(0.9, Some("  ")), &titles(2)).is_ok());
    }

    #[test]
    fn unknown_title_is_always_rejected() {
        let record = film(0.9, Some("Le Grand Voyage"));
        let err = validate(record, &titles(1)).unwrap_err();
        assert!(err.violates("items[1].title_index"));
    }

    #[test]
    fn every_violation_is_reported() {
        let mut record = film(1.5, None);
        record.series_title = Some("Show".into());
        record.items[0].kind = ItemType::Bonus;
        record.items.push(record.items[1].clone());

        let err = validate(record, &titles(2)).unwrap_err();
        for field in ["confidence", "series_title", "items", "items[2].title_index"] {
            assert!(err.violates(field), "expected a violation on {field}: {err}");
        }
    }

    #[test]
    fn series_rules() {
        let titles = titles(3);
        let items = vec![
            episode(&titles[0], Some(1)),
            episode(&titles[1], None),
            Item::from_title(&titles[2], ItemType::Bonus, "Bonus 1"),
        ];
        let record = MetadataRecord {
            content_type: ContentType::Serie,
            movie_title: Some("Film?".into()),
            series_title: None,
            mapping: [("title_1".to_string(), "Episode 1".to_string())].into(),
            items,
            ..film(0.3, None)
        };

        let err = validate(record.clone(), &titles).unwrap_err();
        assert!(err.violates("series_title"));
        assert!(err.violates("movie_title"));
        assert!(err.violates("items[1].episode"));
        assert!(err.violates("mapping"));
        assert!(!err.violates("confidence"));

        let fixed = MetadataRecord {
            movie_title: None,
            series_title: Some("Show".into()),
            items: vec![episode(&titles[0], Some(1)), episode(&titles[1], Some(2))],
            mapping: [
                ("title_1".to_string(), "Episode 1".to_string()),
                ("title_2".to_string(), "Episode 2".to_string()),
            ]
            .into(),
            ..record
        };
        assert!(validate(fixed, &titles).is_ok());
    }

    #[test]
    fn autre_rules() {
        let titles = titles(2);
        let single = MetadataRecord {
            content_type: ContentType::Autre,
            movie_title: None,
            items: vec![Item::from_title(&titles[0], ItemType::Bonus, "Item 1")],
            ..film(0.55, None)
        };
        let err = validate(single.clone(), &titles).unwrap_err();
        assert!(err.violates("items"));
        assert!(!err.violates("confidence"));

        let two_extras = MetadataRecord {
            items: vec![
                Item::from_title(&titles[0], ItemType::Bonus, "Item 1"),
                Item::from_title(&titles[1], ItemType::Trailer, "Item 2"),
            ],
            ..single.clone()
        };
        assert!(validate(two_extras.clone(), &titles).is_ok());

        let low = MetadataRecord {
            confidence: 0.4,
            ..two_extras
        };
        assert!(validate(low, &titles).unwrap_err().violates("confidence"));
    }

    #[test]
    fn empty_items_are_rejected() {
        let record = MetadataRecord {
            items: Vec::new(),
            ..film(0.9, Some("X"))
        };
        let err = validate(record, &titles(2)).unwrap_err();
        assert!(err.violates("items"));
    }
}
