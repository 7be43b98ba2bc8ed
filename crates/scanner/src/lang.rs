//! Language code normalization for probed audio/subtitle tracks.
//!
//! Probe tools report ISO 639-2 codes (bibliographic or terminological), DVD
//! structure dumps usually report ISO 639-1. Everything is folded to the
//! two-letter form when a mapping is known; anything else passes through.

/// ISO 639-2 (B and T variants) to ISO 639-1.
const ALIASES: &[(&str, &str)] = &[
    ("alb", "sq"),
    ("ara", "ar"),
    ("bul", "bg"),
    ("cat", "ca"),
    ("ces", "cs"),
    ("chi", "zh"),
    ("cym", "cy"),
    ("cze", "cs"),
    ("dan", "da"),
    ("deu", "de"),
    ("dut", "nl"),
    ("ell", "el"),
    ("eng", "en"),
    ("est", "et"),
    ("fin", "fi"),
    ("fra", "fr"),
    ("fre", "fr"),
    ("ger", "de"),
    ("gre", "el"),
    ("heb", "he"),
    ("hin", "hi"),
    ("hrv", "hr"),
    ("hun", "hu"),
    ("ice", "is"),
    ("isl", "is"),
    ("ita", "it"),
    ("jpn", "ja"),
    ("kor", "ko"),
    ("lav", "lv"),
    ("lit", "lt"),
    ("nld", "nl"),
    ("nor", "no"),
    ("pol", "pl"),
    ("por", "pt"),
    ("ron", "ro"),
    ("rum", "ro"),
    ("rus", "ru"),
    ("scc", "sr"),
    ("slk", "sk"),
    ("slo", "sk"),
    ("slv", "sl"),
    ("spa", "es"),
    ("sqi", "sq"),
    ("srp", "sr"),
    ("swe", "sv"),
    ("tha", "th"),
    ("tur", "tr"),
    ("ukr", "uk"),
    ("vie", "vi"),
    ("wel", "cy"),
    ("zho", "zh"),
];

/// Lower-case a language code and fold 3-letter codes to ISO 639-1.
///
/// Returns `None` for blank input.
pub fn normalize(code: &str) -> Option<String> {
    let code = code.trim().to_ascii_lowercase();
    if code.is_empty() {
        return None;
    }
    if code.len() <= 2 {
        return Some(code);
    }
    let folded = ALIASES
        .iter()
        .find(|(legacy, _)| *legacy == code)
        .map(|(_, iso)| (*iso).to_string());
    Some(folded.unwrap_or(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_legacy_codes() {
        assert_eq!(normalize("fre").as_deref(), Some("fr"));
        assert_eq!(normalize("FRA").as_deref(), Some("fr"));
        assert_eq!(normalize("ger").as_deref(), Some("de"));
        assert_eq!(normalize("eng").as_deref(), Some("en"));
        assert_eq!(normalize(" jpn ").as_deref(), Some("ja"));
    }

    #[test]
    fn passes_through_two_letter_and_unknown_codes() {
        assert_eq!(normalize("EN").as_deref(), Some("en"));
        assert_eq!(normalize("und").as_deref(), Some("und"));
        assert_eq!(normalize("tlh").as_deref(), Some("tlh"));
        assert_eq!(normalize("   "), None);
    }

    #[test]
    fn alias_table_is_sorted_and_unique() {
        let keys: Vec<_> = ALIASES.iter().map(|(k, _)| *k).collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(keys, sorted);
        assert!(ALIASES.iter().all(|(_, iso)| iso.len() == 2));
    }
}
