/// Normalizes free text by stripping surrounding whitespace and
/// composing it into Unicode Normalization Form C.
///
/// ```
/// use bhajan_service::normalization::normalize_text;
/// assert_eq!(normalize_text("  Hanuman Chalisa \n"), "Hanuman Chalisa");
/// ```
pub fn normalize_text(text: impl AsRef<str>) -> String {
    use unicode_normalization::UnicodeNormalization;

    text.as_ref().trim().nfc().collect()
}

/// Normalizes optional text, treating blank text as absent.
///
/// ```
/// use bhajan_service::normalization::normalize_optional;
/// assert_eq!(normalize_optional("   "), None);
/// assert_eq!(normalize_optional(" Aarti "), Some("Aarti".to_owned()));
/// ```
pub fn normalize_optional(text: impl AsRef<str>) -> Option<String> {
    let normalized = normalize_text(text);

    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Normalizes each tag, dropping blank ones while keeping the order.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter().filter_map(normalize_optional).collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use unicode_normalization::is_nfc;

    use super::{normalize_tags, normalize_text};

    fn count_whitespace(s: impl AsRef<str>) -> usize {
        s.as_ref().chars().filter(|c| c.is_whitespace()).count()
    }

    #[test]
    fn blank_tags_are_dropped() {
        let tags = vec![
            " Hanuman ".to_owned(),
            "".to_owned(),
            "Morning Bhajan".to_owned(),
            "  ".to_owned(),
        ];

        assert_eq!(normalize_tags(tags), vec!["Hanuman", "Morning Bhajan"]);
    }

    #[test]
    fn decomposed_text_is_composed() {
        assert_eq!(normalize_text("Bhe\u{0301}rava"), "Bh\u{00E9}rava");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 10000, ..ProptestConfig::default()
        })]

        #[test]
        fn normalization_works(string in "(\\S.*\\S|\\S+)", space_before in "\\s*", space_after in "\\s*") {
            let normalized = normalize_text(format!("{}{}{}", space_before, string, space_after));

            prop_assert!(is_nfc(&normalized), "{:?} (normalized form of {:?}) is in NFC", normalized, string);

            prop_assert!(!normalized.starts_with(char::is_whitespace) && !normalized.ends_with(char::is_whitespace), "{:?} (normalized form of {:?}) has no leading or trailing whitespace", normalized, string);

            let trimmed = normalized.trim();

            prop_assert_eq!(count_whitespace(&normalized), count_whitespace(&trimmed), "{:?} (normalized form of {:?}) preserves inner whitespace", normalized, string);
        }
    }
}
