//! Supported language codes and their names.

/// Language codes accepted as translation targets, with English names.
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("zh-CN", "Chinese (Simplified)"),
    ("zh-TW", "Chinese (Traditional)"),
    ("zh", "Chinese"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("fr", "French"),
    ("de", "German"),
    ("es", "Spanish"),
    ("it", "Italian"),
    ("ru", "Russian"),
    ("pt", "Portuguese"),
    ("ar", "Arabic"),
    ("hi", "Hindi"),
    ("th", "Thai"),
    ("vi", "Vietnamese"),
    ("id", "Indonesian"),
    ("ms", "Malay"),
    ("tl", "Tagalog"),
    ("nl", "Dutch"),
    ("pl", "Polish"),
    ("tr", "Turkish"),
    ("uk", "Ukrainian"),
    ("cs", "Czech"),
    ("sv", "Swedish"),
    ("da", "Danish"),
    ("fi", "Finnish"),
    ("no", "Norwegian"),
    ("el", "Greek"),
    ("he", "Hebrew"),
    ("hu", "Hungarian"),
    ("ro", "Romanian"),
    ("bg", "Bulgarian"),
    ("hr", "Croatian"),
    ("sk", "Slovak"),
    ("sl", "Slovenian"),
    ("lt", "Lithuanian"),
    ("lv", "Latvian"),
    ("et", "Estonian"),
    ("bn", "Bengali"),
];

/// Human-readable name for a language code, case-insensitive.
pub fn language_name(code: &str) -> Option<&'static str> {
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
}

/// Normalize a recognizer language label to a code.
///
/// Recognizers report either codes (`"en"`) or names (`"english"`). Known
/// names map to their code; anything else is lowercased and returned as is.
pub fn normalize_language(label: &str) -> String {
    let label = label.trim();
    if let Some((code, _)) = SUPPORTED_LANGUAGES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(label))
    {
        return code.to_string();
    }
    if let Some((code, _)) = SUPPORTED_LANGUAGES
        .iter()
        .find(|(_, name)| name.eq_ignore_ascii_case(label))
    {
        return code.to_string();
    }
    label.to_lowercase()
}

/// Whether text in this language separates words with spaces.
///
/// Chinese, Japanese, Thai, Lao, Khmer and Burmese scripts do not, so text
/// pieces in those languages are joined without a separator.
pub fn uses_word_spacing(code: &str) -> bool {
    let base = code.split(['-', '_']).next().unwrap_or(code);
    !["zh", "ja", "th", "lo", "km", "my"]
        .iter()
        .any(|c| c.eq_ignore_ascii_case(base))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_name() {
        assert_eq!(language_name("en"), Some("English"));
        assert_eq!(language_name("JA"), Some("Japanese"));
        assert_eq!(language_name("zh-cn"), Some("Chinese (Simplified)"));
        assert_eq!(language_name("xyz"), None);
    }

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language("english"), "en");
        assert_eq!(normalize_language("Japanese"), "ja");
        assert_eq!(normalize_language("EN"), "en");
        assert_eq!(normalize_language("zh-tw"), "zh-TW");
        assert_eq!(normalize_language(" Klingon "), "klingon");
    }

    #[test]
    fn test_word_spacing() {
        assert!(uses_word_spacing("fr"));
        assert!(uses_word_spacing("ko"));
        assert!(!uses_word_spacing("ja"));
        assert!(!uses_word_spacing("zh-TW"));
        assert!(!uses_word_spacing("TH"));
    }
}
