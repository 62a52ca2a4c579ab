//! Display-text normalization for filesystem-safe path components.

const FORBIDDEN: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Strip characters that are unsafe in directory names: path separators,
/// wildcard and quoting characters, control characters, and all whitespace
/// (including line breaks). The result may be empty; callers supply their
/// own fallback for that case.
pub fn normalize_component(text: &str) -> String {
    text.chars()
        .filter(|ch| !FORBIDDEN.contains(ch) && !ch.is_control() && !ch.is_whitespace())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::normalize_component;

    #[test]
    fn strips_separators_and_wildcards() {
        assert_eq!(normalize_component("a/b\\c:d*e?f"), "abcdef");
        assert_eq!(normalize_component("\"quoted\"<tag>|pipe"), "quotedtagpipe");
    }

    #[test]
    fn strips_whitespace_and_line_breaks() {
        assert_eq!(normalize_component("two words\r\nsecond line"), "twowordssecondline");
        assert_eq!(normalize_component("tab\there"), "tabhere");
    }

    #[test]
    fn keeps_unicode_text() {
        assert_eq!(normalize_component("旅行日记 2024"), "旅行日记2024");
    }

    #[test]
    fn can_produce_empty() {
        assert_eq!(normalize_component("  /:*? \n"), "");
    }
}
