//! Machine-greppable warning records on stderr.
//!
//! Anomalies that must not abort a run (corrupt ledger rows, unreadable
//! manifests, ledger/filesystem disagreement) are emitted as a single
//! `NOTEKEEP_WARN` line in `key=value` form.

pub fn sanitize_value(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "na".to_string();
    }
    trimmed
        .chars()
        .map(|ch| if ch.is_whitespace() { '_' } else { ch })
        .collect()
}

pub fn emit(code: &str, stage: &str, note: &str, owner: &str, artifact: &str, reason: &str) {
    eprintln!(
        "NOTEKEEP_WARN code={} stage={} note={} owner={} artifact={} reason={}",
        sanitize_value(code),
        sanitize_value(stage),
        sanitize_value(note),
        sanitize_value(owner),
        sanitize_value(artifact),
        sanitize_value(reason),
    );
}

#[cfg(test)]
mod tests {
    use super::sanitize_value;

    #[test]
    fn sanitize_replaces_whitespace() {
        assert_eq!(sanitize_value("two words"), "two_words");
        assert_eq!(sanitize_value("line\nbreak"), "line_break");
    }

    #[test]
    fn sanitize_empty_becomes_na() {
        assert_eq!(sanitize_value(""), "na");
        assert_eq!(sanitize_value("   "), "na");
    }
}
