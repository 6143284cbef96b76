//! Small string helpers shared by the context builder and the terminal UI.

/// Cut a string to at most `max` characters, appending "..." when it was cut.
/// Counts characters, not bytes, so multi-byte text never splits mid-char.
pub fn preview(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((byte_idx, _)) => format!("{}...", &s[..byte_idx]),
    }
}

/// Cut a string to at most `max` characters without any marker.
pub fn clip(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        None => s,
        Some((byte_idx, _)) => &s[..byte_idx],
    }
}

/// Find the first sentence in `text` that mentions `needle`, trimmed and
/// clipped to `max` characters.
pub fn sentence_mentioning<'a>(text: &'a str, needle: &str, max: usize) -> Option<&'a str> {
    if needle.is_empty() {
        return None;
    }
    text.split('.')
        .find(|sentence| sentence.contains(needle))
        .map(|sentence| clip(sentence.trim(), max))
}

/// Normalize a file path for comparison: strips a leading `./` or `/`
/// and collapses doubled slashes.
pub fn normalize_path(path: &str) -> String {
    let path = path.trim();
    let path = path.strip_prefix("./").unwrap_or(path);
    let path = path.trim_start_matches('/');
    let mut out = String::with_capacity(path.len());
    let mut last_slash = false;
    for c in path.chars() {
        if c == '/' && last_slash {
            continue;
        }
        last_slash = c == '/';
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_short_text_untouched() {
        assert_eq!(preview("hello", 10), "hello");
        assert_eq!(preview("hello", 5), "hello");
    }

    #[test]
    fn test_preview_long_text_marked() {
        assert_eq!(preview("hello world", 5), "hello...");
    }

    #[test]
    fn test_preview_multibyte() {
        // Would panic with byte slicing
        assert_eq!(preview("§§§§§§", 3), "§§§...");
    }

    #[test]
    fn test_sentence_mentioning() {
        let text = "I reviewed the index. Next I need doc-17 for the lease terms. Then the report.";
        assert_eq!(
            sentence_mentioning(text, "doc-17", 200),
            Some("Next I need doc-17 for the lease terms")
        );
        assert_eq!(sentence_mentioning(text, "doc-99", 200), None);
        assert_eq!(sentence_mentioning(text, "doc-17", 6), Some("Next I"));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./notes/a.md"), "notes/a.md");
        assert_eq!(normalize_path("/report.md"), "report.md");
        assert_eq!(normalize_path("notes//a.md"), "notes/a.md");
    }
}
