//! Tool-name matching for policy rules.
//!
//! Rules name tools either literally (`write_file`) or with glob patterns
//! (`web_*`). Patterns are compiled once when the policy is loaded, not per call.

use globset::{Glob, GlobMatcher};

/// A pre-compiled set of tool-name patterns.
#[derive(Debug, Clone)]
pub struct ToolMatcher {
    patterns: Vec<(String, GlobMatcher)>,
}

impl ToolMatcher {
    /// Compile a list of tool-name patterns.
    /// Returns an error if any pattern is malformed.
    pub fn new(patterns: &[String]) -> Result<Self, globset::Error> {
        let compiled = patterns
            .iter()
            .map(|p| {
                let glob = Glob::new(p.trim())?;
                Ok((p.trim().to_string(), glob.compile_matcher()))
            })
            .collect::<Result<Vec<_>, globset::Error>>()?;
        Ok(Self { patterns: compiled })
    }

    /// Returns true if the tool name matches any of the compiled patterns.
    pub fn matches(&self, tool_name: &str) -> bool {
        let tool_name = tool_name.trim();
        self.patterns
            .iter()
            .any(|(_, matcher)| matcher.is_match(tool_name))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn pattern_strings(&self) -> Vec<&str> {
        self.patterns.iter().map(|(s, _)| s.as_str()).collect()
    }

    /// True when every pattern is a plain name rather than a glob.
    pub fn is_literal(&self) -> bool {
        self.patterns.iter().all(|(p, _)| !is_glob(p))
    }
}

/// Whether a tool pattern contains glob metacharacters.
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_names() {
        let matcher =
            ToolMatcher::new(&["write_file".to_string(), "edit_file".to_string()]).unwrap();

        assert!(matcher.matches("write_file"));
        assert!(matcher.matches(" edit_file "));
        assert!(!matcher.matches("read_file"));
        assert!(matcher.is_literal());
    }

    #[test]
    fn test_glob_names() {
        let matcher = ToolMatcher::new(&["web_*".to_string(), "get_page_*".to_string()]).unwrap();

        assert!(matcher.matches("web_search"));
        assert!(matcher.matches("web_fetch"));
        assert!(matcher.matches("get_page_image"));
        assert!(!matcher.matches("get_documents"));
        assert!(!matcher.is_literal());
    }

    #[test]
    fn test_catch_all() {
        let matcher = ToolMatcher::new(&["*".to_string()]).unwrap();
        assert!(matcher.matches("anything_at_all"));
    }

    #[test]
    fn test_is_glob() {
        assert!(is_glob("web_*"));
        assert!(is_glob("get_page_{text,image}"));
        assert!(!is_glob("write_file"));
    }
}
