// src/pipeline/extract.rs

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::errors::{ProcstreamError, Result};

/// Prefix that marks an error line in the default extractor.
pub const DEFAULT_ERROR_MARKER: &str = "ERROR:";

/// Regex form of the default extractor, used as the config default.
pub const DEFAULT_ERROR_PATTERN: &str = r"^ERROR:\s*(.*)";

/// Recognises error lines in process output and pulls out the useful part.
///
/// `extract` returns `Some(context)` for an error line and `None` otherwise.
#[derive(Clone)]
pub struct ErrorExtractor {
    label: String,
    extract: Arc<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl fmt::Debug for ErrorExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ErrorExtractor").field(&self.label).finish()
    }
}

impl Default for ErrorExtractor {
    fn default() -> Self {
        Self::marker(DEFAULT_ERROR_MARKER)
    }
}

impl ErrorExtractor {
    /// Arbitrary extractor function.
    pub fn new<F>(label: impl Into<String>, extract: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            extract: Arc::new(extract),
        }
    }

    /// Lines starting with `marker`; the rest of the line, trimmed, is the
    /// context.
    pub fn marker(marker: impl Into<String>) -> Self {
        let marker = marker.into();
        let label = format!("marker {marker:?}");
        Self::new(label, move |line| {
            line.strip_prefix(marker.as_str())
                .map(|rest| rest.trim().to_string())
        })
    }

    /// Lines matching `regex`; the first capture group (or the whole match
    /// when there is none), trimmed, is the context.
    pub fn regex(regex: Regex) -> Self {
        let label = format!("regex {:?}", regex.as_str());
        Self::new(label, move |line| {
            let caps = regex.captures(line)?;
            let matched = caps.get(1).or_else(|| caps.get(0))?;
            Some(matched.as_str().trim().to_string())
        })
    }

    /// Compile `pattern` into a regex extractor.
    pub fn from_pattern(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(ProcstreamError::from)?;
        Ok(Self::regex(regex))
    }

    /// Error context of a single line.
    pub fn extract(&self, line: &str) -> Option<String> {
        (self.extract)(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_marker_and_trims() {
        let extractor = ErrorExtractor::default();
        assert_eq!(
            extractor.extract("ERROR:   disk full  "),
            Some("disk full".to_string())
        );
        assert_eq!(extractor.extract("normal line"), None);
        assert_eq!(extractor.extract("an ERROR: mid-line"), None);
    }

    #[test]
    fn default_pattern_agrees_with_marker() {
        let by_regex = ErrorExtractor::from_pattern(DEFAULT_ERROR_PATTERN).unwrap();
        let by_marker = ErrorExtractor::default();

        for line in ["ERROR: disk full", "ERROR:x", "ERROR:", "WARN: nope", "  ERROR: indented"] {
            assert_eq!(by_regex.extract(line), by_marker.extract(line), "line {line:?}");
        }
    }

    #[test]
    fn regex_without_group_uses_whole_match() {
        let extractor = ErrorExtractor::regex(Regex::new(r"E/\w+").unwrap());
        assert_eq!(
            extractor.extract("01-01 E/ActivityManager: boom"),
            Some("E/ActivityManager".to_string())
        );
    }

    #[test]
    fn invalid_pattern_is_reported() {
        assert!(matches!(
            ErrorExtractor::from_pattern("(unclosed"),
            Err(ProcstreamError::RegexError(_))
        ));
    }
}
