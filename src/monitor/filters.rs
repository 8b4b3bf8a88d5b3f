//! # Content Filters
//! Pure byte-to-byte transformations applied to both the stored baseline and
//! freshly fetched content before comparison, so that volatile fragments
//! (timestamps, dates, caller-chosen patterns) don't register as changes.
//!
//! Filtered output is never persisted; the baseline always keeps the
//! original bytes.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use regex::bytes::Regex;

use crate::monitor::error::MonitorError;

/// Common timestamp shapes: ISO-8601/RFC3339 (with optional zone offset),
/// compact `YYYYMMDDHHMM±ZZZZ`, and bare unix epochs (seconds or millis).
const TIMESTAMP_PATTERN: &str = r"(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}([+-]\d{2}:?\d{2}|Z))|(\d{4}\d{2}\d{2}\d{2}\d{2}[+-]\d{4})|(\d{10,13})";

/// ISO (`YYYY-MM-DD`), US (`MM/DD/YYYY`) and EU (`DD.MM.YYYY`) dates.
const DATE_PATTERN: &str = r"\d{4}-\d{2}-\d{2}|\d{2}/\d{2}/\d{4}|\d{2}\.\d{2}\.\d{4}";

/// A single content transformation step.
pub trait ContentFilter: Send + Sync {
    /// Apply the filter, returning the transformed content. Total and
    /// deterministic; output length may differ from input.
    fn apply(&self, content: &[u8]) -> Vec<u8>;

    /// Human-readable description of what the filter masks.
    fn describe(&self) -> &str;
}

/// Replaces every match of a pattern with a literal token.
///
/// The pattern is compiled at construction; a bad pattern can never reach
/// `apply`.
#[derive(Debug, Clone)]
pub struct RegexFilter {
    pattern: Regex,
    replacement: Vec<u8>,
    description: String,
}

impl RegexFilter {
    pub fn new(pattern: &str, replacement: &str, description: &str) -> Result<Self, MonitorError> {
        let pattern = Regex::new(pattern)?;
        Ok(Self {
            pattern,
            replacement: replacement.as_bytes().to_vec(),
            description: description.to_owned(),
        })
    }
}

impl ContentFilter for RegexFilter {
    fn apply(&self, content: &[u8]) -> Vec<u8> {
        self.pattern
            .replace_all(content, self.replacement.as_slice())
            .into_owned()
    }

    fn describe(&self) -> &str {
        &self.description
    }
}

/// Masks common timestamp formats with a `TIMESTAMP` sentinel.
pub fn timestamp_filter() -> RegexFilter {
    static FILTER: OnceCell<RegexFilter> = OnceCell::new();
    FILTER
        .get_or_init(|| {
            RegexFilter::new(TIMESTAMP_PATTERN, "TIMESTAMP", "Ignore timestamps")
                .expect("static timestamp pattern compiles")
        })
        .clone()
}

/// Masks common date formats with a `DATE` sentinel.
pub fn date_filter() -> RegexFilter {
    static FILTER: OnceCell<RegexFilter> = OnceCell::new();
    FILTER
        .get_or_init(|| {
            RegexFilter::new(DATE_PATTERN, "DATE", "Ignore date strings")
                .expect("static date pattern compiles")
        })
        .clone()
}

/// The standard noise-reduction set: timestamps, then dates.
pub fn default_filters() -> FilterPipeline {
    let mut pipeline = FilterPipeline::new();
    pipeline.push(timestamp_filter());
    pipeline.push(date_filter());
    pipeline
}

/// An ordered sequence of filters, applied left to right.
///
/// An empty pipeline is the identity function.
#[derive(Clone, Default)]
pub struct FilterPipeline {
    filters: Vec<Arc<dyn ContentFilter>>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: impl ContentFilter + 'static) {
        self.filters.push(Arc::new(filter));
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn apply(&self, content: &[u8]) -> Vec<u8> {
        let mut result = content.to_vec();
        for filter in &self.filters {
            result = filter.apply(&result);
        }
        result
    }
}

impl fmt::Debug for FilterPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.filters.iter().map(|filter| filter.describe()))
            .finish()
    }
}

impl FromIterator<Arc<dyn ContentFilter>> for FilterPipeline {
    fn from_iter<I: IntoIterator<Item = Arc<dyn ContentFilter>>>(iter: I) -> Self {
        Self {
            filters: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_str(filter: &dyn ContentFilter, input: &str) -> String {
        String::from_utf8(filter.apply(input.as_bytes())).expect("utf8 output")
    }

    #[test]
    fn regex_filter_replaces_matches() {
        let filter = RegexFilter::new("test", "replaced", "test filter").expect("valid pattern");
        assert_eq!(
            apply_str(&filter, "this is a test string"),
            "this is a replaced string"
        );
        assert_eq!(
            apply_str(&filter, "this has no match at all"),
            "this has no match at all"
        );
        assert_eq!(apply_str(&filter, ""), "");
    }

    #[test]
    fn regex_filter_replaces_every_occurrence() {
        let filter = RegexFilter::new(r"\d+", "NUM", "mask numbers").expect("valid pattern");
        assert_eq!(
            apply_str(&filter, "value: 12345 and another: 6789"),
            "value: NUM and another: NUM"
        );
    }

    #[test]
    fn invalid_pattern_fails_at_construction() {
        let err = RegexFilter::new("(unclosed", "x", "broken").unwrap_err();
        assert!(matches!(err, MonitorError::InvalidPattern(_)));
    }

    #[test]
    fn timestamp_filter_masks_known_formats() {
        let filter = timestamp_filter();
        let cases = [
            ("Last updated: 2023-04-15T14:32:17Z", "Last updated: TIMESTAMP"),
            ("Published: 2023-04-15T14:32:17+09:00", "Published: TIMESTAMP"),
            ("Generated: 202304150212+0900", "Generated: TIMESTAMP"),
            ("Timestamp: 1681543937", "Timestamp: TIMESTAMP"),
            ("MS Timestamp: 1681543937123", "MS Timestamp: TIMESTAMP"),
            ("This text has no timestamp", "This text has no timestamp"),
        ];
        for (input, expected) in cases {
            assert_eq!(apply_str(&filter, input), expected, "input: {input}");
        }
    }

    #[test]
    fn date_filter_masks_known_formats() {
        let filter = date_filter();
        let cases = [
            ("Date: 2023-04-15", "Date: DATE"),
            ("Published on 04/15/2023", "Published on DATE"),
            ("Updated on 15.04.2023", "Updated on DATE"),
            ("From 2023-01-01 to 2023-12-31", "From DATE to DATE"),
            ("This text has no date", "This text has no date"),
        ];
        for (input, expected) in cases {
            assert_eq!(apply_str(&filter, input), expected, "input: {input}");
        }
    }

    #[test]
    fn pipeline_applies_filters_in_order() {
        let mut pipeline = FilterPipeline::new();
        pipeline.push(timestamp_filter());
        pipeline.push(date_filter());
        pipeline.push(RegexFilter::new("sensitive", "REDACTED", "redact").expect("valid pattern"));

        let input = b"Created on 2023-04-15T14:32:17Z with sensitive data";
        assert_eq!(
            pipeline.apply(input),
            b"Created on TIMESTAMP with REDACTED data".to_vec()
        );
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let pipeline = FilterPipeline::new();
        let input = b"anything at all \xff\x00".to_vec();
        assert_eq!(pipeline.apply(&input), input);
    }

    #[test]
    fn substitution_pipeline_is_idempotent() {
        let pipeline = default_filters();
        let input = b"Date: 2023-04-15, Timestamp: 2023-04-15T14:32:17Z".to_vec();
        let once = pipeline.apply(&input);
        let twice = pipeline.apply(&once);
        assert_eq!(once, twice);
        assert_eq!(once, b"Date: DATE, Timestamp: TIMESTAMP".to_vec());
    }
}
