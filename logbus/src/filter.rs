// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::record::{Level, ParseLevelError};

/// One prefix rule: records whose logger name starts with `prefix` are
/// admitted up to `level`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub prefix: String,
    pub level: Level,
}

impl Filter {
    pub fn new(prefix: impl Into<String>, level: Level) -> Self {
        Self {
            prefix: prefix.into(),
            level,
        }
    }
}

/// Ordered filter list. Later entries override earlier ones, so a broad
/// prefix can be narrowed (or muted) by a more specific one placed after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    list: Vec<Filter>,
}

#[derive(Debug, Error)]
pub enum FilterParseError {
    #[error("invalid filter entry {0:?}, expected \"prefix:level\"")]
    InvalidEntry(String),
    #[error(transparent)]
    Level(#[from] ParseLevelError),
}

impl Filters {
    pub fn new(list: Vec<Filter>) -> Self {
        Self { list }
    }

    /// A single empty-prefix rule admitting everything up to `level`.
    pub fn catch_all(level: Level) -> Self {
        Self::new(vec![Filter::new("", level)])
    }

    /// Parses a comma-separated `prefix:level` list, e.g.
    /// `":warn,net.:debug,net.poll.:off"`. An empty string yields an empty
    /// list, which admits nothing.
    pub fn parse(input: &str) -> Result<Self, FilterParseError> {
        let mut list = Vec::new();
        for entry in input.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (prefix, level) = entry
                .rsplit_once(':')
                .ok_or_else(|| FilterParseError::InvalidEntry(entry.to_string()))?;
            list.push(Filter::new(prefix, level.trim().parse::<Level>()?));
        }
        Ok(Self { list })
    }

    /// Effective threshold for a logger name: scan every rule, byte-wise
    /// prefix compare, last match wins. No match means `Off`.
    pub fn effective_level(&self, logger_name: &[u8]) -> Level {
        let mut level = Level::Off;
        for filter in &self.list {
            if logger_name.starts_with(filter.prefix.as_bytes()) {
                level = filter.level;
            }
        }
        level
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_list_admits_nothing() {
        let filters = Filters::default();
        assert_eq!(filters.effective_level(b"anything"), Level::Off);
    }

    #[test]
    fn empty_prefix_is_a_catch_all() {
        let filters = Filters::catch_all(Level::Debug);
        assert_eq!(filters.effective_level(b""), Level::Debug);
        assert_eq!(filters.effective_level(b"net.pool"), Level::Debug);
    }

    #[test]
    fn last_matching_entry_wins() {
        let filters = Filters::new(vec![
            Filter::new("a.", Level::Info),
            Filter::new("a.b.", Level::Off),
        ]);
        assert_eq!(filters.effective_level(b"a.x"), Level::Info);
        assert_eq!(filters.effective_level(b"a.b.y"), Level::Off);
        assert_eq!(filters.effective_level(b"z"), Level::Off);
    }

    #[test]
    fn later_entries_can_widen_as_well_as_narrow() {
        let filters = Filters::new(vec![
            Filter::new("", Level::Warn),
            Filter::new("net.", Level::Trace),
        ]);
        assert_eq!(filters.effective_level(b"core"), Level::Warn);
        assert_eq!(filters.effective_level(b"net.poll"), Level::Trace);
    }

    #[test]
    fn prefix_compare_is_case_sensitive() {
        let filters = Filters::new(vec![Filter::new("Net.", Level::Info)]);
        assert_eq!(filters.effective_level(b"net.pool"), Level::Off);
        assert_eq!(filters.effective_level(b"Net.pool"), Level::Info);
    }

    #[test]
    fn parse_round_trips_a_filter_string() {
        let filters = Filters::parse(":warn,net.:debug,net.poll.:off").unwrap();
        assert_eq!(filters.len(), 3);
        assert_eq!(filters.effective_level(b"core"), Level::Warn);
        assert_eq!(filters.effective_level(b"net.io"), Level::Debug);
        assert_eq!(filters.effective_level(b"net.poll.timer"), Level::Off);
    }

    #[test]
    fn parse_rejects_malformed_entries() {
        assert!(matches!(
            Filters::parse("no-colon"),
            Err(FilterParseError::InvalidEntry(_))
        ));
        assert!(matches!(
            Filters::parse("a.:loud"),
            Err(FilterParseError::Level(_))
        ));
    }

    #[test]
    fn parse_of_an_empty_string_is_an_empty_list() {
        let filters = Filters::parse("").unwrap();
        assert!(filters.is_empty());
        assert_eq!(filters.effective_level(b"x"), Level::Off);
    }
}
