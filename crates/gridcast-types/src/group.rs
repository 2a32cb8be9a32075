//! Outage group identifiers (`PREFIX<major>.<minor>`, e.g. `GPV1.2`).

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::Value;

use crate::GridcastError;

/// A parsed outage group identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutageGroup {
    pub major: u32,
    pub minor: u32,
    /// The identifier exactly as it appears in the data.
    pub id: String,
    /// The prefix the identifier was matched with.
    pub prefix: String,
}

impl OutageGroup {
    /// Filename fragment for this group: `GPV1.2` becomes `gpv-1-2`.
    ///
    /// Built from the parsed numbers, so `GPV01.2` maps to the same
    /// fragment as `GPV1.2`.
    pub fn file_suffix(&self) -> String {
        let prefix: String = self
            .prefix
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect();
        let prefix = prefix.trim_matches('-');
        let prefix = if prefix.is_empty() { "group" } else { prefix };
        format!("{prefix}-{}-{}", self.major, self.minor)
    }
}

impl std::fmt::Display for OutageGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// Matcher for group identifiers with a fixed prefix.
#[derive(Debug, Clone)]
pub struct GroupPattern {
    prefix: String,
    regex: Regex,
}

impl GroupPattern {
    pub fn new(prefix: &str) -> Result<Self, GridcastError> {
        if prefix.trim().is_empty() {
            return Err(GridcastError::Config(
                "group prefix must not be empty".to_string(),
            ));
        }
        let pattern = format!(r"^{}(\d+)\.(\d+)$", regex::escape(prefix));
        let regex = Regex::new(&pattern)
            .map_err(|e| GridcastError::Config(format!("invalid group prefix {prefix:?}: {e}")))?;
        Ok(Self {
            prefix: prefix.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    pub fn parse(&self, key: &str) -> Option<OutageGroup> {
        let caps = self.regex.captures(key)?;
        Some(OutageGroup {
            major: caps.get(1)?.as_str().parse().ok()?,
            minor: caps.get(2)?.as_str().parse().ok()?,
            id: key.to_string(),
            prefix: self.prefix.clone(),
        })
    }

    /// Every group key found at any depth of `values`, sorted by
    /// (major, minor). Keys that parse to the same numbers (`GPV1.2`,
    /// `GPV01.2`) count once; the first one seen is kept.
    pub fn collect<'a>(&self, values: impl IntoIterator<Item = &'a Value>) -> Vec<OutageGroup> {
        let mut found = BTreeMap::new();
        for value in values {
            self.walk(value, &mut found);
        }
        found.into_values().collect()
    }

    fn walk(&self, value: &Value, found: &mut BTreeMap<(u32, u32), OutageGroup>) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    if let Some(group) = self.parse(key) {
                        found.entry((group.major, group.minor)).or_insert(group);
                    }
                    self.walk(child, found);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.walk(item, found);
                }
            }
            _ => {}
        }
    }
}
