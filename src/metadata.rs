//! Tag-name → value dictionary handed over by the series loader.
//!
//! Different sources spell the same attribute differently (`RescaleSlope`,
//! `Rescale Slope`, `ITK.RescaleSlope`, `0028|1053`, ...), so lookups match
//! by substring on a normalized form of the key: ASCII letters lowercased,
//! everything that is not alphanumeric dropped.
//!
//! When several keys match, the **last match in key order wins**. Keys are
//! kept in a [`BTreeMap`], so that order is the lexicographic order of the
//! original key strings and does not depend on insertion order.

use std::collections::BTreeMap;

/// Outcome of looking up a numeric tag.
#[derive(Clone, Debug, PartialEq)]
pub enum TagLookup<T> {
    /// No key matched.
    Missing,
    /// A key matched but its value could not be parsed.
    Malformed { key: String, value: String },
    Found { key: String, value: T },
}

impl<T: Copy> TagLookup<T> {
    pub fn value(&self) -> Option<T> {
        match self {
            TagLookup::Found { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, TagLookup::Malformed { .. })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataDictionary {
    entries: BTreeMap<String, String>,
}

impl MetadataDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Exact key access.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Last entry (in key order) whose normalized key contains any of the
    /// normalized `needles`.
    pub fn lookup(&self, needles: &[&str]) -> Option<(&str, &str)> {
        let needles: Vec<String> = needles
            .iter()
            .map(|needle| normalize_key(needle))
            .filter(|needle| !needle.is_empty())
            .collect();

        self.entries
            .iter()
            .rev()
            .find(|(key, _)| {
                let key = normalize_key(key);
                needles.iter().any(|needle| key.contains(needle.as_str()))
            })
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Look up a tag and parse its value as a finite `f64`.
    ///
    /// DICOM decimal strings may carry padding and, for multi-valued
    /// attributes, backslash separators; the first value is used.
    pub fn lookup_f64(&self, needles: &[&str]) -> TagLookup<f64> {
        let Some((key, raw)) = self.lookup(needles) else {
            return TagLookup::Missing;
        };

        let first = raw.split('\\').next().unwrap_or_default();
        match first.trim().trim_end_matches('\0').parse::<f64>() {
            Ok(value) if value.is_finite() => TagLookup::Found {
                key: key.to_string(),
                value,
            },
            _ => TagLookup::Malformed {
                key: key.to_string(),
                value: raw.to_string(),
            },
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MetadataDictionary {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dictionary = Self::new();
        for (key, value) in iter {
            dictionary.insert(key, value);
        }
        dictionary
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
