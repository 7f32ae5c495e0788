//! Parser for the `key = value` mapping file shipped next to a model.
//!
//! Lines split on `=`:
//!
//! - `key = value` adds another value for `key` (keys may repeat)
//! - `key = sub = value` merges `sub = value` into a section at `key`
//! - `key = sub = a = b ...` merges `sub = [a, b, ...]` into that section
//!
//! Blank lines, `#` comments and lines without `=` are ignored.

use indexmap::IndexMap;
use serde::Serialize;

/// One value stored under a mapping key.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MappingValue {
    Text(String),
    List(Vec<String>),
    Section(Mapping),
}

impl MappingValue {
    /// The value as a single string (first element of a list).
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MappingValue::Text(text) => Some(text),
            MappingValue::List(items) => items.first().map(String::as_str),
            MappingValue::Section(_) => None,
        }
    }

    /// The value as a list (a plain value is a one-element list).
    pub fn as_list(&self) -> Vec<&str> {
        match self {
            MappingValue::Text(text) => vec![text.as_str()],
            MappingValue::List(items) => items.iter().map(String::as_str).collect(),
            MappingValue::Section(_) => Vec::new(),
        }
    }

    pub fn as_section(&self) -> Option<&Mapping> {
        match self {
            MappingValue::Section(section) => Some(section),
            _ => None,
        }
    }
}

/// Ordered multi-valued dictionary.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Mapping {
    entries: IndexMap<String, Vec<MappingValue>>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append another value for `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: MappingValue) {
        self.entries.entry(key.into()).or_default().push(value);
    }

    /// Replace the most recent value for `key` (or add the first one).
    pub fn replace_last(&mut self, key: impl Into<String>, value: MappingValue) {
        let values = self.entries.entry(key.into()).or_default();
        match values.last_mut() {
            Some(last) => *last = value,
            None => values.push(value),
        }
    }

    /// Most recently added value for `key`.
    pub fn get(&self, key: &str) -> Option<&MappingValue> {
        self.entries.get(key).and_then(|values| values.last())
    }

    /// Every value for `key`, in file order.
    pub fn get_all(&self, key: &str) -> &[MappingValue] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(MappingValue::as_text)
    }

    /// Parse the text at `key` as a float.
    pub fn float(&self, key: &str) -> Option<f32> {
        self.text(key).and_then(|text| text.trim().parse().ok())
    }

    pub fn section(&self, key: &str) -> Option<&Mapping> {
        self.get(key).and_then(MappingValue::as_section)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in first-insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// `(key, value)` pairs in file order, one per stored value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MappingValue)> {
        self.entries
            .iter()
            .flat_map(|(key, values)| values.iter().map(move |value| (key.as_str(), value)))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add `sub -> value` to the section stored at `key`.
    fn merge_into_section(&mut self, key: &str, sub: &str, value: MappingValue) {
        let mut section = self.section(key).cloned().unwrap_or_default();
        section.insert(sub, value);
        self.replace_last(key, MappingValue::Section(section));
    }
}

/// Parse a mapping file. Malformed lines are skipped.
pub fn parse_mapping(data: &[u8]) -> Mapping {
    let text = String::from_utf8_lossy(data);
    let mut mapping = Mapping::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let sections: Vec<&str> = line.split('=').map(str::trim).collect();
        match sections.as_slice() {
            [key, value] => mapping.insert(*key, MappingValue::Text(value.to_string())),
            [key, sub, value] => {
                mapping.merge_into_section(key, sub, MappingValue::Text(value.to_string()))
            }
            [key, sub, values @ ..] if values.len() >= 2 => {
                let list = values.iter().map(|v| v.to_string()).collect();
                mapping.merge_into_section(key, sub, MappingValue::List(list));
            }
            _ => {}
        }
    }
    mapping
}
