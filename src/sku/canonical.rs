//! Canonical forms of request input: product names and category maps.
//!
//! Category maps keep insertion order because the order decides the
//! segment order of the generated SKU. JSON objects are deserialised entry
//! by entry in document order.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SkuError};

/// Title-case a string the way product names are displayed.
///
/// Whitespace runs collapse to a single space. Within a word, a letter
/// following another letter is lower-cased and any other letter is
/// upper-cased, so `"o'neil"` becomes `"O'Neil"`.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, word) in text.split_whitespace().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let mut prev_alpha = false;
        for ch in word.chars() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alpha = ch.is_alphabetic();
        }
    }
    out
}

/// A validated, title-cased product name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProductName(String);

impl ProductName {
    /// Canonicalise a raw name; empty or whitespace-only input is rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let canonical = title_case(raw);
        if canonical.is_empty() {
            return Err(SkuError::InvalidInput(
                "Product name is required".to_string(),
            ));
        }
        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProductName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Ordered mapping of category label to category value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryMap {
    entries: Vec<(String, String)>,
}

impl CategoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value. A replaced label keeps its position.
    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<String>) {
        let label = label.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((label, value)),
        }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(l, v)| (l.as_str(), v.as_str()))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Title-case labels and values and drop entries where either side is
    /// blank after trimming.
    pub fn canonicalize(&self) -> Self {
        let mut out = Self::new();
        for (label, value) in self.iter() {
            let label = title_case(label);
            let value = title_case(value);
            if label.is_empty() || value.is_empty() {
                continue;
            }
            out.insert(label, value);
        }
        out
    }
}

impl<L: Into<String>, V: Into<String>> FromIterator<(L, V)> for CategoryMap {
    fn from_iter<I: IntoIterator<Item = (L, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (label, value) in iter {
            map.insert(label, value);
        }
        map
    }
}

impl Serialize for CategoryMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, value) in &self.entries {
            map.serialize_entry(label, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CategoryMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct CategoryMapVisitor;

        impl<'de> Visitor<'de> for CategoryMapVisitor {
            type Value = CategoryMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping category labels to values")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<CategoryMap, A::Error> {
                let mut map = CategoryMap::new();
                while let Some((label, value)) = access.next_entry::<String, String>()? {
                    map.insert(label, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(CategoryMapVisitor)
    }
}

/// Ordered mapping of category value to its abbreviation, as returned to
/// callers. A value shared by several labels appears once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryCodes {
    entries: Vec<(String, String)>,
}

impl CategoryCodes {
    pub(crate) fn push_unique(&mut self, value: &str, code: String) {
        if !self.entries.iter().any(|(v, _)| v == value) {
            self.entries.push((value.to_string(), code));
        }
    }

    pub fn get(&self, value: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(v, _)| v == value)
            .map(|(_, c)| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for CategoryCodes {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (value, code) in &self.entries {
            map.serialize_entry(value, code)?;
        }
        map.end()
    }
}
