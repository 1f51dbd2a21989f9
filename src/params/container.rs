//! Ordered name → values map used for headers and parameters.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// An ordered map from names to one or more string values.
///
/// Names iterate in their natural ordering. Every present name holds at least
/// one value; a name registered with no values holds a single blank
/// placeholder, which keeps "present, no value" apart from "never set".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ParamContainer {
    entries: BTreeMap<String, Vec<String>>,
}

impl ParamContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append values under `name`.
    ///
    /// Adding zero values to an absent name stores the blank placeholder;
    /// the first real values replace it.
    pub fn add<I, V>(&mut self, name: &str, values: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        validate_name(name)?;
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        append_values(self.entries.entry(name.to_string()).or_default(), values);
        Ok(self)
    }

    /// Append a single value under `name`.
    pub fn add_one(&mut self, name: &str, value: impl Into<String>) -> Result<&mut Self> {
        self.add(name, [value.into()])
    }

    /// Replace all values under `name`.
    pub fn set<I, V>(&mut self, name: &str, values: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        validate_name(name)?;
        let mut values: Vec<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            values.push(String::new());
        }
        self.entries.insert(name.to_string(), values);
        Ok(self)
    }

    /// All values for `name`.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// First value for `name`.
    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    /// Last value for `name`.
    pub fn get_last(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.last()).map(String::as_str)
    }

    /// Entry whose name equals `name` ignoring ASCII case.
    pub fn entry_ignore_case(&self, name: &str) -> Option<(&str, &[String])> {
        if let Some((key, values)) = self.entries.get_key_value(name) {
            return Some((key.as_str(), values.as_slice()));
        }
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    /// Values for `name` ignoring ASCII case. Used for HTTP header lookups.
    pub fn get_ignore_case(&self, name: &str) -> Option<&[String]> {
        self.entry_ignore_case(name).map(|(_, values)| values)
    }

    /// First value for `name` ignoring ASCII case.
    pub fn first_ignore_case(&self, name: &str) -> Option<&str> {
        self.get_ignore_case(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// True if `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Remove `name`, returning its values.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.entries.remove(name)
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// `(name, values)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Flattened `(name, value)` pairs, one per value.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(name, values)| {
            values
                .iter()
                .map(move |value| (name.as_str(), value.as_str()))
        })
    }

    /// Copy every entry of `other` whose name is absent here.
    pub fn merge_missing(&mut self, other: &ParamContainer) {
        for (name, values) in &other.entries {
            if !self.entries.contains_key(name) {
                self.entries.insert(name.clone(), values.clone());
            }
        }
    }

    /// Like [`merge_missing`](Self::merge_missing), with names compared
    /// ignoring ASCII case. Used for header defaults.
    pub fn merge_missing_ignore_case(&mut self, other: &ParamContainer) {
        for (name, values) in &other.entries {
            if self.entry_ignore_case(name).is_none() {
                self.entries.insert(name.clone(), values.clone());
            }
        }
    }
}

/// Append `values` to one name's value list.
///
/// Zero values on an empty list store the blank placeholder, and a lone
/// placeholder gives way to the first real values.
pub(crate) fn append_values(slot: &mut Vec<String>, values: Vec<String>) {
    if values.is_empty() {
        if slot.is_empty() {
            slot.push(String::new());
        }
    } else if slot.len() == 1 && slot[0].is_empty() {
        *slot = values;
    } else {
        slot.extend(values);
    }
}

impl<'a> IntoIterator for &'a ParamContainer {
    type Item = (&'a String, &'a Vec<String>);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidArgument(
            "parameter name must not be blank".to_string(),
        ));
    }
    Ok(())
}
