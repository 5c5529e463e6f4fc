//! Backing (override) store.
//!
//! Holds values written through a component's `props` setter or lens. The
//! store wins over the attribute expression when the two are merged, and
//! its serialized form is mirrored to the `props-data` attribute.
//!
//! Keys removed through a lens are kept as [`Tombstones`]: paths deleted
//! from the merged value after every overlay, so a key the expression still
//! produces stays gone. A tombstone lasts until a later write assigns that
//! path again.

use std::collections::{BTreeMap, BTreeSet};

use crate::value::{Object, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideStore {
    entries: BTreeMap<String, Value>,
    removed: Tombstones,
}

impl OverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.removed.clear_written(std::slice::from_ref(&name), &value);
        self.entries.insert(name, value);
    }

    /// Remove `path` from the merged value. A single-name path also drops
    /// the override stored under that name.
    pub fn remove_path(&mut self, path: Vec<String>) {
        if let [name] = path.as_slice() {
            self.entries.remove(name);
        }
        self.removed.insert(path);
    }

    /// True when some removal starts at the top-level key `name`.
    pub fn has_removals_under(&self, name: &str) -> bool {
        self.removed.under(name)
    }

    pub fn removed(&self) -> &Tombstones {
        &self.removed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.entries.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Canonical JSON object with keys in sorted order.
    pub fn to_serialized_form(&self) -> String {
        let map: serde_json::Map<String, serde_json::Value> = self
            .entries
            .iter()
            .filter(|(_, v)| !matches!(v, Value::Undefined))
            .map(|(k, v)| (k.clone(), v.to_json_lossy()))
            .collect();
        serde_json::Value::Object(map).to_string()
    }

    /// Fresh object holding deep copies of every entry.
    pub fn to_value(&self) -> Value {
        Value::Object(Object::from_entries(
            self.entries.iter().map(|(k, v)| (k.clone(), v.deep_clone())),
        ))
    }

    /// Merge the store over an evaluated base value, then apply removals.
    pub fn overlay(&self, base: Value) -> Value {
        let merged = if self.is_empty() {
            if self.removed.is_empty() {
                return base;
            }
            base.deep_clone()
        } else {
            merge(&base, &self.to_value())
        };
        self.removed.apply(&merged);
        merged
    }
}

/// Paths removed through a lens, relative to the `props` or `key` root.
/// Every step of a path names an object property.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tombstones {
    paths: BTreeSet<Vec<String>>,
}

impl Tombstones {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: Vec<String>) {
        if !path.is_empty() {
            self.paths.insert(path);
        }
    }

    pub fn contains(&self, path: &[String]) -> bool {
        self.paths.iter().any(|p| p.as_slice() == path)
    }

    pub fn under(&self, name: &str) -> bool {
        self.paths.iter().any(|p| p.first().map(String::as_str) == Some(name))
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Forget every removal below `prefix` that `value`, written at
    /// `prefix`, assigns again.
    pub fn clear_written(&mut self, prefix: &[String], value: &Value) {
        self.paths.retain(|path| match path.strip_prefix(prefix) {
            Some(rest) => !resolves(value, rest),
            None => true,
        });
    }

    /// Delete every removed path from `value` in place.
    pub fn apply(&self, value: &Value) {
        for path in &self.paths {
            delete_path(value, path);
        }
    }
}

fn resolves(value: &Value, path: &[String]) -> bool {
    match path.split_first() {
        None => true,
        Some((head, rest)) => match value {
            Value::Object(object) => object.get(head).map_or(false, |child| resolves(&child, rest)),
            _ => false,
        },
    }
}

fn delete_path(value: &Value, path: &[String]) {
    let Value::Object(object) = value else {
        return;
    };
    match path {
        [] => {}
        [last] => {
            object.remove(last);
        }
        [head, rest @ ..] => {
            if let Some(child) = object.get(head) {
                delete_path(&child, rest);
            }
        }
    }
}

/// Deep merge where `over` wins. Objects merge key by key; any other
/// combination yields a copy of `over`. The result never shares containers
/// with either input.
pub fn merge(base: &Value, over: &Value) -> Value {
    match (base, over) {
        (Value::Object(b), Value::Object(o)) => {
            let merged = Object::new();
            for (key, value) in b.entries() {
                merged.set(key, value.deep_clone());
            }
            for (key, value) in o.entries() {
                let next = match merged.get(&key) {
                    Some(existing) => merge(&existing, &value),
                    None => value.deep_clone(),
                };
                merged.set(key, next);
            }
            Value::Object(merged)
        }
        (_, over) => over.deep_clone(),
    }
}
