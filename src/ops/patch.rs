//! Two-way merge patches between JSON documents.
//!
//! For maps, a strategic merge patch and a JSON merge patch (RFC 7386) agree:
//! changed keys carry their new value, removed keys carry `null`, unchanged
//! keys are omitted. Lists are replaced wholesale.

use serde_json::{Map, Value};

/// A serialized patch document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch(Vec<u8>);

impl Patch {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::from_slice(&self.0)
    }
}

impl From<Vec<u8>> for Patch {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Compute the patch turning `original` into `modified`.
///
/// Returns an empty object when both documents are equal.
pub fn create_two_way_merge_patch(original: &Value, modified: &Value) -> Value {
    match (original, modified) {
        (Value::Object(orig), Value::Object(modi)) => Value::Object(diff_maps(orig, modi)),
        _ if original == modified => Value::Object(Map::new()),
        _ => modified.clone(),
    }
}

fn diff_maps(original: &Map<String, Value>, modified: &Map<String, Value>) -> Map<String, Value> {
    let mut patch = Map::new();

    for (key, new) in modified {
        match original.get(key) {
            Some(old) if old == new => {}
            Some(Value::Object(old)) => match new {
                Value::Object(new) => {
                    let nested = diff_maps(old, new);
                    if !nested.is_empty() {
                        patch.insert(key.clone(), Value::Object(nested));
                    }
                }
                _ => {
                    patch.insert(key.clone(), new.clone());
                }
            },
            _ => {
                patch.insert(key.clone(), new.clone());
            }
        }
    }

    for key in original.keys() {
        if !modified.contains_key(key) {
            patch.insert(key.clone(), Value::Null);
        }
    }

    patch
}

/// Apply a merge patch in place.
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(doc) = target {
        for (key, value) in patch {
            if value.is_null() {
                doc.remove(key);
            } else {
                apply_merge_patch(doc.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
