//! Path access over schema-less object trees.
//!
//! Live objects are handled as `serde_json::Value` trees. These helpers walk
//! them by key path and report a missing or mistyped node as an error value
//! instead of assuming the shape.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path {0} not found")]
    NotFound(String),

    #[error("path {0} is not a map")]
    NotAMap(String),
}

fn render(path: &[&str]) -> String {
    format!(".{}", path.join("."))
}

/// Look up the node at `path`.
pub fn lookup<'a>(root: &'a Value, path: &[&str]) -> Result<&'a Value, PathError> {
    let mut node = root;
    for (depth, key) in path.iter().enumerate() {
        let map = node
            .as_object()
            .ok_or_else(|| PathError::NotAMap(render(&path[..depth])))?;
        node = map
            .get(*key)
            .ok_or_else(|| PathError::NotFound(render(&path[..=depth])))?;
    }
    Ok(node)
}

/// Look up a string leaf, `None` when absent or not a string.
pub fn lookup_str<'a>(root: &'a Value, path: &[&str]) -> Option<&'a str> {
    lookup(root, path).ok().and_then(Value::as_str)
}

/// Look up the map at `path` for mutation.
///
/// Every node along the path must already exist and be a map.
pub fn lookup_map_mut<'a>(
    root: &'a mut Value,
    path: &[&str],
) -> Result<&'a mut Map<String, Value>, PathError> {
    let mut node = root;
    for (depth, key) in path.iter().enumerate() {
        let map = node
            .as_object_mut()
            .ok_or_else(|| PathError::NotAMap(render(&path[..depth])))?;
        node = map
            .get_mut(*key)
            .ok_or_else(|| PathError::NotFound(render(&path[..=depth])))?;
    }
    node.as_object_mut()
        .ok_or_else(|| PathError::NotAMap(render(path)))
}

/// Get the child map under `key`, inserting an empty one when the key is
/// absent or null.
pub fn child_map_or_insert<'a>(
    map: &'a mut Map<String, Value>,
    key: &str,
) -> Result<&'a mut Map<String, Value>, PathError> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if slot.is_null() {
        *slot = Value::Object(Map::new());
    }
    slot.as_object_mut()
        .ok_or_else(|| PathError::NotAMap(format!(".{key}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_walks_nested_maps() {
        let doc = json!({"spec": {"template": {"metadata": {"labels": {"app": "web"}}}}});
        let labels = lookup(&doc, &["spec", "template", "metadata", "labels"]).unwrap();
        assert_eq!(labels, &json!({"app": "web"}));
        assert_eq!(
            lookup_str(&doc, &["spec", "template", "metadata", "labels", "app"]),
            Some("web")
        );
    }

    #[test]
    fn lookup_reports_first_missing_segment() {
        let doc = json!({"spec": {}});
        assert_eq!(
            lookup(&doc, &["spec", "template", "metadata"]),
            Err(PathError::NotFound(".spec.template".to_string()))
        );
    }

    #[test]
    fn lookup_rejects_scalars_in_the_middle() {
        let doc = json!({"spec": "oops"});
        assert_eq!(
            lookup(&doc, &["spec", "template"]),
            Err(PathError::NotAMap(".spec".to_string()))
        );
    }

    #[test]
    fn lookup_map_mut_requires_a_map_leaf() {
        let mut doc = json!({"spec": {"replicas": 3}});
        assert!(lookup_map_mut(&mut doc, &["spec"]).is_ok());
        assert_eq!(
            lookup_map_mut(&mut doc, &["spec", "replicas"]).unwrap_err(),
            PathError::NotAMap(".spec.replicas".to_string())
        );
    }

    #[test]
    fn child_map_is_created_when_absent_or_null() {
        let mut meta = json!({"labels": {"a": "b"}, "annotations": null});
        let map = meta.as_object_mut().unwrap();
        child_map_or_insert(map, "annotations").unwrap().insert("k".into(), json!("v"));
        child_map_or_insert(map, "extra").unwrap();
        assert_eq!(meta, json!({"labels": {"a": "b"}, "annotations": {"k": "v"}, "extra": {}}));
    }

    #[test]
    fn child_map_rejects_non_map_values() {
        let mut meta = json!({"annotations": ["x"]});
        let map = meta.as_object_mut().unwrap();
        assert!(child_map_or_insert(map, "annotations").is_err());
    }
}
