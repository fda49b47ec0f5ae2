#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use kube::core::DynamicObject;
use serde_json::{json, Value};

pub fn object(value: Value) -> DynamicObject {
    serde_json::from_value(value).expect("valid object")
}

pub fn stateful_set(namespace: &str, name: &str) -> DynamicObject {
    object(json!({
        "apiVersion": "apps/v1",
        "kind": "StatefulSet",
        "metadata": {"name": name, "namespace": namespace},
        "spec": {
            "serviceName": name,
            "replicas": 3,
            "selector": {"matchLabels": {"app": name}},
            "template": {
                "metadata": {"labels": {"app": name}},
                "spec": {"containers": [{"name": "main", "image": "redis:7", "ports": [{"containerPort": 6379}]}]}
            }
        }
    }))
}

pub fn deployment(namespace: &str, name: &str) -> DynamicObject {
    object(json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {"name": name, "namespace": namespace},
        "spec": {
            "selector": {"matchLabels": {"app": name}},
            "template": {
                "metadata": {"labels": {"app": name}, "annotations": {"team": "web"}},
                "spec": {"containers": [{"name": "main", "image": "nginx:1.27"}]}
            }
        }
    }))
}

/// An object marked for deletion and held by one finalizer.
pub fn blocked(namespace: &str, name: &str) -> DynamicObject {
    object(json!({
        "apiVersion": "example.com/v1",
        "kind": "Widget",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "deletionTimestamp": "2024-03-01T08:31:00Z",
            "finalizers": ["example.com/cleanup"]
        },
        "spec": {"size": 1}
    }))
}

pub fn config_map(namespace: &str, name: &str) -> DynamicObject {
    object(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": name, "namespace": namespace},
        "data": {"k": "v"}
    }))
}

pub fn since() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap()
}
