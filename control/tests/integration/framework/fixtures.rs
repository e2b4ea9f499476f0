//! Route objects shaped like API server watch payloads

use kube::api::DynamicObject;
use serde_json::json;

/// Route without resource labels
pub fn route(namespace: &str, host: &str) -> DynamicObject {
    route_with_labels(namespace, host, json!({}))
}

/// Route carrying its own labels
pub fn route_with_labels(namespace: &str, host: &str, labels: serde_json::Value) -> DynamicObject {
    let name = host.split('.').next().unwrap_or(host);
    serde_json::from_value(json!({
        "apiVersion": "route.openshift.io/v1",
        "kind": "Route",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": labels
        },
        "spec": {
            "host": host,
            "to": { "kind": "Service", "name": name }
        }
    }))
    .expect("fixture route should deserialize")
}

/// Stamp the resource version the API server would report
pub fn at_version(mut obj: DynamicObject, version: &str) -> DynamicObject {
    obj.metadata.resource_version = Some(version.to_string());
    obj
}

/// Something that is not a Route at all
pub fn config_map(namespace: &str) -> DynamicObject {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": "settings", "namespace": namespace },
        "data": { "key": "value" }
    }))
    .expect("fixture config map should deserialize")
}
