//! OpenShift Route resource
//!
//! Only the fields the exporter reads are modelled. Notifications are received
//! as `DynamicObject` and converted here, so a payload of an unexpected kind is
//! a per-item error instead of a broken stream.

use crate::error::ExporterError;
use common::{Labels, RouteSnapshot};
use kube::api::{ApiResource, DynamicObject};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Route spec (`route.openshift.io/v1`)
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "route.openshift.io",
    version = "v1",
    kind = "Route",
    plural = "routes",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    /// Public hostname the route is exposed on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Backend the route points at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<RouteTargetReference>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct RouteTargetReference {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
}

/// API resource descriptor used for the dynamic watch
pub fn route_api_resource() -> ApiResource {
    ApiResource::erase::<Route>(&())
}

/// Convert a raw watch object into a route snapshot
pub fn snapshot_from_object(obj: &DynamicObject) -> Result<RouteSnapshot, ExporterError> {
    if let Some(types) = &obj.types {
        if types.kind != "Route" {
            return Err(ExporterError::malformed(format!(
                "unknown object of kind {} ({})",
                types.kind, types.api_version
            )));
        }
    }

    let name = obj.metadata.name.clone().unwrap_or_default();
    let namespace = obj.metadata.namespace.clone().unwrap_or_default();

    let spec: RouteSpec = match obj.data.get("spec") {
        Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
            ExporterError::malformed(format!("route {}/{} has invalid spec: {}", namespace, name, e))
        })?,
        None => {
            return Err(ExporterError::malformed(format!(
                "route {}/{} has no spec",
                namespace, name
            )))
        }
    };

    let host = spec.host.unwrap_or_default();
    validate_host(&host)
        .map_err(|reason| ExporterError::malformed(format!("route {}/{}: {}", namespace, name, reason)))?;

    let labels: Labels = obj.metadata.labels.clone().unwrap_or_default();

    Ok(RouteSnapshot::new(name, namespace, host, labels))
}

/// The hostname becomes a file name, so it must be a single path component
fn validate_host(host: &str) -> Result<(), &'static str> {
    if host.is_empty() {
        return Err("missing spec.host");
    }
    if host == "." || host == ".." {
        return Err("spec.host is not a valid hostname");
    }
    if host.contains(['/', '\\', '\0']) {
        return Err("spec.host contains a path separator");
    }
    Ok(())
}
