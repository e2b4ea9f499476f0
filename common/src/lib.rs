//! Route Exporter Common Types
//!
//! Value types that flow from the cluster watchers to the exporters.
//! Events are immutable once emitted and move by value through channels.

use std::collections::BTreeMap;
use std::fmt;

/// Label key synthesized from the route's namespace
pub const NAMESPACE_LABEL: &str = "Namespace";

/// Label set attached to an exported target.
///
/// A `BTreeMap` keeps key order stable so exported files are deterministic.
pub type Labels = BTreeMap<String, String>;

/// Change classification of a route notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

impl EventType {
    /// Lowercase name used in logs and metric labels
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventType::Added => "added",
            EventType::Modified => "modified",
            EventType::Deleted => "deleted",
        }
    }

    /// Whether the event (re)writes the export record
    pub const fn is_upsert(&self) -> bool {
        matches!(self, EventType::Added | EventType::Modified)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The parts of a route the exporter cares about
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RouteSnapshot {
    pub name: String,
    pub namespace: String,
    pub host: String,
    pub labels: Labels,
}

impl RouteSnapshot {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        host: impl Into<String>,
        labels: Labels,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            host: host.into(),
            labels,
        }
    }

    /// `namespace/name`, for logs
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// A route change together with the labels computed for its export record
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    pub route: RouteSnapshot,
    pub event_type: EventType,
    pub labels: Labels,
}

impl Event {
    pub fn new(route: RouteSnapshot, event_type: EventType, labels: Labels) -> Self {
        Self {
            route,
            event_type,
            labels,
        }
    }

    /// Hostname of the exported target
    pub fn host(&self) -> &str {
        &self.route.host
    }
}

/// Merge the label set for an export record.
///
/// Precedence, lowest to highest: the route's own labels, the source's static
/// labels, then the synthesized `Namespace` label.
pub fn merge_labels(route: &RouteSnapshot, source_labels: &Labels) -> Labels {
    let mut merged = route.labels.clone();
    merged.extend(
        source_labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    merged.insert(NAMESPACE_LABEL.to_string(), route.namespace.clone());
    merged
}
