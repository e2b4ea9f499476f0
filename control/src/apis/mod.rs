//! Kubernetes API integrations
//!
//! The OpenShift Route resource and exporter metrics.

pub mod metrics;
pub mod route;
