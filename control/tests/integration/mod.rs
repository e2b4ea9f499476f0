//! Route Exporter Integration Test Framework
//!
//! Drives the full pipeline (watchers → aggregator → exporter) against fake
//! clusters and a temporary export directory.
//!
//! ## Architecture
//!
//! - **framework/fake_cluster**: scriptable route subscriptions per cluster
//! - **framework/fixtures**: Route objects as the API server would send them
//! - **framework/pipeline**: wires everything together and observes outcomes
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test pipeline_test
//! ```

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used, clippy::panic)]

pub mod framework;

pub use framework::fake_cluster::FakeCluster;
pub use framework::fixtures::{at_version, config_map, route, route_with_labels};
pub use framework::pipeline::{CountingNotifier, Pipeline};
