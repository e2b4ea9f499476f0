//! Test framework core infrastructure

pub mod fake_cluster;
pub mod fixtures;
pub mod pipeline;
