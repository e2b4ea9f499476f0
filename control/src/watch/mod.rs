//! Route watching
//!
//! - `source`: one watcher per cluster connection
//! - `aggregator`: supervision loops and fan-in into a single sink

pub mod aggregator;
pub mod source;

pub use aggregator::Aggregator;
pub use source::{
    next_step, KubeRouteSubscriber, NextStep, RawNotification, RouteSubscriber, SinkItem,
    SourceWatcher, WatchState,
};
