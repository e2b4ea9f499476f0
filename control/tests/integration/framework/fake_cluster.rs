//! Fake cluster connection
//!
//! Every `subscribe` opens a fresh in-memory subscription. The test pushes
//! notifications into the latest one and can drop it to simulate a
//! disconnect, or make the next attempts fail.

use async_trait::async_trait;
use common::EventType;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::stream::BoxStream;
use futures::StreamExt;
use kube::api::DynamicObject;
use route_exporter::watch::{RawNotification, RouteSubscriber};
use route_exporter::ExporterError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct FakeCluster {
    current: Mutex<Option<UnboundedSender<RawNotification>>>,
    failures_left: AtomicUsize,
    subscriptions: AtomicUsize,
    resumed_from: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `count` subscription attempts fail
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    /// Resource version each successful subscription started from
    pub fn resumed_from(&self) -> Vec<String> {
        self.resumed_from.lock().unwrap().clone()
    }

    /// Wait until at least `count` subscriptions have been opened
    pub async fn wait_for_subscriptions(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.subscriptions() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscription was not opened in time");
    }

    pub fn add(&self, obj: DynamicObject) {
        self.push(RawNotification::Change(EventType::Added, obj));
    }

    pub fn modify(&self, obj: DynamicObject) {
        self.push(RawNotification::Change(EventType::Modified, obj));
    }

    pub fn delete(&self, obj: DynamicObject) {
        self.push(RawNotification::Change(EventType::Deleted, obj));
    }

    pub fn malformed(&self, message: &str) {
        self.push(RawNotification::Malformed(message.to_string()));
    }

    /// Drop the live subscription like a closed connection
    pub fn disconnect(&self) {
        self.current.lock().unwrap().take();
    }

    pub fn push(&self, notification: RawNotification) {
        assert!(self.try_push(notification), "no live subscription");
    }

    /// Like `push`, but reports a missing or closed subscription instead of panicking
    pub fn try_push(&self, notification: RawNotification) -> bool {
        let guard = self.current.lock().unwrap();
        match guard.as_ref() {
            Some(sender) => sender.unbounded_send(notification).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl RouteSubscriber for FakeCluster {
    async fn subscribe(
        &self,
        resume_from: &str,
    ) -> Result<BoxStream<'static, RawNotification>, ExporterError> {
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ExporterError::connection("fake", "connection refused"));
        }

        let (tx, rx) = unbounded();
        *self.current.lock().unwrap() = Some(tx);
        self.resumed_from.lock().unwrap().push(resume_from.to_string());
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(rx.boxed())
    }
}
