//! Source watcher
//!
//! Wraps one cluster connection and turns Route watch notifications into
//! typed [`Event`]s. Each call to [`SourceWatcher::watch`] opens one
//! subscription; reconnecting is left to the aggregator.
//!
//! The watcher remembers the last resource version it saw, so a reconnect
//! resumes where the previous subscription ended. Only the first subscription
//! and one following an expired resume point ask for a full replay.
//!
//! ## Lifecycle
//!
//! ```text
//!   Connecting ──open ok──▶ Streaming ──stream ended──▶ Connecting (reconnect)
//!        │                      │
//!        └──────cancelled───────┴──────────────────────▶ Stopped
//! ```

use crate::apis::metrics::record_event;
use crate::apis::route::{route_api_resource, snapshot_from_object};
use crate::config::SourceConfig;
use crate::error::ExporterError;
use async_trait::async_trait;
use common::{merge_labels, Event, EventType, Labels};
use futures::stream::BoxStream;
use futures::StreamExt;
use kube::api::{Api, DynamicObject, WatchEvent, WatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use regex::Regex;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Item carried from the watchers to the exporter.
///
/// Malformed notifications travel as `Err` so the exporter reports them.
pub type SinkItem = Result<Event, ExporterError>;

/// Server side watch timeout; the API server ends the stream after it
const WATCH_TIMEOUT_SECS: u32 = 290;

/// Buffer between a subscription and its supervision loop
const WATCH_CHANNEL_CAPACITY: usize = 64;

/// Resource version that makes the API server replay every route as Added
pub const FULL_REPLAY: &str = "0";

/// HTTP status of a watch whose resume point was compacted away
const GONE: u16 = 410;

/// Connection state of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Opening a subscription, or disconnected and about to reopen
    Connecting,
    /// Subscription open, notifications flowing
    Streaming,
    /// Cancelled; never reconnects
    Stopped,
}

/// What the supervision loop does after a subscription ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Reconnect,
    Stop,
}

/// Decide between reconnecting and stopping from the state alone
pub fn next_step(state: WatchState) -> NextStep {
    match state {
        WatchState::Stopped => NextStep::Stop,
        WatchState::Connecting | WatchState::Streaming => NextStep::Reconnect,
    }
}

/// One raw notification from a subscription
#[derive(Debug)]
pub enum RawNotification {
    /// A Route (or something claiming to be one) changed
    Change(EventType, DynamicObject),
    /// Progress marker carrying the latest resource version
    Bookmark(String),
    /// A single notification could not be decoded
    Malformed(String),
    /// The server ended the subscription; resume from the last version
    Interrupted(String),
    /// The resume point is too old; the next subscription replays everything
    Expired(String),
}

/// Capability that opens a Route change subscription against one cluster
#[async_trait]
pub trait RouteSubscriber: Send + Sync {
    /// Open a subscription starting after `resume_from` ([`FULL_REPLAY`] for
    /// everything). The stream ending means the connection dropped.
    async fn subscribe(
        &self,
        resume_from: &str,
    ) -> Result<BoxStream<'static, RawNotification>, ExporterError>;
}

/// Route subscriber backed by the Kubernetes API
pub struct KubeRouteSubscriber {
    name: String,
    kubeconfig: String,
    context: Option<String>,
    client: OnceCell<Client>,
}

impl KubeRouteSubscriber {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            name: config.name(),
            kubeconfig: config.kubeconfig.clone(),
            context: config.context.clone(),
            client: OnceCell::new(),
        }
    }

    /// Build the client on first use and reuse it for later subscriptions
    async fn client(&self) -> Result<Client, ExporterError> {
        self.client
            .get_or_try_init(|| self.build_client())
            .await
            .cloned()
    }

    async fn build_client(&self) -> Result<Client, ExporterError> {
        let options = KubeConfigOptions {
            context: self.context.clone(),
            ..Default::default()
        };

        let config = if !self.kubeconfig.is_empty() {
            let kubeconfig = Kubeconfig::read_from(&self.kubeconfig)
                .map_err(|e| ExporterError::connection(&self.name, e))?;
            Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .map_err(|e| ExporterError::connection(&self.name, e))?
        } else if options.context.is_some() {
            Config::from_kubeconfig(&options)
                .await
                .map_err(|e| ExporterError::connection(&self.name, e))?
        } else {
            Config::infer()
                .await
                .map_err(|e| ExporterError::connection(&self.name, e))?
        };

        debug!(source = %self.name, cluster_url = %config.cluster_url, "Built Kubernetes client");

        Client::try_from(config).map_err(|e| ExporterError::connection(&self.name, e))
    }
}

#[async_trait]
impl RouteSubscriber for KubeRouteSubscriber {
    async fn subscribe(
        &self,
        resume_from: &str,
    ) -> Result<BoxStream<'static, RawNotification>, ExporterError> {
        let client = self.client().await?;
        let api: Api<DynamicObject> = Api::all_with(client, &route_api_resource());

        let mut params = WatchParams::default().timeout(WATCH_TIMEOUT_SECS);
        params.bookmarks = true;
        let stream = api
            .watch(&params, resume_from)
            .await
            .map_err(|e| ExporterError::connection(&self.name, e))?;

        Ok(stream
            .filter_map(|item| async move {
                match item {
                    Ok(WatchEvent::Added(obj)) => Some(RawNotification::Change(EventType::Added, obj)),
                    Ok(WatchEvent::Modified(obj)) => {
                        Some(RawNotification::Change(EventType::Modified, obj))
                    }
                    Ok(WatchEvent::Deleted(obj)) => {
                        Some(RawNotification::Change(EventType::Deleted, obj))
                    }
                    Ok(WatchEvent::Bookmark(bookmark)) => {
                        Some(RawNotification::Bookmark(bookmark.metadata.resource_version))
                    }
                    Ok(WatchEvent::Error(e)) if e.code == GONE => {
                        Some(RawNotification::Expired(e.to_string()))
                    }
                    Ok(WatchEvent::Error(e)) => Some(RawNotification::Interrupted(e.to_string())),
                    Err(kube::Error::SerdeError(e)) => Some(RawNotification::Malformed(e.to_string())),
                    Err(e) => Some(RawNotification::Interrupted(e.to_string())),
                }
            })
            .boxed())
    }
}

/// Turns raw notifications of one source into events
#[derive(Clone)]
struct EventTranslator {
    source: String,
    labels: Labels,
    namespace_exclude: Option<Regex>,
}

impl EventTranslator {
    /// `None` when the route lives in an excluded namespace
    fn translate(&self, event_type: EventType, obj: &DynamicObject) -> Option<SinkItem> {
        let namespace = obj.metadata.namespace.as_deref().unwrap_or_default();
        if let Some(re) = &self.namespace_exclude {
            if re.is_match(namespace) {
                debug!(source = %self.source, namespace, "Skipping route in excluded namespace");
                return None;
            }
        }

        let route = match snapshot_from_object(obj) {
            Ok(route) => route,
            Err(e) => return Some(Err(e)),
        };

        let labels = merge_labels(&route, &self.labels);
        record_event(&self.source, event_type.as_str());
        Some(Ok(Event::new(route, event_type, labels)))
    }
}

/// Connection state and resume point, shared with the forwarding task
#[derive(Debug)]
struct Progress {
    state: WatchState,
    resume_from: String,
}

impl Progress {
    fn lock(progress: &Mutex<Progress>) -> MutexGuard<'_, Progress> {
        progress.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Watcher bound to one configured cluster
pub struct SourceWatcher {
    translator: EventTranslator,
    subscriber: Arc<dyn RouteSubscriber>,
    progress: Arc<Mutex<Progress>>,
}

impl SourceWatcher {
    /// Build a watcher for a configured cluster; fails on an invalid exclusion pattern
    pub fn new(config: &SourceConfig) -> Result<Self, ExporterError> {
        let subscriber = Arc::new(KubeRouteSubscriber::new(config));
        Self::with_subscriber(config, subscriber)
    }

    /// Build a watcher around any subscriber
    pub fn with_subscriber(
        config: &SourceConfig,
        subscriber: Arc<dyn RouteSubscriber>,
    ) -> Result<Self, ExporterError> {
        let namespace_exclude = config.exclusion_pattern()?;

        Ok(Self {
            translator: EventTranslator {
                source: config.name(),
                labels: config.labels.clone(),
                namespace_exclude,
            },
            subscriber,
            progress: Arc::new(Mutex::new(Progress {
                state: WatchState::Connecting,
                resume_from: FULL_REPLAY.to_string(),
            })),
        })
    }

    pub fn name(&self) -> &str {
        &self.translator.source
    }

    pub fn state(&self) -> WatchState {
        Progress::lock(&self.progress).state
    }

    /// Resource version the next subscription starts from
    pub fn resume_from(&self) -> String {
        Progress::lock(&self.progress).resume_from.clone()
    }

    fn set_state(&self, state: WatchState) {
        Progress::lock(&self.progress).state = state;
    }

    /// Open one subscription and stream its events.
    ///
    /// The returned channel closes exactly once, when the subscription ends.
    /// The state is updated before the close: `Stopped` if the token was
    /// cancelled, `Connecting` if the remote side went away. Failing to open
    /// is returned as a connection error and is not retried here.
    pub async fn watch(
        &self,
        token: CancellationToken,
    ) -> Result<mpsc::Receiver<SinkItem>, ExporterError> {
        self.set_state(WatchState::Connecting);
        let resume_from = self.resume_from();

        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);

        let subscription = tokio::select! {
            _ = token.cancelled() => {
                self.set_state(WatchState::Stopped);
                return Ok(rx);
            }
            result = self.subscriber.subscribe(&resume_from) => result?,
        };

        self.set_state(WatchState::Streaming);
        info!(source = %self.name(), resume_from = %resume_from, "Route watch started");

        let translator = self.translator.clone();
        let progress = self.progress.clone();
        tokio::spawn(async move {
            let cancelled =
                forward_notifications(subscription, &translator, &progress, &tx, &token).await;

            let next = if cancelled {
                WatchState::Stopped
            } else {
                WatchState::Connecting
            };
            Progress::lock(&progress).state = next;
            drop(tx);

            debug!(source = %translator.source, state = ?next, "Route watch ended");
        });

        Ok(rx)
    }
}

/// Pump one subscription into the channel; returns true when stopped by cancellation
async fn forward_notifications(
    mut subscription: BoxStream<'static, RawNotification>,
    translator: &EventTranslator,
    progress: &Mutex<Progress>,
    tx: &mpsc::Sender<SinkItem>,
    token: &CancellationToken,
) -> bool {
    loop {
        let notification = tokio::select! {
            biased;
            _ = token.cancelled() => return true,
            next = subscription.next() => next,
        };

        let item = match notification {
            None => return false,
            Some(RawNotification::Change(event_type, obj)) => {
                if let Some(version) = &obj.metadata.resource_version {
                    Progress::lock(progress).resume_from = version.clone();
                }
                match translator.translate(event_type, &obj) {
                    Some(item) => item,
                    None => continue,
                }
            }
            Some(RawNotification::Bookmark(version)) => {
                Progress::lock(progress).resume_from = version;
                continue;
            }
            Some(RawNotification::Malformed(message)) => {
                warn!(source = %translator.source, error = %message, "Malformed route notification");
                Err(ExporterError::malformed(message))
            }
            Some(RawNotification::Interrupted(message)) => {
                warn!(source = %translator.source, error = %message, "Route watch interrupted");
                return false;
            }
            Some(RawNotification::Expired(message)) => {
                warn!(source = %translator.source, error = %message, "Resume point expired, replaying all routes");
                Progress::lock(progress).resume_from = FULL_REPLAY.to_string();
                return false;
            }
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => return true,
            sent = tx.send(item) => {
                if sent.is_err() {
                    // Nobody is listening anymore; treat as a permanent stop
                    return true;
                }
            }
        }
    }
}
