//! Polling clients for live telemetry.
//!
//! A [`Poller`] re-fetches one endpoint on a fixed interval and sends each
//! outcome through an mpsc channel. Every tick gets its own child
//! [`CancelToken`]; starting a tick cancels the previous one if its fetch is
//! still running, so a slow response never piles up behind newer ones.
//!
//! Pollers are controlled through cloneable [`PollerHandle`]s, which a
//! [`PollerManager`] can stop as a group.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::client::{ApiClient, CancelToken, Endpoint, HealthInfo, RetryPolicy};
use crate::error::{Error, Result};
use crate::reading::{AccidentEvent, ApiStats, SensorReading};

/// Shortest interval a poller will tick at.
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// What to poll and how often.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// The endpoint to fetch.
    pub endpoint: Endpoint,
    /// Time between fetches.
    pub interval: Duration,
    /// Timeout and retries for each fetch.
    pub policy: RetryPolicy,
}

impl PollerConfig {
    /// Poll the latest sensor reading every 2 seconds.
    #[must_use]
    pub fn latest_sensor() -> Self {
        Self {
            endpoint: Endpoint::LatestSensor,
            interval: Duration::from_secs(2),
            policy: RetryPolicy::polling(),
        }
    }

    /// Poll the accident list every 3 seconds.
    #[must_use]
    pub fn accidents() -> Self {
        Self {
            endpoint: Endpoint::Accidents,
            interval: Duration::from_secs(3),
            policy: RetryPolicy::polling(),
        }
    }

    /// Use a different interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Use a different retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Data returned by one successful poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollData {
    /// A single sensor reading.
    Sensor(SensorReading),
    /// A list of sensor readings.
    Readings(Vec<SensorReading>),
    /// The accident list.
    Accidents(Vec<AccidentEvent>),
    /// API statistics.
    Stats(ApiStats),
    /// A health check answer.
    Health(HealthInfo),
}

/// The outcome of one tick.
#[derive(Debug)]
pub enum PollUpdate {
    /// The fetch succeeded.
    Data {
        /// The endpoint polled.
        endpoint: Endpoint,
        /// What it returned.
        data: PollData,
    },
    /// The fetch failed.
    Failed {
        /// The endpoint polled.
        endpoint: Endpoint,
        /// Why it failed.
        error: Error,
    },
}

impl PollUpdate {
    /// The endpoint this update is for.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::Data { endpoint, .. } | Self::Failed { endpoint, .. } => *endpoint,
        }
    }
}

/// Connection status of a poller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollStatus {
    /// Successful fetches since start.
    pub successes: u64,
    /// Failed fetches since start.
    pub failures: u64,
    /// Failures since the last success.
    pub consecutive_failures: u64,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// When the last successful fetch completed.
    pub last_success: Option<DateTime<Utc>>,
}

impl PollStatus {
    /// Whether the most recent fetch succeeded.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.successes > 0 && self.consecutive_failures == 0
    }

    fn record_success(&mut self) {
        self.successes += 1;
        self.consecutive_failures = 0;
        self.last_success = Some(Utc::now());
    }

    fn record_failure(&mut self, error: &Error) {
        self.failures += 1;
        self.consecutive_failures += 1;
        self.last_error = Some(error.to_string());
    }
}

/// A handle to control a poller.
///
/// This is a lightweight, cloneable handle that can be used to control
/// a poller from multiple tasks.
#[derive(Debug, Clone)]
pub struct PollerHandle {
    endpoint: Endpoint,
    cancel: CancelToken,
    finished: Arc<AtomicBool>,
    status: Arc<Mutex<PollStatus>>,
}

impl PollerHandle {
    fn new(endpoint: Endpoint, cancel: CancelToken) -> Self {
        Self {
            endpoint,
            cancel,
            finished: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(PollStatus::default())),
        }
    }

    /// The endpoint being polled.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Signal the poller to stop and abort its in-flight fetch.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Check whether the poller is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.should_stop() && !self.finished.load(Ordering::SeqCst)
    }

    /// A snapshot of the poller's connection status.
    #[must_use]
    pub fn status(&self) -> PollStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_status(&self, f: impl FnOnce(&mut PollStatus)) {
        f(&mut self.status.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

/// Fetch one endpoint as [`PollData`].
async fn fetch(client: &ApiClient, endpoint: Endpoint, cancel: &CancelToken) -> Result<PollData> {
    Ok(match endpoint {
        Endpoint::LatestSensor => PollData::Sensor(client.latest_sensor(cancel).await?),
        Endpoint::SensorHistory => PollData::Readings(client.sensor_history(cancel).await?),
        Endpoint::SensorAll => PollData::Readings(client.all_sensor_data(cancel).await?),
        Endpoint::Accidents => PollData::Accidents(client.accidents(cancel).await?),
        Endpoint::Stats => PollData::Stats(client.stats(cancel).await?),
        Endpoint::Health => PollData::Health(client.health(cancel).await?),
    })
}

/// Re-fetches an endpoint on a fixed interval.
#[derive(Debug)]
pub struct Poller {
    client: ApiClient,
    config: PollerConfig,
    handle: PollerHandle,
}

impl Poller {
    /// Create a poller that stops when `parent` is cancelled.
    #[must_use]
    pub fn new(client: &ApiClient, config: PollerConfig, parent: &CancelToken) -> Self {
        let handle = PollerHandle::new(config.endpoint, parent.child());
        Self {
            client: client.with_policy(config.policy),
            config,
            handle,
        }
    }

    /// A handle to control this poller.
    #[must_use]
    pub fn handle(&self) -> PollerHandle {
        self.handle.clone()
    }

    /// Run until stopped, cancelled, or the receiver is dropped.
    ///
    /// The first fetch starts immediately.
    pub async fn run(self, tx: mpsc::Sender<PollUpdate>) {
        let endpoint = self.config.endpoint;
        let interval = self.config.interval.max(MIN_INTERVAL);
        if interval != self.config.interval {
            warn!(%endpoint, requested = ?self.config.interval, ?interval, "Poll interval clamped");
        }
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut current: Option<CancelToken> = None;

        info!(%endpoint, ?interval, "Poller started");

        loop {
            tokio::select! {
                biased;
                () = self.handle.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if tx.is_closed() {
                debug!(%endpoint, "Receiver dropped");
                break;
            }

            if let Some(previous) = current.take() {
                previous.cancel();
            }
            let tick = self.handle.cancel.child();
            current = Some(tick.clone());

            let client = self.client.clone();
            let handle = self.handle.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let update = match fetch(&client, endpoint, &tick).await {
                    Ok(data) => {
                        handle.update_status(PollStatus::record_success);
                        PollUpdate::Data { endpoint, data }
                    }
                    // Superseded by a newer tick or the poller stopped.
                    Err(e) if e.is_cancelled() => return,
                    Err(error) => {
                        warn!(%endpoint, error = %error, "Poll failed");
                        handle.update_status(|s| s.record_failure(&error));
                        PollUpdate::Failed { endpoint, error }
                    }
                };
                let _ = tx.send(update).await;
            });
        }

        if let Some(previous) = current {
            previous.cancel();
        }
        self.handle.finished.store(true, Ordering::SeqCst);
        info!(%endpoint, "Poller stopped");
    }
}

/// A collection of pollers that can be managed together.
#[derive(Debug, Default)]
pub struct PollerManager {
    handles: Vec<PollerHandle>,
}

impl PollerManager {
    /// Create a new poller manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a poller handle to manage.
    pub fn add(&mut self, handle: PollerHandle) {
        self.handles.push(handle);
    }

    /// Stop all pollers.
    pub fn stop_all(&self) {
        for handle in &self.handles {
            handle.stop();
        }
    }

    /// Get the number of managed pollers.
    #[must_use]
    pub fn count(&self) -> usize {
        self.handles.len()
    }

    /// Check if any pollers are still running.
    #[must_use]
    pub fn any_running(&self) -> bool {
        self.handles.iter().any(PollerHandle::is_running)
    }

    /// Status of each managed poller.
    #[must_use]
    pub fn statuses(&self) -> Vec<(Endpoint, PollStatus)> {
        self.handles
            .iter()
            .map(|h| (h.endpoint(), h.status()))
            .collect()
    }
}
