//! Resilient client for the telemetry API.
//!
//! Every request made through [`ApiClient`] is:
//!
//! - **Bounded in time**: each attempt races a timer; the timer is dropped
//!   together with the attempt, whichever side wins.
//! - **Cancellable**: a [`CancelToken`] supplied by the caller aborts the
//!   in-flight attempt and suppresses any further ones.
//! - **Retried**: failed attempts are repeated up to
//!   [`RetryPolicy::retries`] more times.
//!
//! On top of that, [`ApiClient::load_dashboard`] gates a combined load behind
//! a health check and falls back to the built-in demo dataset when the API
//! is down.
//!
//! # Example
//!
//! ```no_run
//! use safedrive::client::{ApiClient, CancelToken, RetryPolicy};
//!
//! # async fn run() -> safedrive::Result<()> {
//! let client = ApiClient::new("https://example.com", RetryPolicy::default())?;
//! let cancel = CancelToken::new();
//! let reading = client.latest_sensor(&cancel).await?;
//! println!("alcohol level: {}", reading.alcohol);
//! # Ok(())
//! # }
//! ```

mod cancel;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::demo;
use crate::error::{Error, Result};
use crate::reading::{AccidentEvent, ApiStats, DataSource, SensorReading};

pub use cancel::CancelToken;
pub use transport::{HttpTransport, Transport, TransportResponse};

#[cfg(test)]
pub(crate) use transport::mock;

/// An API endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// The most recent sensor reading.
    LatestSensor,
    /// Recent sensor readings.
    SensorHistory,
    /// Every stored sensor reading.
    SensorAll,
    /// Recorded accident events.
    Accidents,
    /// Aggregate statistics.
    Stats,
    /// Liveness check.
    Health,
}

impl Endpoint {
    /// The URL path of this endpoint.
    #[must_use]
    pub fn path(&self) -> &'static str {
        match self {
            Self::LatestSensor => "/api/sensor",
            Self::SensorHistory => "/api/sensor/history",
            Self::SensorAll => "/api/sensor/all",
            Self::Accidents => "/api/accidents",
            Self::Stats => "/api/stats",
            Self::Health => "/health",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// Timeout and retry settings for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Time allowed for each attempt.
    pub timeout: Duration,
    /// Extra attempts after the first one fails.
    pub retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retries: 2,
        }
    }
}

impl RetryPolicy {
    /// Policy for polling: short timeout and no retries, the next tick is
    /// the retry.
    #[must_use]
    pub fn polling() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retries: 0,
        }
    }

    /// Total number of attempts this policy allows.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Body of the health endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthInfo {
    /// Reported status, usually `ok`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Server time, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

/// A request that failed during a combined load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    /// The endpoint that failed.
    pub endpoint: Endpoint,
    /// Why it failed.
    pub message: String,
}

/// Everything the dashboard shows, loaded in one go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    /// Whether the data is live or demo data.
    pub source: DataSource,
    /// When the load completed.
    pub fetched_at: DateTime<Utc>,
    /// Sensor readings.
    pub sensor_data: Vec<SensorReading>,
    /// Accident events.
    pub accidents: Vec<AccidentEvent>,
    /// API statistics, if they could be loaded.
    pub statistics: Option<ApiStats>,
    /// Parts of the load that failed and were replaced by empty data.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FetchFailure>,
}

impl DashboardSnapshot {
    /// Check whether every part of the load succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A single object or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

/// Client for the telemetry API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl ApiClient {
    /// Create a client talking HTTP to `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP transport cannot be built.
    pub fn new(base_url: impl Into<String>, policy: RetryPolicy) -> Result<Self> {
        let transport = HttpTransport::new()?;
        Ok(Self::with_transport(base_url, Arc::new(transport), policy))
    }

    /// Create a client over a custom transport.
    #[must_use]
    pub fn with_transport(
        base_url: impl Into<String>,
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
    ) -> Self {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        Self {
            base_url,
            transport,
            policy,
        }
    }

    /// A client sharing this one's transport with a different policy.
    #[must_use]
    pub fn with_policy(&self, policy: RetryPolicy) -> Self {
        Self {
            base_url: self.base_url.clone(),
            transport: Arc::clone(&self.transport),
            policy,
        }
    }

    /// The base URL requests are made against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The retry policy in use.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// The full URL of an endpoint.
    #[must_use]
    pub fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    /// Run one attempt: the request races the timer and the cancel signal.
    async fn attempt(&self, url: &str, cancel: &CancelToken) -> Result<String> {
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(Error::Cancelled { url: url.to_string() });
            }
            result = tokio::time::timeout(self.policy.timeout, self.transport.get(url)) => {
                match result {
                    Ok(response) => response?,
                    Err(_) => return Err(Error::timeout(format!("GET {url}"))),
                }
            }
        };

        if response.is_success() {
            Ok(response.body)
        } else if response.status == 404 {
            Err(Error::EndpointNotFound {
                url: url.to_string(),
            })
        } else {
            debug!(url, status = response.status, body = %response.body, "API error response");
            Err(Error::HttpStatus {
                status: response.status,
            })
        }
    }

    /// Request an endpoint and decode its body, retrying per the policy.
    async fn execute<T, F>(&self, endpoint: Endpoint, cancel: &CancelToken, decode: F) -> Result<T>
    where
        F: Fn(&str) -> Result<T>,
    {
        let url = self.url(endpoint);
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(Error::Cancelled { url });
            }

            let result = self
                .attempt(&url, cancel)
                .await
                .and_then(|body| decode(&body));

            match result {
                Ok(value) => {
                    debug!(url = %url, attempt, "Request succeeded");
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        url = %url,
                        error = %e,
                        attempts_left = max_attempts - attempt,
                        "Request failed, retrying"
                    );
                }
                Err(e) => {
                    if !e.is_cancelled() {
                        warn!(url = %url, error = %e, attempts = attempt, "Request failed");
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Fetch an endpoint and decode its JSON body.
    ///
    /// Bodies wrapped as `{"data": ...}` are unwrapped before decoding.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if `cancel` fires, otherwise the error of the
    /// last failed attempt (`Timeout`, `EndpointNotFound`, `HttpStatus`,
    /// `Transport` or `InvalidResponse`).
    pub async fn fetch_json<T>(&self, endpoint: Endpoint, cancel: &CancelToken) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = self.url(endpoint);
        self.execute(endpoint, cancel, |body| decode_body(&url, body))
            .await
    }

    /// Check the health endpoint.
    ///
    /// A 2xx answer counts as healthy only if its body is a JSON object, so
    /// a proxy or wake-up page served with 200 is retried and then reported
    /// as `InvalidResponse`.
    ///
    /// # Errors
    ///
    /// Returns the error of the last failed attempt.
    pub async fn health(&self, cancel: &CancelToken) -> Result<HealthInfo> {
        self.fetch_json(Endpoint::Health, cancel).await
    }

    /// Check whether the API is reachable and healthy.
    pub async fn check_health(&self, cancel: &CancelToken) -> bool {
        self.health(cancel).await.is_ok()
    }

    /// Fetch the most recent sensor reading.
    ///
    /// If the API answers with a list, the newest reading in it is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the list is empty.
    pub async fn latest_sensor(&self, cancel: &CancelToken) -> Result<SensorReading> {
        let url = self.url(Endpoint::LatestSensor);
        match self
            .fetch_json::<OneOrMany<SensorReading>>(Endpoint::LatestSensor, cancel)
            .await?
        {
            OneOrMany::One(reading) => Ok(reading),
            OneOrMany::Many(readings) => readings
                .into_iter()
                .max_by_key(|r| r.timestamp)
                .ok_or_else(|| Error::InvalidResponse {
                    url,
                    message: "no sensor readings".to_string(),
                }),
        }
    }

    /// Fetch recent sensor readings.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn sensor_history(&self, cancel: &CancelToken) -> Result<Vec<SensorReading>> {
        self.fetch_json(Endpoint::SensorHistory, cancel).await
    }

    /// Fetch every stored sensor reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn all_sensor_data(&self, cancel: &CancelToken) -> Result<Vec<SensorReading>> {
        self.fetch_json(Endpoint::SensorAll, cancel).await
    }

    /// Fetch recorded accident events.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn accidents(&self, cancel: &CancelToken) -> Result<Vec<AccidentEvent>> {
        self.fetch_json(Endpoint::Accidents, cancel).await
    }

    /// Fetch aggregate statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn stats(&self, cancel: &CancelToken) -> Result<ApiStats> {
        self.fetch_json(Endpoint::Stats, cancel).await
    }

    /// Load sensor data, accidents and statistics behind a health check.
    ///
    /// When the health check fails and `demo_fallback` is set, the built-in
    /// demo dataset is returned instead. Otherwise the three parts are
    /// fetched concurrently; parts that fail are replaced with empty data
    /// and listed in [`DashboardSnapshot::failures`].
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if `cancel` fires, the health error if the API is
    /// down and `demo_fallback` is off, and `AllRequestsFailed` if no part
    /// could be loaded.
    pub async fn load_dashboard(
        &self,
        cancel: &CancelToken,
        demo_fallback: bool,
    ) -> Result<DashboardSnapshot> {
        if let Err(e) = self.health(cancel).await {
            if e.is_cancelled() || !demo_fallback {
                return Err(e);
            }
            warn!(error = %e, "API unavailable, using demo data");
            return Ok(demo::snapshot());
        }

        let (sensors, accidents, stats) = tokio::join!(
            self.all_sensor_data(cancel),
            self.accidents(cancel),
            self.stats(cancel),
        );

        if cancel.is_cancelled() {
            return Err(Error::Cancelled {
                url: self.base_url.clone(),
            });
        }

        let mut failures = Vec::new();
        let mut record = |endpoint: Endpoint, e: &Error| {
            failures.push(FetchFailure {
                endpoint,
                message: e.to_string(),
            });
        };

        let sensor_data = sensors.unwrap_or_else(|e| {
            record(Endpoint::SensorAll, &e);
            Vec::new()
        });
        let accidents = accidents.unwrap_or_else(|e| {
            record(Endpoint::Accidents, &e);
            Vec::new()
        });
        let statistics = match stats {
            Ok(stats) => Some(stats),
            Err(e) => {
                record(Endpoint::Stats, &e);
                None
            }
        };

        if failures.len() == 3 {
            return Err(Error::AllRequestsFailed);
        }
        if !failures.is_empty() {
            warn!(failed = failures.len(), "Some data failed to load");
        }

        info!(
            readings = sensor_data.len(),
            accidents = accidents.len(),
            "Dashboard data loaded"
        );
        Ok(DashboardSnapshot {
            source: DataSource::Live,
            fetched_at: Utc::now(),
            sensor_data,
            accidents,
            statistics,
            failures,
        })
    }
}

/// Decode a JSON body, unwrapping a `{"data": ...}` envelope.
fn decode_body<T: DeserializeOwned>(url: &str, body: &str) -> Result<T> {
    let invalid = |e: serde_json::Error| Error::InvalidResponse {
        url: url.to_string(),
        message: e.to_string(),
    };

    let mut value: serde_json::Value = serde_json::from_str(body).map_err(invalid)?;
    if let Some(inner) = value
        .as_object_mut()
        .and_then(|obj| obj.remove("data"))
        .filter(|inner| !inner.is_null())
    {
        value = inner;
    }
    serde_json::from_value(value).map_err(invalid)
}

#[cfg(test)]
mod tests {
    use super::mock::{MockTransport, Step};
    use super::*;

    const BASE: &str = "http://telemetry.test";

    fn client(transport: MockTransport, policy: RetryPolicy) -> (ApiClient, Arc<MockTransport>) {
        let transport = Arc::new(transport);
        let client = ApiClient::with_transport(BASE, transport.clone(), policy);
        (client, transport)
    }

    fn fast_policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(100),
            retries,
        }
    }

    const READING: &str = r#"{"id": 1, "alcohol": 0.01, "distance": 150, "seatbelt": true, "impact": 0.9}"#;

    #[test]
    fn test_endpoint_paths() {
        assert_eq!(Endpoint::LatestSensor.path(), "/api/sensor");
        assert_eq!(Endpoint::SensorHistory.path(), "/api/sensor/history");
        assert_eq!(Endpoint::SensorAll.path(), "/api/sensor/all");
        assert_eq!(Endpoint::Accidents.path(), "/api/accidents");
        assert_eq!(Endpoint::Stats.path(), "/api/stats");
        assert_eq!(Endpoint::Health.path(), "/health");
        assert_eq!(Endpoint::Stats.to_string(), "/api/stats");
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.timeout, Duration::from_secs(10));
        assert_eq!(policy.retries, 2);
        assert_eq!(policy.max_attempts(), 3);

        let polling = RetryPolicy::polling();
        assert_eq!(polling.retries, 0);
        assert_eq!(polling.max_attempts(), 1);
    }

    #[test]
    fn test_url_strips_trailing_slash() {
        let (client, _) = client(MockTransport::new(), RetryPolicy::default());
        assert_eq!(client.url(Endpoint::Health), "http://telemetry.test/health");

        let other = ApiClient::with_transport(
            "http://host/ ",
            Arc::new(MockTransport::new()),
            RetryPolicy::default(),
        );
        assert_eq!(other.url(Endpoint::Stats), "http://host/api/stats");
    }

    #[test]
    fn test_decode_body_unwraps_data() {
        let wrapped: Vec<i32> = decode_body("u", r#"{"data": [1, 2, 3]}"#).unwrap();
        assert_eq!(wrapped, vec![1, 2, 3]);

        let bare: Vec<i32> = decode_body("u", "[4]").unwrap();
        assert_eq!(bare, vec![4]);

        let err = decode_body::<Vec<i32>>("u", "<html>").unwrap_err();
        assert!(matches!(err, Error::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_fetch_success_first_attempt() {
        let (client, transport) = client(
            MockTransport::new().ok("/api/sensor", READING),
            fast_policy(2),
        );

        let reading = client.latest_sensor(&CancelToken::new()).await.unwrap();
        assert_eq!(reading.id, Some(1));
        assert!(reading.seatbelt);
        assert_eq!(transport.calls("/api/sensor"), 1);
    }

    #[tokio::test]
    async fn test_latest_sensor_from_list_picks_newest() {
        let body = r#"[
            {"id": 1, "timestamp": "2025-01-01T00:00:00Z"},
            {"id": 3, "timestamp": "2025-01-03T00:00:00Z"},
            {"id": 2, "timestamp": "2025-01-02T00:00:00Z"}
        ]"#;
        let (client, _) = client(MockTransport::new().ok("/api/sensor", body), fast_policy(0));

        let reading = client.latest_sensor(&CancelToken::new()).await.unwrap();
        assert_eq!(reading.id, Some(3));
    }

    #[tokio::test]
    async fn test_latest_sensor_empty_list_is_invalid() {
        let (client, _) = client(MockTransport::new().ok("/api/sensor", "[]"), fast_policy(0));

        let err = client.latest_sensor(&CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let transport = MockTransport::new().route(
            "/api/accidents",
            vec![
                Step::Respond(500, "boom".to_string()),
                Step::Fail("connection reset".to_string()),
                Step::Respond(200, r#"[{"id": "a1", "impact": 4.2}]"#.to_string()),
            ],
        );
        let (client, transport) = client(transport, fast_policy(2));

        let accidents = client.accidents(&CancelToken::new()).await.unwrap();
        assert_eq!(accidents.len(), 1);
        assert_eq!(accidents[0].id, "a1");
        assert_eq!(transport.calls("/api/accidents"), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let transport =
            MockTransport::new().route("/api/stats", vec![Step::Respond(503, String::new())]);
        let (client, transport) = client(transport, fast_policy(2));

        let err = client.stats(&CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::HttpStatus { status: 503 }));
        assert_eq!(transport.calls("/api/stats"), 3);
    }

    #[tokio::test]
    async fn test_404_reports_endpoint_not_found() {
        let (client, transport) = client(MockTransport::new(), fast_policy(1));

        let err = client.stats(&CancelToken::new()).await.unwrap_err();
        match err {
            Error::EndpointNotFound { url } => assert_eq!(url, "http://telemetry.test/api/stats"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_retried_then_reported() {
        let transport = MockTransport::new().route(
            "/api/sensor",
            vec![Step::Delay(
                Duration::from_secs(5),
                200,
                READING.to_string(),
            )],
        );
        let (client, transport) = client(transport, fast_policy(1));

        let started = std::time::Instant::now();
        let err = client.latest_sensor(&CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(transport.calls("/api/sensor"), 2);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_timeout_then_success() {
        let transport = MockTransport::new().route(
            "/api/sensor",
            vec![
                Step::Delay(Duration::from_secs(5), 200, READING.to_string()),
                Step::Respond(200, READING.to_string()),
            ],
        );
        let (client, _) = client(transport, fast_policy(1));

        assert!(client.latest_sensor(&CancelToken::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_json_is_retried() {
        let transport = MockTransport::new().route(
            "/api/sensor/history",
            vec![
                Step::Respond(200, "<html>".to_string()),
                Step::Respond(200, format!("[{READING}]")),
            ],
        );
        let (client, _) = client(transport, fast_policy(1));

        let history = client.sensor_history(&CancelToken::new()).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_request() {
        let (client, transport) = client(
            MockTransport::new().ok("/api/sensor", READING),
            fast_policy(2),
        );
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = client.latest_sensor(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_request_without_retry() {
        let transport = MockTransport::new().route(
            "/api/sensor",
            vec![Step::Delay(
                Duration::from_secs(5),
                200,
                READING.to_string(),
            )],
        );
        let policy = RetryPolicy {
            timeout: Duration::from_secs(10),
            retries: 3,
        };
        let (client, transport) = client(transport, policy);
        let cancel = CancelToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = client.latest_sensor(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(transport.calls("/api/sensor"), 1);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_health_accepts_empty_object() {
        let (client, _) = client(MockTransport::new().ok("/health", "{}"), fast_policy(0));

        let info = client.health(&CancelToken::new()).await.unwrap();
        assert_eq!(info, HealthInfo::default());
        assert!(client.check_health(&CancelToken::new()).await);
    }

    #[tokio::test]
    async fn test_health_rejects_non_json_body() {
        let (client, transport) = client(
            MockTransport::new().ok("/health", "<html>Service waking up</html>"),
            fast_policy(2),
        );

        let err = client.health(&CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse { .. }));
        assert_eq!(transport.calls("/health"), 3);
        assert!(!client.check_health(&CancelToken::new()).await);
    }

    #[tokio::test]
    async fn test_health_parses_server_time() {
        let (client, _) = client(
            MockTransport::new().ok("/health", r#"{"status": "ok", "time": "2025-04-23T20:00:00Z"}"#),
            fast_policy(0),
        );

        let info = client.health(&CancelToken::new()).await.unwrap();
        assert_eq!(info.status.as_deref(), Some("ok"));
        assert_eq!(info.time.as_deref(), Some("2025-04-23T20:00:00Z"));
    }

    #[tokio::test]
    async fn test_check_health_false_when_down() {
        let (client, _) = client(
            MockTransport::new().route("/health", vec![Step::Fail("refused".to_string())]),
            fast_policy(1),
        );
        assert!(!client.check_health(&CancelToken::new()).await);
    }

    fn healthy() -> MockTransport {
        MockTransport::new().ok("/health", r#"{"status": "ok"}"#)
    }

    #[tokio::test]
    async fn test_load_dashboard_live() {
        let transport = healthy()
            .ok("/api/sensor/all", &format!(r#"{{"data": [{READING}]}}"#))
            .ok("/api/accidents", r#"[{"id": "x", "impact": 6.5}]"#)
            .ok("/api/stats", r#"{"totalReadings": 1}"#);
        let (client, _) = client(transport, fast_policy(0));

        let snapshot = client
            .load_dashboard(&CancelToken::new(), true)
            .await
            .unwrap();
        assert_eq!(snapshot.source, DataSource::Live);
        assert_eq!(snapshot.sensor_data.len(), 1);
        assert_eq!(snapshot.accidents.len(), 1);
        assert_eq!(snapshot.statistics.unwrap().total_readings, Some(1));
        assert!(snapshot.failures.is_empty());
    }

    #[tokio::test]
    async fn test_load_dashboard_falls_back_to_demo() {
        let transport = MockTransport::new()
            .route("/health", vec![Step::Fail("refused".to_string())])
            .ok("/api/sensor/all", "[]");
        let (client, transport) = client(transport, fast_policy(1));

        let snapshot = client
            .load_dashboard(&CancelToken::new(), true)
            .await
            .unwrap();
        assert_eq!(snapshot.source, DataSource::Demo);
        assert!(!snapshot.sensor_data.is_empty());
        assert!(!snapshot.accidents.is_empty());
        assert!(snapshot.statistics.is_some());
        // Data endpoints are never touched once the health check fails.
        assert_eq!(transport.calls("/api/sensor/all"), 0);
    }

    #[tokio::test]
    async fn test_load_dashboard_falls_back_on_html_health_page() {
        let transport = MockTransport::new()
            .ok("/health", "<html>Service waking up</html>")
            .route("/api/sensor/all", vec![Step::Respond(503, String::new())]);
        let (client, transport) = client(transport, fast_policy(1));

        let snapshot = client
            .load_dashboard(&CancelToken::new(), true)
            .await
            .unwrap();
        assert_eq!(snapshot.source, DataSource::Demo);
        assert_eq!(transport.calls("/health"), 2);
        assert_eq!(transport.calls("/api/sensor/all"), 0);
    }

    #[tokio::test]
    async fn test_load_dashboard_without_fallback_reports_health_error() {
        let transport =
            MockTransport::new().route("/health", vec![Step::Respond(502, String::new())]);
        let (client, _) = client(transport, fast_policy(0));

        let err = client
            .load_dashboard(&CancelToken::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HttpStatus { status: 502 }));
    }

    #[tokio::test]
    async fn test_load_dashboard_partial_failure() {
        let transport = healthy()
            .ok("/api/sensor/all", &format!("[{READING}]"))
            .route("/api/stats", vec![Step::Respond(500, String::new())]);
        let (client, _) = client(transport, fast_policy(0));

        let snapshot = client
            .load_dashboard(&CancelToken::new(), true)
            .await
            .unwrap();
        assert_eq!(snapshot.sensor_data.len(), 1);
        assert!(snapshot.accidents.is_empty());
        assert!(snapshot.statistics.is_none());
        assert!(!snapshot.is_complete());

        let failed: Vec<Endpoint> = snapshot.failures.iter().map(|f| f.endpoint).collect();
        assert!(failed.contains(&Endpoint::Accidents));
        assert!(failed.contains(&Endpoint::Stats));
        assert!(!failed.contains(&Endpoint::SensorAll));
    }

    #[tokio::test]
    async fn test_load_dashboard_all_failed() {
        let (client, _) = client(healthy(), fast_policy(0));

        let err = client
            .load_dashboard(&CancelToken::new(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AllRequestsFailed));
    }

    #[tokio::test]
    async fn test_load_dashboard_cancelled() {
        let (client, _) = client(healthy(), fast_policy(0));
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = client.load_dashboard(&cancel, true).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_with_policy_shares_transport() {
        let (client, transport) = client(healthy(), fast_policy(0));
        let other = client.with_policy(RetryPolicy::polling());

        assert_eq!(other.policy(), RetryPolicy::polling());
        assert!(other.check_health(&CancelToken::new()).await);
        assert_eq!(transport.calls("/health"), 1);
    }
}
