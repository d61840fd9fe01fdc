// Room catalog client
// Checks room existence (and lists rooms) against one or more catalog replicas.
// Every call picks a replica through a pluggable selection policy, skips replicas whose
// circuit breaker is open, and never outlives the caller's deadline.

use std::{
    cell::Cell,
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig},
    model::{Deadline, Room, RoomId},
};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Network error on replica {replica}: {message}")]
    NetworkError { replica: String, message: String },

    #[error("Replica {replica} answered with status {status_code}")]
    ApiResponseError { replica: String, status_code: u16 },

    #[error("Malformed response from replica {replica}: {message}")]
    DecodeError { replica: String, message: String },

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Circuit breaker open for all {0} catalog replicas")]
    CircuitBreakerOpen(usize),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Initialization error: {0}")]
    InitError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReplicaEndpoint {
    pub name: String,
    pub url: String,
}

impl ReplicaEndpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        // a failed attempt is not retried unless configured
        Self {
            max_retries: 0,
            initial_backoff_ms: 50,
            max_backoff_ms: 1000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogClientConfig {
    pub replicas: Vec<ReplicaEndpoint>,
    pub request_timeout_ms: u64,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for CatalogClientConfig {
    fn default() -> Self {
        Self {
            replicas: vec![],
            request_timeout_ms: 5000,
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ClientStats {
    requests_sent: AtomicUsize,
    requests_succeeded: AtomicUsize,
    requests_failed: AtomicUsize,
    requests_retried: AtomicUsize,
    requests_timeout: AtomicUsize,
    replicas_skipped: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub requests_sent: usize,
    pub requests_succeeded: usize,
    pub requests_failed: usize,
    pub requests_retried: usize,
    pub requests_timeout: usize,
    pub replicas_skipped: usize,
}

impl ClientStats {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::SeqCst),
            requests_succeeded: self.requests_succeeded.load(Ordering::SeqCst),
            requests_failed: self.requests_failed.load(Ordering::SeqCst),
            requests_retried: self.requests_retried.load(Ordering::SeqCst),
            requests_timeout: self.requests_timeout.load(Ordering::SeqCst),
            replicas_skipped: self.replicas_skipped.load(Ordering::SeqCst),
        }
    }
}

/// One logical channel to a catalog replica.
#[async_trait]
pub trait CatalogReplica: Send + Sync + 'static {
    fn name(&self) -> &str;

    // Ok(None) means the replica answered and the room does not exist
    async fn get_room(&self, room_id: RoomId) -> Result<Option<Room>, CatalogError>;

    async fn list_rooms(&self) -> Result<Vec<Room>, CatalogError>;
}

/// Chooses which replica serves the next attempt.
///
/// `admits(i)` reports whether replica `i` currently accepts calls (its breaker is not open).
/// Returning `None` means no replica can be used.
pub trait SelectionPolicy: Send + Sync + 'static {
    fn select(&self, replica_count: usize, admits: &dyn Fn(usize) -> bool) -> Option<usize>;
}

#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl SelectionPolicy for RoundRobin {
    fn select(&self, replica_count: usize, admits: &dyn Fn(usize) -> bool) -> Option<usize> {
        if replica_count == 0 {
            return None;
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % replica_count;
        (0..replica_count)
            .map(|offset| (start + offset) % replica_count)
            .find(|&idx| admits(idx))
    }
}

struct Replica {
    transport: Arc<dyn CatalogReplica>,
    breaker: CircuitBreaker,
}

pub struct RoomValidationClient {
    replicas: Vec<Replica>,
    policy: Box<dyn SelectionPolicy>,
    retry_config: RetryConfig,
    stats: ClientStats,
}

impl RoomValidationClient {
    pub fn new(
        replicas: Vec<Arc<dyn CatalogReplica>>,
        config: &CatalogClientConfig,
    ) -> Result<Self, ClientError> {
        if replicas.is_empty() {
            return Err(ClientError::ConfigError(
                "at least one room catalog replica is required".to_string(),
            ));
        }

        Ok(Self {
            replicas: replicas
                .into_iter()
                .map(|transport| Replica {
                    transport,
                    breaker: CircuitBreaker::new(&config.circuit_breaker),
                })
                .collect(),
            policy: Box::new(RoundRobin::default()),
            retry_config: config.retry.clone(),
            stats: ClientStats::default(),
        })
    }

    // Builds one HTTP channel per configured endpoint
    pub fn from_config(config: &CatalogClientConfig) -> Result<Self, ClientError> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let replicas = config
            .replicas
            .iter()
            .map(|endpoint| {
                HttpCatalogReplica::new(endpoint, timeout)
                    .map(|replica| Arc::new(replica) as Arc<dyn CatalogReplica>)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(replicas, config)
    }

    pub fn with_policy(mut self, policy: impl SelectionPolicy) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn replica_names(&self) -> Vec<&str> {
        self.replicas.iter().map(|r| r.transport.name()).collect()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Asks the catalog whether `room_id` exists. `Ok(false)` is a definitive "no such room".
    pub async fn exists(&self, room_id: RoomId, deadline: Deadline) -> Result<bool, CatalogError> {
        let room = self
            .call(deadline, |replica| async move { replica.get_room(room_id).await })
            .await?;
        Ok(room.is_some())
    }

    pub async fn list_rooms(&self, deadline: Deadline) -> Result<Vec<Room>, CatalogError> {
        self.call(deadline, |replica| async move { replica.list_rooms().await })
            .await
    }

    // Forcibly clear circuit breakers, returns how many were not closed
    pub fn reset_circuit_breakers(&self) -> usize {
        self.replicas.iter().filter(|r| r.breaker.reset()).count()
    }

    fn pick_replica(&self) -> Option<&Replica> {
        let skipped = Cell::new(0usize);
        let picked = self.policy.select(self.replicas.len(), &|idx| {
            let admitted = self.replicas[idx].breaker.should_allow_call();
            if !admitted {
                skipped.set(skipped.get() + 1);
            }
            admitted
        });

        if skipped.get() > 0 {
            self.stats
                .replicas_skipped
                .fetch_add(skipped.get(), Ordering::SeqCst);
        }
        picked.and_then(|idx| self.replicas.get(idx))
    }

    async fn call<T, F, Fut>(&self, deadline: Deadline, op: F) -> Result<T, CatalogError>
    where
        F: Fn(Arc<dyn CatalogReplica>) -> Fut,
        Fut: Future<Output = Result<T, CatalogError>>,
    {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            if deadline.is_expired() {
                self.stats.requests_timeout.fetch_add(1, Ordering::SeqCst);
                return Err(CatalogError::Timeout(started.elapsed().as_millis() as u64));
            }

            let replica = self
                .pick_replica()
                .ok_or(CatalogError::CircuitBreakerOpen(self.replicas.len()))?;
            let name = replica.transport.name();

            if attempt > 0 {
                self.stats.requests_retried.fetch_add(1, Ordering::SeqCst);
            }
            self.stats.requests_sent.fetch_add(1, Ordering::SeqCst);
            debug!(replica = name, attempt, "calling room catalog");

            let err = match deadline.run(op(replica.transport.clone())).await {
                Ok(Ok(value)) => {
                    replica.breaker.success();
                    self.stats.requests_succeeded.fetch_add(1, Ordering::SeqCst);
                    return Ok(value);
                }
                Ok(Err(err)) => {
                    replica.breaker.fail();
                    self.stats.requests_failed.fetch_add(1, Ordering::SeqCst);
                    warn!(replica = name, attempt, error = %err, "room catalog call failed");
                    err
                }
                // caller's budget ran out; the replica's own request_timeout_ms trips the
                // breaker through the transport error path instead
                Err(_) => {
                    self.stats.requests_timeout.fetch_add(1, Ordering::SeqCst);
                    warn!(replica = name, attempt, "room catalog call hit the deadline");
                    return Err(CatalogError::Timeout(started.elapsed().as_millis() as u64));
                }
            };

            if attempt >= self.retry_config.max_retries {
                return Err(err);
            }

            let backoff = Self::calculate_backoff(attempt, &self.retry_config);
            if backoff >= deadline.remaining() {
                return Err(err);
            }
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    // Helper to calculate exponential backoff with jitter
    pub fn calculate_backoff(retry_attempt: u32, config: &RetryConfig) -> Duration {
        let base_backoff_ms = (config.initial_backoff_ms as f64
            * config.backoff_multiplier.powf(retry_attempt as f64))
        .min(config.max_backoff_ms as f64);

        let jitter = rand::random::<f64>() * config.jitter_factor * base_backoff_ms;
        let backoff_ms = base_backoff_ms * (1.0 - config.jitter_factor / 2.0) + jitter;

        Duration::from_millis(backoff_ms as u64)
    }
}

#[derive(Debug, Deserialize)]
struct ListRoomsResponse {
    rooms: Vec<Room>,
}

/// Catalog replica reached over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpCatalogReplica {
    name: String,
    base_url: String,
    http: reqwest::Client,
}

impl HttpCatalogReplica {
    pub fn new(endpoint: &ReplicaEndpoint, timeout: Duration) -> Result<Self, ClientError> {
        reqwest::Url::parse(&endpoint.url).map_err(|e| {
            ClientError::ConfigError(format!(
                "invalid url {:?} for replica {}: {e}",
                endpoint.url, endpoint.name
            ))
        })?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::InitError(e.to_string()))?;

        Ok(Self {
            name: endpoint.name.clone(),
            base_url: endpoint.url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn rooms_url(&self) -> String {
        format!("{}/v1/rooms", self.base_url)
    }

    fn room_url(&self, room_id: RoomId) -> String {
        format!("{}/v1/rooms/{room_id}", self.base_url)
    }

    fn network_error(&self, err: reqwest::Error) -> CatalogError {
        CatalogError::NetworkError {
            replica: self.name.clone(),
            message: err.to_string(),
        }
    }

    fn decode_error(&self, err: reqwest::Error) -> CatalogError {
        CatalogError::DecodeError {
            replica: self.name.clone(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl CatalogReplica for HttpCatalogReplica {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_room(&self, room_id: RoomId) -> Result<Option<Room>, CatalogError> {
        let res = self
            .http
            .get(self.room_url(room_id))
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        match res.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                res.json::<Room>().await.map(Some).map_err(|e| self.decode_error(e))
            }
            status => Err(CatalogError::ApiResponseError {
                replica: self.name.clone(),
                status_code: status.as_u16(),
            }),
        }
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, CatalogError> {
        let res = self
            .http
            .get(self.rooms_url())
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        let status = res.status();
        if !status.is_success() {
            return Err(CatalogError::ApiResponseError {
                replica: self.name.clone(),
                status_code: status.as_u16(),
            });
        }

        res.json::<ListRoomsResponse>()
            .await
            .map(|body| body.rooms)
            .map_err(|e| self.decode_error(e))
    }
}

// In-process catalog replica for tests, benchmarks and local runs
pub mod mock_catalog {
    use super::*;
    use parking_lot::RwLock;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU64, AtomicU8};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ReplicaMode {
        Normal,
        Outage,
    }

    pub struct MockCatalogReplica {
        name: String,
        mode: AtomicU8,
        rooms: RwLock<BTreeMap<RoomId, Room>>,
        delay_ms: AtomicU64,
        fail_next_requests: AtomicUsize,
        request_count: AtomicUsize,
    }

    impl MockCatalogReplica {
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                mode: AtomicU8::new(0),
                rooms: RwLock::new(BTreeMap::new()),
                delay_ms: AtomicU64::new(0),
                fail_next_requests: AtomicUsize::new(0),
                request_count: AtomicUsize::new(0),
            }
        }

        pub fn with_rooms(self, rooms: impl IntoIterator<Item = Room>) -> Self {
            for room in rooms {
                self.add_room(room);
            }
            self
        }

        pub fn add_room(&self, room: Room) {
            self.rooms.write().insert(room.id, room);
        }

        pub fn remove_room(&self, room_id: RoomId) -> Option<Room> {
            self.rooms.write().remove(&room_id)
        }

        pub fn set_mode(&self, mode: ReplicaMode) {
            let mode_value = match mode {
                ReplicaMode::Normal => 0,
                ReplicaMode::Outage => 1,
            };
            self.mode.store(mode_value, Ordering::SeqCst);
        }

        pub fn set_delay(&self, delay_ms: u64) {
            self.delay_ms.store(delay_ms, Ordering::SeqCst);
        }

        pub fn fail_next_requests(&self, count: usize) {
            self.fail_next_requests.store(count, Ordering::SeqCst);
        }

        pub fn request_count(&self) -> usize {
            self.request_count.load(Ordering::SeqCst)
        }

        async fn simulate(&self) -> Result<(), CatalogError> {
            self.request_count.fetch_add(1, Ordering::SeqCst);

            if self.mode.load(Ordering::SeqCst) == 1 {
                return Err(CatalogError::NetworkError {
                    replica: self.name.clone(),
                    message: "connection refused".to_string(),
                });
            }

            let delay = self.delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let pending = self
                .fail_next_requests
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if pending.is_ok() {
                return Err(CatalogError::ApiResponseError {
                    replica: self.name.clone(),
                    status_code: 500,
                });
            }

            Ok(())
        }
    }

    #[async_trait]
    impl CatalogReplica for MockCatalogReplica {
        fn name(&self) -> &str {
            &self.name
        }

        async fn get_room(&self, room_id: RoomId) -> Result<Option<Room>, CatalogError> {
            self.simulate().await?;
            Ok(self.rooms.read().get(&room_id).cloned())
        }

        async fn list_rooms(&self) -> Result<Vec<Room>, CatalogError> {
            self.simulate().await?;
            Ok(self.rooms.read().values().cloned().collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock_catalog::{MockCatalogReplica, ReplicaMode};
    use super::*;

    fn room(id: RoomId) -> Room {
        Room {
            id,
            name: format!("Room {id}"),
            room_type: "double".to_string(),
            price: 100.0,
        }
    }

    fn replicas(count: usize) -> Vec<Arc<MockCatalogReplica>> {
        (0..count)
            .map(|i| {
                Arc::new(MockCatalogReplica::new(format!("catalog-{i}")).with_rooms([room(7)]))
            })
            .collect()
    }

    fn client(
        replicas: &[Arc<MockCatalogReplica>],
        config: CatalogClientConfig,
    ) -> RoomValidationClient {
        let transports = replicas
            .iter()
            .map(|r| r.clone() as Arc<dyn CatalogReplica>)
            .collect();
        RoomValidationClient::new(transports, &config).unwrap()
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_round_robin_spreads_calls() {
        let replicas = replicas(3);
        let client = client(&replicas, CatalogClientConfig::default());

        for _ in 0..9 {
            assert!(client.exists(7, deadline()).await.unwrap());
        }

        for replica in &replicas {
            assert_eq!(replica.request_count(), 3);
        }
        assert_eq!(client.stats().requests_succeeded, 9);
    }

    #[tokio::test]
    async fn test_missing_room_is_not_a_failure() {
        let replicas = replicas(1);
        let client = client(&replicas, CatalogClientConfig::default());

        assert!(!client.exists(404, deadline()).await.unwrap());
        // breaker stays closed, so the next call still goes through
        assert!(client.exists(7, deadline()).await.unwrap());
        assert_eq!(client.stats().requests_failed, 0);
    }

    #[tokio::test]
    async fn test_unreachable_replica_is_skipped() {
        let replicas = replicas(2);
        replicas[0].set_mode(ReplicaMode::Outage);
        let client = client(&replicas, CatalogClientConfig::default());

        let mut failures = 0;
        for _ in 0..6 {
            if client.exists(7, deadline()).await.is_err() {
                failures += 1;
            }
        }

        // the dead replica is hit once, then its breaker keeps it out of the rotation
        assert_eq!(failures, 1);
        assert_eq!(replicas[0].request_count(), 1);
        assert_eq!(replicas[1].request_count(), 5);
        assert!(client.stats().replicas_skipped >= 1);
    }

    #[tokio::test]
    async fn test_retry_moves_to_next_replica() {
        let replicas = replicas(2);
        replicas[0].set_mode(ReplicaMode::Outage);
        let config = CatalogClientConfig {
            retry: RetryConfig {
                max_retries: 1,
                initial_backoff_ms: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let client = client(&replicas, config);

        for _ in 0..4 {
            assert!(client.exists(7, deadline()).await.unwrap());
        }
        assert_eq!(client.stats().requests_retried, 1);
        assert_eq!(replicas[0].request_count(), 1);
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let replicas = replicas(2);
        replicas[0].fail_next_requests(1);
        replicas[1].fail_next_requests(1);
        let client = client(&replicas, CatalogClientConfig::default());

        let err = client.exists(7, deadline()).await.unwrap_err();
        assert!(matches!(err, CatalogError::ApiResponseError { status_code: 500, .. }));
        assert_eq!(client.stats().requests_sent, 1);
    }

    #[tokio::test]
    async fn test_deadline_bounds_slow_replica() {
        let replicas = replicas(1);
        replicas[0].set_delay(2_000);
        let client = client(&replicas, CatalogClientConfig::default());

        let started = Instant::now();
        let err = client
            .exists(7, Deadline::after(Duration::from_millis(50)))
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_millis(1_000));
        assert_eq!(client.stats().requests_timeout, 1);
    }

    #[tokio::test]
    async fn test_impatient_caller_does_not_open_breaker() {
        let replicas = replicas(1);
        replicas[0].set_delay(30);
        let client = client(&replicas, CatalogClientConfig::default());

        let err = client
            .exists(7, Deadline::after(Duration::from_millis(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Timeout(_)));

        // a slow answer is not an unreachable replica, so it stays in the rotation
        assert!(client.exists(7, deadline()).await.unwrap());
        assert_eq!(replicas[0].request_count(), 2);
        assert_eq!(client.stats().replicas_skipped, 0);
    }

    #[tokio::test]
    async fn test_expired_deadline_makes_no_call() {
        let replicas = replicas(1);
        let client = client(&replicas, CatalogClientConfig::default());

        let err = client
            .exists(7, Deadline::after(Duration::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Timeout(_)));
        assert_eq!(replicas[0].request_count(), 0);
    }

    #[tokio::test]
    async fn test_all_breakers_open_fails_fast() {
        let replicas = replicas(2);
        for replica in &replicas {
            replica.set_mode(ReplicaMode::Outage);
        }
        let client = client(&replicas, CatalogClientConfig::default());

        assert!(client.exists(7, deadline()).await.is_err());
        assert!(client.exists(7, deadline()).await.is_err());

        let err = client.exists(7, deadline()).await.unwrap_err();
        assert!(matches!(err, CatalogError::CircuitBreakerOpen(2)));

        for replica in &replicas {
            replica.set_mode(ReplicaMode::Normal);
        }
        assert_eq!(client.reset_circuit_breakers(), 2);
        assert!(client.exists(7, deadline()).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_rooms() {
        let replicas = replicas(1);
        replicas[0].add_room(room(8));
        let client = client(&replicas, CatalogClientConfig::default());

        let rooms = client.list_rooms(deadline()).await.unwrap();
        let ids: Vec<RoomId> = rooms.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![7, 8]);
    }

    #[test]
    fn test_config_validation() {
        let err = RoomValidationClient::from_config(&CatalogClientConfig::default()).err();
        assert!(matches!(err, Some(ClientError::ConfigError(_))));

        let config = CatalogClientConfig {
            replicas: vec![ReplicaEndpoint::new("bad", "not a url")],
            ..Default::default()
        };
        let err = RoomValidationClient::from_config(&config).err();
        assert!(matches!(err, Some(ClientError::ConfigError(_))));

        let config = CatalogClientConfig {
            replicas: vec![
                ReplicaEndpoint::new("catalog-a", "http://127.0.0.1:50051/"),
                ReplicaEndpoint::new("catalog-b", "http://127.0.0.1:50053"),
            ],
            ..Default::default()
        };
        let client = RoomValidationClient::from_config(&config).unwrap();
        assert_eq!(client.replica_names(), vec!["catalog-a", "catalog-b"]);
    }

    #[test]
    fn test_http_replica_urls() {
        let replica = HttpCatalogReplica::new(
            &ReplicaEndpoint::new("catalog-a", "http://catalog:8080/"),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(replica.room_url(7), "http://catalog:8080/v1/rooms/7");
        assert_eq!(replica.rooms_url(), "http://catalog:8080/v1/rooms");
    }

    #[tokio::test]
    async fn test_http_replica_connection_refused() {
        let replica = HttpCatalogReplica::new(
            &ReplicaEndpoint::new("catalog-a", "http://127.0.0.1:1"),
            Duration::from_secs(1),
        )
        .unwrap();

        let err = replica.get_room(7).await.unwrap_err();
        assert!(matches!(err, CatalogError::NetworkError { .. }));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = RetryConfig {
            max_retries: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 1000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        };

        let first = RoomValidationClient::calculate_backoff(0, &config);
        assert!(first >= Duration::from_millis(95) && first <= Duration::from_millis(105));

        let third = RoomValidationClient::calculate_backoff(2, &config);
        assert!(third >= Duration::from_millis(380) && third <= Duration::from_millis(420));

        let capped = RoomValidationClient::calculate_backoff(10, &config);
        assert!(capped <= Duration::from_millis(1050));
    }
}
