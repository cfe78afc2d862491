use crate::clock::{duration_millis, Clock, SystemClock};
use crate::error::{retry_after_secs, Result, StoreError, ThrottlerError};
use crate::identity::{IdentityProvider, RealIp};
use crate::key_generator::{IdentityKey, KeyGenerator};
use crate::key_lock::KeyLocks;
use crate::record::ThrottleRecord;
use crate::store::{MemoryStore, Store};
use axum::extract::Request;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_MAX_REQUESTS: u64 = 10;

/// Budget a client may spend before being rate limited.
///
/// A client is limited once it has `max_requests` hits and its latest hit
/// is at most `interval` old. The window trails the latest hit, so a client
/// that stays quiet for longer than `interval` is let through again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleCondition {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub max_requests: u64,
}

impl Default for ThrottleCondition {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_requests: DEFAULT_MAX_REQUESTS,
        }
    }
}

impl ThrottleCondition {
    pub fn new(interval: Duration, max_requests: u64) -> Self {
        Self {
            interval,
            max_requests,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(ThrottlerError::Configuration(
                "Throttle interval must be greater than 0".to_string(),
            ));
        }
        if self.max_requests == 0 {
            return Err(ThrottlerError::Configuration(
                "Max requests must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// What `is_rate_limited` answers when the store read or the record decode
/// fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// Treat the client as not limited.
    #[default]
    Open,
    /// Treat the client as limited. A store outage then rejects everyone.
    Closed,
}

/// Snapshot of one client's throttle record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThrottleStatus {
    pub key: String,
    pub hits: u64,
    pub attempts_left: u64,
    pub rate_limited: bool,
    pub first_throttled_at: u64,
    pub last_throttled_at: u64,
    pub retry_after_secs: Option<u64>,
}

/// Tracks hits per client in a [`Store`] and decides who is rate limited.
///
/// Request-level methods resolve the store key before returning their
/// future, so the future does not borrow the (non-`Sync`) request body.
///
/// The throttler keeps no state of its own beyond configuration. Without
/// [`ThrottlerBuilder::serialize_per_key`], concurrent `throttle` calls for
/// one client race on read-modify-write and may lose increments.
#[derive(Clone)]
pub struct Throttler {
    identity_provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn Store>,
    key_generator: Arc<dyn KeyGenerator>,
    condition: ThrottleCondition,
    failure_mode: FailureMode,
    clock: Arc<dyn Clock>,
    store_timeout: Option<Duration>,
    key_locks: Option<KeyLocks>,
}

impl Default for Throttler {
    fn default() -> Self {
        ThrottlerBuilder::default().assemble()
    }
}

impl Throttler {
    pub fn builder() -> ThrottlerBuilder {
        ThrottlerBuilder::default()
    }

    pub fn condition(&self) -> ThrottleCondition {
        self.condition
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Store key the request's client is tracked under.
    pub fn client_key(&self, request: &Request) -> String {
        self.key_for(&self.identity_provider.identify(request))
    }

    /// Store key for an already resolved identity.
    pub fn key_for(&self, identity: &str) -> String {
        self.key_generator.generate_key(identity)
    }

    /// Records one hit for the request's client.
    ///
    /// Returns [`ThrottlerError::RateLimited`] without touching the record
    /// when the client is already limited.
    pub fn throttle(&self, request: &Request) -> impl Future<Output = Result<()>> + Send + '_ {
        let key = self.client_key(request);
        async move { self.throttle_key(&key).await.map(|_| ()) }
    }

    pub async fn throttle_identity(&self, identity: &str) -> Result<()> {
        self.throttle_key(&self.key_for(identity)).await.map(|_| ())
    }

    /// Like [`Throttler::throttle`], returning the attempts left after this
    /// hit without a second store read.
    pub fn throttle_remaining(
        &self,
        request: &Request,
    ) -> impl Future<Output = Result<u64>> + Send + '_ {
        let key = self.client_key(request);
        async move {
            let record = self.throttle_key(&key).await?;
            Ok(self.condition.max_requests.saturating_sub(record.hits))
        }
    }

    /// Whether the request's client is currently limited. Store and decode
    /// failures resolve according to the configured [`FailureMode`].
    pub fn is_rate_limited(&self, request: &Request) -> impl Future<Output = bool> + Send + '_ {
        let key = self.client_key(request);
        async move { self.is_rate_limited_key(&key).await }
    }

    pub async fn is_rate_limited_identity(&self, identity: &str) -> bool {
        self.is_rate_limited_key(&self.key_for(identity)).await
    }

    /// Forgets the request's client. Clearing an unknown client is a no-op.
    pub fn clear(&self, request: &Request) -> impl Future<Output = Result<()>> + Send + '_ {
        let key = self.client_key(request);
        async move { self.clear_key(&key).await }
    }

    pub async fn clear_identity(&self, identity: &str) -> Result<()> {
        self.clear_key(&self.key_for(identity)).await
    }

    /// Hits recorded for the request's client, or
    /// [`ThrottlerError::NotThrottled`] if it has no record.
    pub fn attempts(&self, request: &Request) -> impl Future<Output = Result<u64>> + Send + '_ {
        let key = self.client_key(request);
        async move { self.attempts_key(&key).await }
    }

    pub async fn attempts_identity(&self, identity: &str) -> Result<u64> {
        self.attempts_key(&self.key_for(identity)).await
    }

    /// `max_requests - hits`, floored at zero.
    pub fn attempts_left(
        &self,
        request: &Request,
    ) -> impl Future<Output = Result<u64>> + Send + '_ {
        let key = self.client_key(request);
        async move { self.attempts_left_key(&key).await }
    }

    pub async fn attempts_left_identity(&self, identity: &str) -> Result<u64> {
        self.attempts_left_key(&self.key_for(identity)).await
    }

    pub fn status(
        &self,
        request: &Request,
    ) -> impl Future<Output = Result<ThrottleStatus>> + Send + '_ {
        let key = self.client_key(request);
        async move { self.status_key(&key).await }
    }

    pub async fn status_identity(&self, identity: &str) -> Result<ThrottleStatus> {
        self.status_key(&self.key_for(identity)).await
    }

    async fn throttle_key(&self, key: &str) -> Result<ThrottleRecord> {
        let _guard = match &self.key_locks {
            Some(locks) => Some(locks.lock(key).await),
            None => None,
        };

        let now = self.clock.now_millis();

        let record = match self.load(key).await {
            Ok(Some(mut record)) => {
                if self.is_limited(&record, now) {
                    debug!(key = %key, hits = record.hits, "Client is rate limited");
                    return Err(ThrottlerError::RateLimited {
                        retry_after: self.retry_after(&record, now),
                    });
                }
                record.hit(now);
                record
            }
            Ok(None) => ThrottleRecord::first(now),
            // Failure mode only governs `is_rate_limited`; callers of
            // `throttle` see the store or decode error as is.
            Err(err) => return Err(err),
        };

        let bytes = record.encode()?;
        self.store_call(self.store.set(key, bytes, self.condition.interval))
            .await?;

        debug!(key = %key, hits = record.hits, "Throttled client");
        Ok(record)
    }

    async fn is_rate_limited_key(&self, key: &str) -> bool {
        match self.load(key).await {
            Ok(Some(record)) => self.is_limited(&record, self.clock.now_millis()),
            Ok(None) => false,
            Err(err) => {
                let limited = self.failure_mode == FailureMode::Closed;
                warn!(
                    key = %key,
                    error = %err,
                    limited,
                    "Throttle state unreadable, applying failure mode"
                );
                limited
            }
        }
    }

    async fn clear_key(&self, key: &str) -> Result<()> {
        if !self.store_call(self.store.has(key)).await? {
            return Ok(());
        }

        self.store_call(self.store.delete(key)).await?;
        debug!(key = %key, "Cleared client");
        Ok(())
    }

    async fn attempts_key(&self, key: &str) -> Result<u64> {
        Ok(self.require(key).await?.hits)
    }

    async fn attempts_left_key(&self, key: &str) -> Result<u64> {
        let hits = self.attempts_key(key).await?;
        Ok(self.condition.max_requests.saturating_sub(hits))
    }

    async fn status_key(&self, key: &str) -> Result<ThrottleStatus> {
        let record = self.require(key).await?;
        let now = self.clock.now_millis();
        let rate_limited = self.is_limited(&record, now);

        Ok(ThrottleStatus {
            key: key.to_string(),
            hits: record.hits,
            attempts_left: self.condition.max_requests.saturating_sub(record.hits),
            rate_limited,
            first_throttled_at: record.first_throttled_at,
            last_throttled_at: record.last_throttled_at,
            retry_after_secs: rate_limited
                .then(|| retry_after_secs(self.retry_after(&record, now))),
        })
    }

    async fn require(&self, key: &str) -> Result<ThrottleRecord> {
        self.load(key).await?.ok_or(ThrottlerError::NotThrottled)
    }

    async fn load(&self, key: &str) -> Result<Option<ThrottleRecord>> {
        if !self.store_call(self.store.has(key)).await? {
            return Ok(None);
        }

        let bytes = match self.store_call(self.store.get(key)).await {
            Ok(bytes) => bytes,
            // Expired between the two calls.
            Err(StoreError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        Ok(Some(ThrottleRecord::decode(&bytes)?))
    }

    fn is_limited(&self, record: &ThrottleRecord, now: u64) -> bool {
        record.hits >= self.condition.max_requests
            && record.idle_millis(now) <= duration_millis(self.condition.interval)
    }

    fn retry_after(&self, record: &ThrottleRecord, now: u64) -> Duration {
        self.condition
            .interval
            .saturating_sub(Duration::from_millis(record.idle_millis(now)))
    }

    async fn store_call<T>(
        &self,
        call: impl Future<Output = std::result::Result<T, StoreError>>,
    ) -> std::result::Result<T, StoreError> {
        match self.store_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| StoreError::Timeout(limit))?,
            None => call.await,
        }
    }
}

/// Configures a [`Throttler`]. Unset parts default to [`RealIp`],
/// [`IdentityKey`], a fresh [`MemoryStore`] and [`ThrottleCondition::default`].
#[derive(Default)]
pub struct ThrottlerBuilder {
    identity_provider: Option<Arc<dyn IdentityProvider>>,
    store: Option<Arc<dyn Store>>,
    key_generator: Option<Arc<dyn KeyGenerator>>,
    condition: ThrottleCondition,
    failure_mode: FailureMode,
    clock: Option<Arc<dyn Clock>>,
    store_timeout: Option<Duration>,
    serialize_per_key: bool,
}

impl ThrottlerBuilder {
    /// Changes which requests count as the same client.
    pub fn identity_provider(mut self, provider: impl IdentityProvider + 'static) -> Self {
        self.identity_provider = Some(Arc::new(provider));
        self
    }

    pub fn store(mut self, store: impl Store + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn shared_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn key_generator(mut self, generator: impl KeyGenerator + 'static) -> Self {
        self.key_generator = Some(Arc::new(generator));
        self
    }

    pub fn throttle_condition(mut self, interval: Duration, max_requests: u64) -> Self {
        self.condition = ThrottleCondition::new(interval, max_requests);
        self
    }

    pub fn failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Time source for record timestamps. The default memory store shares it.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Bounds every store call; an elapsed call fails with
    /// [`StoreError::Timeout`].
    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = Some(timeout);
        self
    }

    /// Serializes `throttle` per key inside this process so concurrent hits
    /// are never lost. Processes sharing a store can still race.
    pub fn serialize_per_key(mut self, enabled: bool) -> Self {
        self.serialize_per_key = enabled;
        self
    }

    pub fn build(self) -> Result<Throttler> {
        self.condition.validate()?;
        Ok(self.assemble())
    }

    fn assemble(self) -> Throttler {
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::with_clock(clock.clone())));

        Throttler {
            identity_provider: self.identity_provider.unwrap_or_else(|| Arc::new(RealIp)),
            store,
            key_generator: self.key_generator.unwrap_or_else(|| Arc::new(IdentityKey)),
            condition: self.condition,
            failure_mode: self.failure_mode,
            clock,
            store_timeout: self.store_timeout,
            key_locks: self.serialize_per_key.then(KeyLocks::default),
        }
    }
}
