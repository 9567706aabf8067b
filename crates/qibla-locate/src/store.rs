//! Location acquisition and caching.
//!
//! `LocationStore` resolves the observer's location in layers: a fresh
//! cached record, then a device fix, then best-effort place-name lookup.
//! Concurrent `resolve` calls share a single in-flight resolution.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::cache::{load_record, store_record, CacheStore};
use crate::geocode::ReverseGeocoder;
use crate::position::{unsupported, PermissionState, PositionOptions, PositionProvider};
use crate::types::{LocationError, LocationRecord};

/// Cached records stamped further ahead of the local clock than this are
/// discarded instead of served.
const MAX_FUTURE_SKEW_SECS: i64 = 60;

/// Outcome shared with every caller of one resolution.
pub type ResolveOutcome = Result<LocationRecord, LocationError>;

/// Cache and acquisition policy.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// A cached record at least this old is not served
    pub max_age: chrono::Duration,
    /// Minimum gap between place-name retries for a cached record with
    /// an `Unknown` field
    pub enrichment_retry: chrono::Duration,
    pub position: PositionOptions,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_age: chrono::Duration::minutes(30),
            enrichment_retry: chrono::Duration::minutes(5),
            position: PositionOptions::default(),
        }
    }
}

/// Where the most recent resolution is (or ended).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolvePhase {
    #[default]
    Idle,
    AwaitingPermission,
    Resolving,
    Resolved,
    Failed,
}

#[derive(Debug, Default)]
struct StoreState {
    current: Option<LocationRecord>,
    phase: ResolvePhase,
    /// Newest `captured_at` this store stamped on a device fix
    last_captured_at: Option<DateTime<Utc>>,
}

struct InFlight {
    forced: bool,
    rx: watch::Receiver<Option<ResolveOutcome>>,
}

enum Role {
    Leader(watch::Sender<Option<ResolveOutcome>>),
    /// Share the running resolution's outcome
    Follower(watch::Receiver<Option<ResolveOutcome>>),
    /// Wait for the running resolution to finish, then start our own
    Queued(watch::Receiver<Option<ResolveOutcome>>),
}

/// Clears the in-flight slot when the leading resolution finishes or is
/// dropped mid-way.
struct InFlightGuard<'a> {
    slot: &'a Mutex<Option<InFlight>>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.slot.lock().take();
    }
}

/// Owns the observer's location record and the policy for refreshing it.
pub struct LocationStore<P, G, C> {
    positioning: P,
    geocoder: G,
    cache: C,
    options: StoreOptions,
    state: Mutex<StoreState>,
    in_flight: Mutex<Option<InFlight>>,
}

impl<P, G, C> LocationStore<P, G, C>
where
    P: PositionProvider,
    G: ReverseGeocoder,
    C: CacheStore,
{
    pub fn new(positioning: P, geocoder: G, cache: C, options: StoreOptions) -> Self {
        Self {
            positioning,
            geocoder,
            cache,
            options,
            state: Mutex::new(StoreState::default()),
            in_flight: Mutex::new(None),
        }
    }

    pub fn phase(&self) -> ResolvePhase {
        self.state.lock().phase
    }

    /// Last record this store resolved, without touching cache or device.
    pub fn current(&self) -> Option<LocationRecord> {
        self.state.lock().current.clone()
    }

    /// Resolve the observer's location.
    ///
    /// Unless `force_refresh`, a cached record younger than `max_age` is
    /// returned without querying the device.
    ///
    /// # Errors
    /// `UnsupportedCapability`, `PermissionDenied`, `PositionUnavailable`,
    /// `Timeout`, or `Other` for an unclassified device failure. Place-name
    /// lookup failures never surface here.
    pub async fn resolve(&self, force_refresh: bool) -> ResolveOutcome {
        loop {
            let role = {
                let mut slot = self.in_flight.lock();
                match slot.as_ref() {
                    Some(flight) if flight.forced || !force_refresh => {
                        Role::Follower(flight.rx.clone())
                    }
                    Some(flight) => Role::Queued(flight.rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        *slot = Some(InFlight {
                            forced: force_refresh,
                            rx,
                        });
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Leader(tx) => {
                    let _guard = InFlightGuard {
                        slot: &self.in_flight,
                    };
                    let outcome = self.run(force_refresh).await;
                    tx.send_replace(Some(outcome.clone()));
                    return outcome;
                }
                Role::Follower(mut rx) => {
                    tracing::debug!("Joining in-flight location resolution");
                    if let Some(outcome) = wait_for_outcome(&mut rx).await {
                        return outcome;
                    }
                    tracing::debug!("In-flight resolution was abandoned; retrying");
                }
                Role::Queued(mut rx) => {
                    tracing::debug!("Forced refresh waiting for cached resolution to finish");
                    wait_for_outcome(&mut rx).await;
                }
            }
        }
    }

    /// Discard the cached and in-memory record. Safe to call repeatedly.
    ///
    /// # Errors
    /// `Cache` if the backing store could not delete the entry.
    pub fn clear(&self) -> Result<(), LocationError> {
        {
            let mut state = self.state.lock();
            state.current = None;
            state.phase = ResolvePhase::Idle;
        }
        self.cache
            .remove()
            .map_err(|e| LocationError::Cache(e.to_string()))?;
        tracing::info!("Location cache cleared");
        Ok(())
    }

    async fn run(&self, force_refresh: bool) -> ResolveOutcome {
        let now = Utc::now();

        if !force_refresh {
            if let Some(record) = self.fresh_cached(now) {
                let record = self.refresh_place_names(record, now).await;
                self.finish(&record);
                return Ok(record);
            }
        }

        match self.acquire(now).await {
            Ok(record) => {
                self.persist(&record);
                self.finish(&record);
                Ok(record)
            }
            Err(e) => {
                tracing::warn!("Location resolution failed: {}", e);
                self.set_phase(ResolvePhase::Failed);
                Err(e)
            }
        }
    }

    /// The cached record, if one exists and is younger than `max_age`.
    fn fresh_cached(&self, now: DateTime<Utc>) -> Option<LocationRecord> {
        let record = match load_record(&self.cache) {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Location cache unreadable, acquiring fresh: {}", e);
                return None;
            }
        };

        if record.captured_at > now + chrono::Duration::seconds(MAX_FUTURE_SKEW_SECS) {
            tracing::warn!(
                "Discarding cached location stamped in the future ({})",
                record.captured_at
            );
            if let Err(e) = self.cache.remove() {
                tracing::warn!("Failed to remove cached location: {}", e);
            }
            return None;
        }

        let age = record.age(now);
        if age >= self.options.max_age {
            tracing::debug!("Cached location expired ({}s old)", age.num_seconds());
            return None;
        }

        tracing::debug!("Using cached location ({}s old)", age.num_seconds());
        Some(record)
    }

    /// Retry place-name lookup on a cached record that still has an
    /// `Unknown` field, at most once per `enrichment_retry`.
    async fn refresh_place_names(
        &self,
        mut record: LocationRecord,
        now: DateTime<Utc>,
    ) -> LocationRecord {
        if !record.needs_enrichment() {
            return record;
        }
        let due = record
            .enrichment_attempted_at
            .map_or(true, |at| now - at >= self.options.enrichment_retry);
        if !due {
            return record;
        }

        self.enrich(&mut record, now).await;
        self.persist(&record);
        record
    }

    /// Permission check, then a single device fix, then enrichment.
    async fn acquire(&self, now: DateTime<Utc>) -> ResolveOutcome {
        if !self.positioning.is_supported() {
            return Err(unsupported());
        }

        self.set_phase(ResolvePhase::AwaitingPermission);
        if self.positioning.permission().await == PermissionState::Denied {
            return Err(LocationError::PermissionDenied);
        }

        self.set_phase(ResolvePhase::Resolving);
        let options = &self.options.position;
        let reading = tokio::time::timeout(
            options.timeout,
            self.positioning.current_position(options),
        )
        .await
        .map_err(|_| LocationError::Timeout)??;

        let captured_at = self.next_captured_at(now);
        let mut record = LocationRecord::new(reading.coordinate, captured_at);
        record.accuracy_meters = reading.accuracy_meters;
        tracing::info!("Acquired location {}", record.coordinate);

        self.enrich(&mut record, now).await;
        Ok(record)
    }

    async fn enrich(&self, record: &mut LocationRecord, now: DateTime<Utc>) {
        record.enrichment_attempted_at = Some(now);
        match self.geocoder.lookup(&record.coordinate).await {
            Ok(place) => record.apply_place(place),
            Err(e) => {
                tracing::warn!("Reverse geocoding failed, place stays Unknown: {}", e);
            }
        }
    }

    /// Clamp to the newest timestamp this store stamped so successive fixes
    /// never go backwards. Cached records do not feed into this.
    fn next_captured_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut state = self.state.lock();
        let captured_at = match state.last_captured_at {
            Some(last) if last > now => last,
            _ => now,
        };
        state.last_captured_at = Some(captured_at);
        captured_at
    }

    fn persist(&self, record: &LocationRecord) {
        if let Err(e) = store_record(&self.cache, record) {
            tracing::warn!("Failed to cache location: {}", e);
        }
    }

    fn finish(&self, record: &LocationRecord) {
        let mut state = self.state.lock();
        state.current = Some(record.clone());
        state.phase = ResolvePhase::Resolved;
    }

    fn set_phase(&self, phase: ResolvePhase) {
        tracing::debug!("Location resolution phase: {:?}", phase);
        self.state.lock().phase = phase;
    }
}

/// `None` if the leading resolution was dropped before producing an outcome.
async fn wait_for_outcome(
    rx: &mut watch::Receiver<Option<ResolveOutcome>>,
) -> Option<ResolveOutcome> {
    rx.wait_for(Option::is_some)
        .await
        .ok()
        .and_then(|outcome| outcome.clone())
}
