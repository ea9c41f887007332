use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::{join_all, BoxFuture, Shared};
use futures_util::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::address::{CanonicalKey, ItemResult, RawAddressRecord, ValidatedAddress};
use crate::cache::GeocodeCache;
use crate::errors::ValidationError;
use crate::geocode::GeocodeClient;
use crate::keyer::canonical_key;
use crate::store::Persister;

type Resolution = Result<ItemResult, ValidationError>;
type PendingResolution = Shared<BoxFuture<'static, Resolution>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub records: usize,
    pub unique_keys: usize,
    pub cache_hits: usize,
    pub resolved: usize,
    pub unresolved: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolutionSource {
    Cache,
    Provider,
}

/// Keyed batch of records.
///
/// When several records share a key, the last one in input order is the
/// representative whose fields build the resolved address. Every record
/// with that key reports the representative's outcome.
struct KeyedBatch {
    keys: Vec<CanonicalKey>,
    unique: Vec<CanonicalKey>,
    representatives: HashMap<CanonicalKey, RawAddressRecord>,
}

impl KeyedBatch {
    fn build(batch: &[RawAddressRecord]) -> Result<Self, ValidationError> {
        let keys = batch
            .iter()
            .map(canonical_key)
            .collect::<Result<Vec<_>, _>>()?;

        let mut unique = Vec::new();
        let mut representatives = HashMap::with_capacity(keys.len());
        for (key, record) in keys.iter().zip(batch) {
            if representatives.insert(key.clone(), record.clone()).is_none() {
                unique.push(key.clone());
            }
        }

        Ok(Self {
            keys,
            unique,
            representatives,
        })
    }
}

/// Drives cache lookup, geocoding, persistence and cache population for a
/// batch of addresses.
///
/// Concurrent requests for the same uncached key share one in-flight
/// resolution, across batches as well as within one.
pub struct ValidationOrchestrator {
    cache: Arc<dyn GeocodeCache>,
    geocoder: Arc<dyn GeocodeClient>,
    persister: Arc<dyn Persister>,
    in_flight: Mutex<HashMap<CanonicalKey, PendingResolution>>,
}

impl ValidationOrchestrator {
    pub fn new(
        cache: Arc<dyn GeocodeCache>,
        geocoder: Arc<dyn GeocodeClient>,
        persister: Arc<dyn Persister>,
    ) -> Self {
        Self {
            cache,
            geocoder,
            persister,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Validates a batch, returning one result per record in input order.
    ///
    /// An empty batch or a record missing required fields fails the call
    /// before any lookup. Errors that are not batch-level (provider failures)
    /// become per-item error messages; a persistence failure fails the call
    /// once every key has finished.
    pub async fn validate(
        &self,
        batch: &[RawAddressRecord],
    ) -> Result<Vec<ItemResult>, ValidationError> {
        self.validate_with_stats(batch).await.map(|(results, _)| results)
    }

    pub async fn validate_with_stats(
        &self,
        batch: &[RawAddressRecord],
    ) -> Result<(Vec<ItemResult>, BatchStats), ValidationError> {
        if batch.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }

        let KeyedBatch {
            keys,
            unique,
            mut representatives,
        } = KeyedBatch::build(batch)?;

        let tasks = unique.iter().map(|key| {
            let record = representatives.remove(key).unwrap_or_default();
            self.resolve_key(key.clone(), record)
        });
        let outcomes = join_all(tasks).await;

        let mut stats = BatchStats {
            records: batch.len(),
            unique_keys: unique.len(),
            ..BatchStats::default()
        };
        let mut by_key = HashMap::with_capacity(unique.len());
        for (key, outcome) in unique.into_iter().zip(outcomes) {
            let (item, source) = match outcome {
                Ok(resolved) => resolved,
                Err(err) if err.is_batch_level() => return Err(err),
                Err(err) => {
                    debug!(target: "pipeline", %key, error = ?err, "address could not be resolved");
                    (ItemResult::unresolved(&key), ResolutionSource::Provider)
                }
            };
            match (&item, source) {
                (ItemResult::Failed { .. }, _) => stats.unresolved += 1,
                (ItemResult::Validated(_), ResolutionSource::Cache) => stats.cache_hits += 1,
                (ItemResult::Validated(_), ResolutionSource::Provider) => stats.resolved += 1,
            }
            by_key.insert(key, item);
        }

        info!(
            target: "pipeline",
            records = stats.records,
            unique_keys = stats.unique_keys,
            cache_hits = stats.cache_hits,
            resolved = stats.resolved,
            unresolved = stats.unresolved,
            "address batch validated"
        );

        let results = keys
            .iter()
            .map(|key| {
                by_key
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| ItemResult::unresolved(key))
            })
            .collect();
        Ok((results, stats))
    }

    async fn resolve_key(
        &self,
        key: CanonicalKey,
        record: RawAddressRecord,
    ) -> Result<(ItemResult, ResolutionSource), ValidationError> {
        if let Some(hit) = self.cache.get(&key) {
            debug!(target: "pipeline", %key, "cache hit");
            return Ok((ItemResult::Validated(hit), ResolutionSource::Cache));
        }

        let pending = {
            let mut in_flight = self.in_flight.lock();
            if let Some(pending) = in_flight.get(&key) {
                debug!(target: "pipeline", %key, "joining in-flight resolution");
                pending.clone()
            } else {
                // A resolution may have completed between the first check and the lock.
                if let Some(hit) = self.cache.get(&key) {
                    return Ok((ItemResult::Validated(hit), ResolutionSource::Cache));
                }
                let pending = resolve_uncached(
                    Arc::clone(&self.cache),
                    Arc::clone(&self.geocoder),
                    Arc::clone(&self.persister),
                    key.clone(),
                    record,
                )
                .boxed()
                .shared();
                in_flight.insert(key.clone(), pending.clone());
                pending
            }
        };

        let outcome = pending.clone().await;

        {
            let mut in_flight = self.in_flight.lock();
            if in_flight
                .get(&key)
                .is_some_and(|current| current.ptr_eq(&pending))
            {
                in_flight.remove(&key);
            }
        }

        outcome.map(|item| (item, ResolutionSource::Provider))
    }
}

async fn resolve_uncached(
    cache: Arc<dyn GeocodeCache>,
    geocoder: Arc<dyn GeocodeClient>,
    persister: Arc<dyn Persister>,
    key: CanonicalKey,
    record: RawAddressRecord,
) -> Resolution {
    let coordinates = geocoder.resolve(&key).await?;
    let address = ValidatedAddress::new(record, coordinates);
    if let Err(err) = persister.save(&address).await {
        warn!(target: "pipeline", %key, error = %err, "failed to persist validated address");
        return Err(ValidationError::Persistence);
    }

    cache.put(key, address.clone());
    Ok(ItemResult::Validated(address))
}
