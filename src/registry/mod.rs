//! SKU uniqueness registry.
//!
//! The registry owns an injected [`SkuStore`] and enforces uniqueness inside
//! a [`ReservationScope`]. Reservation relies on the store's atomic
//! insert-if-absent; the registry adds bounded random disambiguation and
//! the optional clear-on-generate policy.
//!
//! ```text
//! reserve_product(product)
//!   lock ─► clear? ─► candidate ─► try_reserve(candidate)
//!                                    └─ taken ─► try_reserve(candidate-XXXX) … max_attempts
//! ```
//!
//! A [`Generation`] holds the lock across several reservations and any
//! follow-up work. It either commits or rolls back: rollback releases what
//! it reserved and restores what its clear removed.

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Result, SkuError};
use crate::sku::{CategoryMap, Product, SkuCandidate};

pub use memory::InMemorySkuStore;
#[cfg(feature = "database")]
pub use postgres::PgSkuStore;

/// Scope key used for every record when the scope is global.
pub const GLOBAL_SCOPE_KEY: &str = "*";

/// Boundary within which a SKU must be unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationScope {
    /// Uniqueness per canonical product name.
    PerProduct,
    /// Uniqueness across all products.
    Global,
}

impl ReservationScope {
    pub fn key_for(&self, product_name: &str) -> String {
        match self {
            Self::PerProduct => product_name.to_string(),
            Self::Global => GLOBAL_SCOPE_KEY.to_string(),
        }
    }
}

impl FromStr for ReservationScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "product" | "per_product" | "per-product" => Ok(Self::PerProduct),
            "global" => Ok(Self::Global),
            other => Err(format!("unknown reservation scope '{other}'")),
        }
    }
}

/// A reserved SKU as persisted by a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuRecord {
    pub record_id: Uuid,
    pub scope_key: String,
    pub product_name: String,
    pub categories: CategoryMap,
    pub sku: String,
    pub created_at: DateTime<Utc>,
}

impl SkuRecord {
    pub fn new(scope_key: &str, product: &Product, sku: &str) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            scope_key: scope_key.to_string(),
            product_name: product.name.to_string(),
            categories: product.categories.clone(),
            sku: sku.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Backing store for reservations.
#[async_trait]
pub trait SkuStore: Send + Sync {
    /// Insert the record unless its SKU is already taken in its scope.
    /// Returns `true` when the record was written. Must be atomic.
    async fn try_reserve(&self, record: &SkuRecord) -> anyhow::Result<bool>;

    async fn contains(&self, scope_key: &str, sku: &str) -> anyhow::Result<bool>;

    /// Most recent record holding `sku`, in any scope.
    async fn find(&self, sku: &str) -> anyhow::Result<Option<SkuRecord>>;

    /// Delete this exact record (matched by `record_id`). Returns `true`
    /// when it was present.
    async fn release(&self, record: &SkuRecord) -> anyhow::Result<bool>;

    /// Remove every record, returning the removed records.
    async fn clear(&self) -> anyhow::Result<Vec<SkuRecord>>;
}

/// Source of disambiguator suffixes.
pub trait SuffixSource: Send + Sync {
    fn next_suffix(&self) -> String;
}

const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Uppercase alphabetic suffixes drawn from the thread RNG.
#[derive(Debug, Clone)]
pub struct RandomSuffix {
    len: usize,
}

impl RandomSuffix {
    pub fn new(len: usize) -> Self {
        Self { len: len.max(1) }
    }
}

impl Default for RandomSuffix {
    fn default() -> Self {
        Self::new(4)
    }
}

impl SuffixSource for RandomSuffix {
    fn next_suffix(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.len)
            .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
            .collect()
    }
}

/// Reservation behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryPolicy {
    pub scope: ReservationScope,
    /// Empty the whole store before every generation.
    pub clear_on_generate: bool,
    /// Maximum number of suffixed retries after the bare candidate.
    pub max_attempts: u32,
}

impl Default for RegistryPolicy {
    fn default() -> Self {
        Self {
            scope: ReservationScope::PerProduct,
            clear_on_generate: false,
            max_attempts: 64,
        }
    }
}

/// Outcome of a successful reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub sku: String,
    pub candidate: String,
    /// Suffixed retries needed; zero when the candidate was free.
    pub attempts: u32,
    pub record: SkuRecord,
}

impl Reservation {
    pub fn disambiguated(&self) -> bool {
        self.attempts > 0
    }
}

pub struct Registry {
    store: Arc<dyn SkuStore>,
    suffixes: Arc<dyn SuffixSource>,
    policy: RegistryPolicy,
    generation: Mutex<()>,
}

impl Registry {
    pub fn new(store: Arc<dyn SkuStore>, policy: RegistryPolicy) -> Self {
        Self::with_suffixes(store, Arc::new(RandomSuffix::default()), policy)
    }

    pub fn with_suffixes(
        store: Arc<dyn SkuStore>,
        suffixes: Arc<dyn SuffixSource>,
        policy: RegistryPolicy,
    ) -> Self {
        Self {
            store,
            suffixes,
            policy,
            generation: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> &RegistryPolicy {
        &self.policy
    }

    /// Start a generation: take the lock and apply the clear policy.
    pub async fn begin(&self) -> Result<Generation<'_>> {
        let guard = self.generation.lock().await;
        let cleared = if self.policy.clear_on_generate {
            let cleared = self.store.clear().await.map_err(SkuError::store)?;
            info!(removed = cleared.len(), "Cleared SKU registry before generation");
            cleared
        } else {
            Vec::new()
        };
        Ok(Generation {
            registry: self,
            _guard: guard,
            reserved: Vec::new(),
            cleared,
        })
    }

    /// Run one generation: optional clear, candidate, reservation.
    pub async fn reserve_product(&self, product: &Product) -> Result<Reservation> {
        let mut generation = self.begin().await?;
        let result = generation.reserve(product).await;
        generation.finish(result).await
    }

    /// Reserve several products under one lock with at most one clear.
    /// Either every product is reserved or none is.
    pub async fn reserve_batch(&self, products: &[Product]) -> Result<Vec<Reservation>> {
        let mut generation = self.begin().await?;
        let result = generation.reserve_all(products).await;
        generation.finish(result).await
    }

    /// Reserve `candidate` for `product`, disambiguating on collision.
    ///
    /// Does not take the generation lock or apply the clear policy; use
    /// [`Registry::reserve_product`] or [`Registry::begin`] for a full
    /// generation.
    pub async fn reserve(&self, candidate: &SkuCandidate, product: &Product) -> Result<Reservation> {
        let scope_key = self.policy.scope.key_for(product.name.as_str());
        let base = candidate.to_string();

        let mut sku = base.clone();
        let mut attempts = 0;
        loop {
            let record = SkuRecord::new(&scope_key, product, &sku);
            if self.store.try_reserve(&record).await.map_err(SkuError::store)? {
                if attempts > 0 {
                    info!(candidate = %base, sku = %sku, attempts, "Disambiguated SKU");
                } else {
                    debug!(sku = %sku, scope = %scope_key, "Reserved SKU");
                }
                return Ok(Reservation {
                    sku,
                    candidate: base,
                    attempts,
                    record,
                });
            }

            if attempts >= self.policy.max_attempts {
                warn!(candidate = %base, attempts, "Disambiguation space exhausted");
                return Err(SkuError::DisambiguationExhausted {
                    candidate: base,
                    attempts,
                });
            }
            attempts += 1;
            sku = candidate.with_suffix(&self.suffixes.next_suffix());
        }
    }

    pub async fn is_reserved(&self, product_name: &str, sku: &str) -> Result<bool> {
        let scope_key = self.policy.scope.key_for(product_name);
        self.store
            .contains(&scope_key, sku)
            .await
            .map_err(SkuError::store)
    }

    pub async fn lookup(&self, sku: &str) -> Result<Option<SkuRecord>> {
        self.store.find(sku).await.map_err(SkuError::store)
    }
}

/// An open generation holding the registry lock.
///
/// Finish with [`Generation::finish`], [`Generation::commit`] or
/// [`Generation::rollback`]. Dropping it without any of them keeps whatever
/// was reserved.
pub struct Generation<'a> {
    registry: &'a Registry,
    _guard: MutexGuard<'a, ()>,
    reserved: Vec<SkuRecord>,
    cleared: Vec<SkuRecord>,
}

impl Generation<'_> {
    pub async fn reserve(&mut self, product: &Product) -> Result<Reservation> {
        let reservation = self.registry.reserve(&product.candidate(), product).await?;
        self.reserved.push(reservation.record.clone());
        Ok(reservation)
    }

    /// Reserve each product in order; stops at the first failure.
    pub async fn reserve_all(&mut self, products: &[Product]) -> Result<Vec<Reservation>> {
        let mut reservations = Vec::with_capacity(products.len());
        for product in products {
            reservations.push(self.reserve(product).await?);
        }
        Ok(reservations)
    }

    /// Commit on `Ok`, roll back on `Err`, and pass the result through.
    pub async fn finish<T>(self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.commit();
                Ok(value)
            }
            Err(e) => {
                self.rollback().await;
                Err(e)
            }
        }
    }

    /// Keep everything reserved so far and release the lock.
    pub fn commit(self) {
        debug!(reserved = self.reserved.len(), "Committed SKU generation");
    }

    /// Release every record this generation reserved, restore the records
    /// its clear removed, then release the lock.
    pub async fn rollback(self) {
        let store = &self.registry.store;
        let mut released = 0;
        for record in self.reserved.iter().rev() {
            match store.release(record).await {
                Ok(true) => released += 1,
                Ok(false) => warn!(sku = %record.sku, "Reserved SKU already gone during rollback"),
                Err(e) => {
                    error!(sku = %record.sku, error = %e, "Failed to release SKU during rollback")
                }
            }
        }

        let mut restored = 0;
        for record in &self.cleared {
            match store.try_reserve(record).await {
                Ok(true) => restored += 1,
                Ok(false) => warn!(sku = %record.sku, "Cleared SKU was taken again before restore"),
                Err(e) => error!(sku = %record.sku, error = %e, "Failed to restore cleared SKU"),
            }
        }
        info!(released, restored, "Rolled back SKU generation");
    }
}
