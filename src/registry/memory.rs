//! Process-lifetime registry store.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;

use super::{SkuRecord, SkuStore};

/// Reservations held in memory, grouped by scope key.
#[derive(Debug, Default)]
pub struct InMemorySkuStore {
    scopes: Mutex<HashMap<String, HashMap<String, SkuRecord>>>,
}

impl InMemorySkuStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scopes
            .lock()
            .map(|scopes| scopes.values().map(HashMap::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn scopes(
        &self,
    ) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, HashMap<String, SkuRecord>>>>
    {
        self.scopes
            .lock()
            .map_err(|_| anyhow!("in-memory SKU store lock poisoned"))
    }
}

#[async_trait]
impl SkuStore for InMemorySkuStore {
    async fn try_reserve(&self, record: &SkuRecord) -> anyhow::Result<bool> {
        let mut scopes = self.scopes()?;
        let scope = scopes.entry(record.scope_key.clone()).or_default();
        if scope.contains_key(&record.sku) {
            return Ok(false);
        }
        scope.insert(record.sku.clone(), record.clone());
        Ok(true)
    }

    async fn contains(&self, scope_key: &str, sku: &str) -> anyhow::Result<bool> {
        Ok(self
            .scopes()?
            .get(scope_key)
            .is_some_and(|scope| scope.contains_key(sku)))
    }

    async fn find(&self, sku: &str) -> anyhow::Result<Option<SkuRecord>> {
        Ok(self
            .scopes()?
            .values()
            .filter_map(|scope| scope.get(sku))
            .max_by_key(|record| record.created_at)
            .cloned())
    }

    async fn release(&self, record: &SkuRecord) -> anyhow::Result<bool> {
        let mut scopes = self.scopes()?;
        let Some(scope) = scopes.get_mut(&record.scope_key) else {
            return Ok(false);
        };
        if scope
            .get(&record.sku)
            .is_some_and(|held| held.record_id == record.record_id)
        {
            scope.remove(&record.sku);
            if scope.is_empty() {
                scopes.remove(&record.scope_key);
            }
            return Ok(true);
        }
        Ok(false)
    }

    async fn clear(&self) -> anyhow::Result<Vec<SkuRecord>> {
        let mut scopes = self.scopes()?;
        Ok(scopes
            .drain()
            .flat_map(|(_, scope)| scope.into_values())
            .collect())
    }
}
