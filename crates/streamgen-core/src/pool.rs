//! Shared store of live identifiers per entity type.
//!
//! Every type owns an append-only sequence guarded by a single `RwLock`.
//! Appends take the write lock; lookups take the read lock for both the
//! length snapshot and the index, so a lookup can never observe a length
//! that does not match the sequence it indexes into.

use crate::error::PoolError;
use crate::values::Value;
use parking_lot::RwLock;
use rand::seq::index;
use rand::Rng;
use std::collections::HashMap;

/// Thread-safe mapping of entity type name to identifier values.
///
/// Identifiers within a type are not deduplicated: a repeated identifier
/// models e.g. repeat orders by the same customer and raises its sampling
/// weight accordingly.
#[derive(Debug, Default)]
pub struct ReferencePool {
    references: RwLock<HashMap<String, Vec<Value>>>,
}

impl ReferencePool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append identifiers to a type, creating the type if absent.
    pub fn add_references<I>(&self, entity_type: &str, ids: I)
    where
        I: IntoIterator<Item = Value>,
    {
        let mut references = self.references.write();
        references
            .entry(entity_type.to_string())
            .or_default()
            .extend(ids);
    }

    /// Sample one identifier uniformly at random.
    pub fn get_random(&self, entity_type: &str) -> Result<Value, PoolError> {
        self.get_random_with(entity_type, &mut rand::rng())
    }

    /// Sample one identifier uniformly at random using the given RNG.
    pub fn get_random_with<R: Rng + ?Sized>(
        &self,
        entity_type: &str,
        rng: &mut R,
    ) -> Result<Value, PoolError> {
        let references = self.references.read();
        let ids = references
            .get(entity_type)
            .ok_or_else(|| PoolError::UnknownType(entity_type.to_string()))?;

        if ids.is_empty() {
            return Err(PoolError::EmptyPool(entity_type.to_string()));
        }

        let idx = rng.random_range(0..ids.len());
        Ok(ids[idx].clone())
    }

    /// Sample up to `count` identifiers without replacement.
    ///
    /// Positions are distinct; when `count` exceeds the number of stored
    /// identifiers the full sequence is returned (in random order) rather
    /// than an error. Callers that need an exact count must compare the
    /// returned length themselves.
    pub fn get_random_multiple(
        &self,
        entity_type: &str,
        count: usize,
    ) -> Result<Vec<Value>, PoolError> {
        self.get_random_multiple_with(entity_type, count, &mut rand::rng())
    }

    /// Like [`get_random_multiple`](Self::get_random_multiple) with an explicit RNG.
    pub fn get_random_multiple_with<R: Rng + ?Sized>(
        &self,
        entity_type: &str,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<Value>, PoolError> {
        let references = self.references.read();
        let ids = references
            .get(entity_type)
            .ok_or_else(|| PoolError::UnknownType(entity_type.to_string()))?;

        let amount = count.min(ids.len());
        Ok(index::sample(rng, ids.len(), amount)
            .into_iter()
            .map(|i| ids[i].clone())
            .collect())
    }

    /// Total number of identifiers across all types.
    pub fn size(&self) -> usize {
        self.references.read().values().map(Vec::len).sum()
    }

    /// Whether the type has ever been added.
    pub fn has_type(&self, entity_type: &str) -> bool {
        self.references.read().contains_key(entity_type)
    }

    /// Number of identifiers stored for a type (0 if never added).
    pub fn get_type_count(&self, entity_type: &str) -> usize {
        self.references
            .read()
            .get(entity_type)
            .map_or(0, Vec::len)
    }

    /// Whether no identifiers are stored at all.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Names of all registered types.
    pub fn types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.references.read().keys().cloned().collect();
        names.sort();
        names
    }
}
