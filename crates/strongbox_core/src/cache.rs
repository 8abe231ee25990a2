//! In-memory mirror of each model's collection.
//!
//! The cache is the single path through which records are read and
//! written. Each model has its own slot guarded by an async mutex:
//!
//! - reads take the lock only long enough to load the collection (once)
//!   and then work on a shared immutable snapshot
//! - mutations hold the lock across validate, apply and persist, so two
//!   writers never validate against the same stale snapshot
//!
//! A mutation runs on a blocking task that owns the lock guard. Once it
//! has started it finishes even if the caller's future is dropped, so a
//! save is never cut off halfway. The closure works on a copy of the
//! collection, which replaces the cached one only after the save
//! succeeded.

use crate::error::{CoreError, CoreResult};
use crate::store::EncryptedStore;
use crate::types::{Mutation, Record};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// Shared, immutable view of one model's collection.
pub type Snapshot = Arc<Vec<Record>>;

#[derive(Debug, Default)]
struct Slot {
    records: Option<Snapshot>,
}

impl Slot {
    fn ensure_loaded(&mut self, store: &EncryptedStore, model: &str) -> CoreResult<Snapshot> {
        if let Some(records) = &self.records {
            return Ok(Arc::clone(records));
        }
        // A failed load leaves the slot empty so the next access retries.
        let records = Arc::new(store.load(model)?);
        self.records = Some(Arc::clone(&records));
        Ok(records)
    }
}

/// Per-client cache of model collections.
#[derive(Debug)]
pub struct CollectionCache {
    store: Arc<EncryptedStore>,
    slots: Mutex<HashMap<String, Arc<AsyncMutex<Slot>>>>,
}

impl CollectionCache {
    /// Creates an empty cache over a store. Nothing is loaded until first use.
    #[must_use]
    pub fn new(store: Arc<EncryptedStore>) -> Self {
        Self {
            store,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<EncryptedStore> {
        &self.store
    }

    fn slot(&self, model: &str) -> Arc<AsyncMutex<Slot>> {
        let mut slots = self.slots.lock();
        Arc::clone(slots.entry(model.to_string()).or_default())
    }

    /// Returns the current collection, loading it on first access.
    ///
    /// # Errors
    ///
    /// Returns the load error (corruption or storage); it is not cached.
    pub async fn snapshot(&self, model: &str) -> CoreResult<Snapshot> {
        let mut guard = self.slot(model).lock_owned().await;
        if let Some(records) = &guard.records {
            return Ok(Arc::clone(records));
        }

        let store = Arc::clone(&self.store);
        let model = model.to_string();
        tokio::task::spawn_blocking(move || guard.ensure_loaded(&store, &model))
            .await
            .map_err(|e| CoreError::internal(format!("load task failed: {e}")))?
    }

    /// Runs a read-only closure over the current collection.
    ///
    /// # Errors
    ///
    /// Returns the load error if the collection cannot be loaded.
    pub async fn read<T, F>(&self, model: &str, f: F) -> CoreResult<T>
    where
        F: FnOnce(&[Record]) -> T,
    {
        let records = self.snapshot(model).await?;
        Ok(f(records.as_slice()))
    }

    /// Runs a mutation under the model's lock and persists the result.
    ///
    /// The closure receives a working copy of the collection. If it returns
    /// an error, or a [`Mutation`] with `changed == false`, nothing is
    /// written and the cache is untouched. Otherwise the working copy is
    /// saved and, only once the save succeeded, becomes the cached
    /// collection.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, a load error, or the save error.
    pub async fn mutate<T, F>(&self, model: &str, f: F) -> CoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Vec<Record>) -> CoreResult<Mutation<T>> + Send + 'static,
    {
        let mut guard = self.slot(model).lock_owned().await;
        let store = Arc::clone(&self.store);
        let model = model.to_string();

        tokio::task::spawn_blocking(move || {
            let current = guard.ensure_loaded(&store, &model)?;
            let mut working = current.as_ref().clone();
            let outcome = f(&mut working)?;
            if outcome.changed {
                store.save(&model, &working)?;
                guard.records = Some(Arc::new(working));
            } else {
                tracing::debug!(model = %model, "collection unchanged, skipping save");
            }
            Ok(outcome.value)
        })
        .await
        .map_err(|e| CoreError::internal(format!("mutation task failed: {e}")))?
    }

    /// Drops a model's cached collection so the next access reloads it.
    pub async fn invalidate(&self, model: &str) {
        let mut guard = self.slot(model).lock_owned().await;
        guard.records = None;
        tracing::debug!(model, "invalidated cached collection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncryptionMode;
    use crate::error::ErrorKind;
    use crate::types::record;
    use serde_json::json;
    use strongbox_storage::{InMemoryBackend, StorageBackend};

    fn cache() -> (Arc<InMemoryBackend>, CollectionCache) {
        let backend = Arc::new(InMemoryBackend::new());
        let store = EncryptedStore::open(backend.clone(), &EncryptionMode::Disabled).unwrap();
        (backend, CollectionCache::new(Arc::new(store)))
    }

    fn push(id: &'static str) -> impl FnOnce(&mut Vec<Record>) -> CoreResult<Mutation<usize>> {
        let id = id.to_string();
        move |records| {
            records.push(record(json!({"id": id})));
            Ok(Mutation::changed(records.len()))
        }
    }

    #[tokio::test]
    async fn empty_model_reads_empty() {
        let (_, cache) = cache();
        let count = cache.read("User", <[Record]>::len).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn mutation_persists_and_updates_cache() {
        let (backend, cache) = cache();
        assert_eq!(cache.mutate("User", push("u1")).await.unwrap(), 1);

        assert_eq!(backend.write_count(), 1);
        assert!(backend.blob("User.json").is_some());
        assert_eq!(cache.read("User", <[Record]>::len).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unchanged_mutation_does_not_write() {
        let (backend, cache) = cache();
        let value = cache
            .mutate("User", |records| Ok(Mutation::unchanged(records.len())))
            .await
            .unwrap();
        assert_eq!(value, 0);
        assert_eq!(backend.write_count(), 0);
    }

    #[tokio::test]
    async fn failed_mutation_discards_working_copy() {
        let (backend, cache) = cache();
        cache.mutate("User", push("u1")).await.unwrap();

        let err = cache
            .mutate("User", |records: &mut Vec<Record>| -> CoreResult<Mutation<()>> {
                records.clear();
                Err(CoreError::record_validation("User", "rejected"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(backend.write_count(), 1);
        assert_eq!(cache.read("User", <[Record]>::len).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_save_keeps_cached_state() {
        let (backend, cache) = cache();
        cache.mutate("User", push("u1")).await.unwrap();

        backend.fail_writes(true);
        let err = cache.mutate("User", push("u2")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(cache.read("User", <[Record]>::len).await.unwrap(), 1);

        backend.fail_writes(false);
        assert_eq!(cache.mutate("User", push("u2")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn sync_failure_after_replace_keeps_cache_and_store_in_step() {
        let (backend, cache) = cache();
        cache.mutate("User", push("u1")).await.unwrap();

        backend.fail_syncs(true);
        assert_eq!(cache.mutate("User", push("u2")).await.unwrap(), 2);
        assert_eq!(cache.read("User", <[Record]>::len).await.unwrap(), 2);
        assert_eq!(cache.store().load("User").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn load_errors_are_not_cached() {
        let (backend, cache) = cache();
        backend.set_blob("User.json", b"not json".to_vec());

        let err = cache.read("User", <[Record]>::len).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corruption);
        // Mutations refuse to run over an unreadable collection
        assert!(cache.mutate("User", push("u1")).await.is_err());
        assert_eq!(backend.write_count(), 0);

        backend.set_blob("User.json", b"[{\"id\": \"u9\"}]".to_vec());
        assert_eq!(cache.read("User", <[Record]>::len).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn invalidate_reloads_from_store() {
        let (backend, cache) = cache();
        cache.mutate("User", push("u1")).await.unwrap();

        backend.write_atomic("User.json", b"[]").unwrap();
        assert_eq!(cache.read("User", <[Record]>::len).await.unwrap(), 1);

        cache.invalidate("User").await;
        assert_eq!(cache.read("User", <[Record]>::len).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn snapshots_are_isolated_from_later_mutations() {
        let (_, cache) = cache();
        cache.mutate("User", push("u1")).await.unwrap();

        let before = cache.snapshot("User").await.unwrap();
        cache.mutate("User", push("u2")).await.unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(cache.snapshot("User").await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_mutations_serialize() {
        let (backend, cache) = cache();
        let cache = Arc::new(cache);

        let mut handles = Vec::new();
        for i in 0..20 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                // Insert only if absent: racing writers must not both pass
                cache
                    .mutate("User", move |records| {
                        let id = json!(format!("u{}", i % 10));
                        if records.iter().any(|r| r["id"] == id) {
                            return Ok(Mutation::unchanged(false));
                        }
                        records.push(record(json!({"id": id})));
                        Ok(Mutation::changed(true))
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                inserted += 1;
            }
        }

        assert_eq!(inserted, 10);
        assert_eq!(cache.read("User", <[Record]>::len).await.unwrap(), 10);
        assert_eq!(backend.write_count(), 10);
    }
}
