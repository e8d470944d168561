//! InMemoryReadModelStore - HashMap-backed secondary store for testing and development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use super::{ReadModel, ReadModelError, ReadModelStore, Versioned};

/// Internal stored representation of a read model.
struct StoredModel {
    bytes: Vec<u8>,
    version: u64,
}

enum PendingWrite {
    Insert { key: String, bytes: Vec<u8> },
    Replace { key: String, bytes: Vec<u8> },
    Delete { key: String },
}

impl PendingWrite {
    fn key(&self) -> &str {
        match self {
            PendingWrite::Insert { key, .. }
            | PendingWrite::Replace { key, .. }
            | PendingWrite::Delete { key } => key,
        }
    }
}

/// In-memory read model store backed by a HashMap.
///
/// Storage key is `"COLLECTION:id"`. Clones share the stored documents but
/// each clone has its own queue of pending writes.
pub struct InMemoryReadModelStore {
    storage: Arc<RwLock<HashMap<String, StoredModel>>>,
    available: Arc<AtomicBool>,
    drop_writes: Arc<AtomicUsize>,
    pending: Mutex<Vec<PendingWrite>>,
}

impl Default for InMemoryReadModelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for InMemoryReadModelStore {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            available: Arc::clone(&self.available),
            drop_writes: Arc::clone(&self.drop_writes),
            pending: Mutex::new(Vec::new()),
        }
    }
}

impl InMemoryReadModelStore {
    /// Create a new empty read model store.
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
            drop_writes: Arc::new(AtomicUsize::new(0)),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Simulate losing (or regaining) connectivity. Affects every clone.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Silently skip the next `count` document writes in `save_pending`;
    /// skipped writes are not included in the reported count.
    pub fn drop_next_writes(&self, count: usize) {
        self.drop_writes.store(count, Ordering::SeqCst);
    }

    /// Number of stored documents in a collection.
    pub fn count<M: ReadModel>(&self) -> Result<usize, ReadModelError> {
        self.ensure_available()?;
        let prefix = format!("{}:", M::COLLECTION);
        let storage = self
            .storage
            .read()
            .map_err(|_| ReadModelError::Storage("lock poisoned".into()))?;
        Ok(storage.keys().filter(|key| key.starts_with(&prefix)).count())
    }

    fn make_key(collection: &str, id: &str) -> String {
        format!("{}:{}", collection, id)
    }

    fn ensure_available(&self) -> Result<(), ReadModelError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ReadModelError::Unavailable("connection refused".into()))
        }
    }

    fn stage(&self, write: PendingWrite) -> Result<(), ReadModelError> {
        self.ensure_available()?;
        self.pending
            .lock()
            .map_err(|_| ReadModelError::Storage("pending queue poisoned".into()))?
            .push(write);
        Ok(())
    }

    fn take_dropped_write(&self) -> bool {
        self.drop_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn split_key(key: &str) -> (String, String) {
        match key.split_once(':') {
            Some((collection, id)) => (collection.to_string(), id.to_string()),
            None => (String::new(), key.to_string()),
        }
    }

    fn write_one(
        storage: &mut HashMap<String, StoredModel>,
        write: PendingWrite,
    ) -> Result<(), ReadModelError> {
        match write {
            PendingWrite::Insert { key, bytes } => {
                if storage.contains_key(&key) {
                    let (collection, id) = Self::split_key(&key);
                    return Err(ReadModelError::Conflict { collection, id });
                }
                storage.insert(key, StoredModel { bytes, version: 1 });
            }
            PendingWrite::Replace { key, bytes } => {
                let Some(stored) = storage.get_mut(&key) else {
                    let (collection, id) = Self::split_key(&key);
                    return Err(ReadModelError::NotFound { collection, id });
                };
                stored.bytes = bytes;
                stored.version += 1;
            }
            PendingWrite::Delete { key } => {
                if storage.remove(&key).is_none() {
                    let (collection, id) = Self::split_key(&key);
                    return Err(ReadModelError::NotFound { collection, id });
                }
            }
        }
        Ok(())
    }
}

impl ReadModelStore for InMemoryReadModelStore {
    fn get_model<M: ReadModel>(&self, id: &str) -> Result<Option<Versioned<M>>, ReadModelError> {
        self.ensure_available()?;
        let key = Self::make_key(M::COLLECTION, id);
        let storage = self
            .storage
            .read()
            .map_err(|_| ReadModelError::Storage("lock poisoned".into()))?;

        match storage.get(&key) {
            Some(stored) => {
                let data: M = serde_json::from_slice(&stored.bytes)
                    .map_err(|e| ReadModelError::Serde(e.to_string()))?;
                Ok(Some(Versioned {
                    data,
                    version: stored.version,
                }))
            }
            None => Ok(None),
        }
    }

    fn find_models<M: ReadModel>(
        &self,
        predicate: &dyn Fn(&M) -> bool,
    ) -> Result<Vec<Versioned<M>>, ReadModelError> {
        self.ensure_available()?;
        let storage = self
            .storage
            .read()
            .map_err(|_| ReadModelError::Storage("lock poisoned".into()))?;

        let prefix = format!("{}:", M::COLLECTION);
        let mut results = Vec::new();

        for (key, stored) in storage.iter() {
            if key.starts_with(&prefix) {
                let data = serde_json::from_slice::<M>(&stored.bytes)
                    .map_err(|e| ReadModelError::Serde(e.to_string()))?;
                if predicate(&data) {
                    results.push(Versioned {
                        data,
                        version: stored.version,
                    });
                }
            }
        }

        Ok(results)
    }

    fn stage_insert<M: ReadModel>(&self, model: &M) -> Result<(), ReadModelError> {
        let key = Self::make_key(M::COLLECTION, &model.id());
        let bytes = serde_json::to_vec(model).map_err(|e| ReadModelError::Serde(e.to_string()))?;
        self.stage(PendingWrite::Insert { key, bytes })
    }

    fn stage_replace<M: ReadModel>(&self, model: &M) -> Result<(), ReadModelError> {
        let key = Self::make_key(M::COLLECTION, &model.id());
        let bytes = serde_json::to_vec(model).map_err(|e| ReadModelError::Serde(e.to_string()))?;
        self.stage(PendingWrite::Replace { key, bytes })
    }

    fn stage_delete<M: ReadModel>(&self, id: &str) -> Result<(), ReadModelError> {
        let key = Self::make_key(M::COLLECTION, id);
        self.stage(PendingWrite::Delete { key })
    }

    fn pending_count(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }

    fn save_pending(&self) -> Result<usize, ReadModelError> {
        let writes = std::mem::take(
            &mut *self
                .pending
                .lock()
                .map_err(|_| ReadModelError::Storage("pending queue poisoned".into()))?,
        );
        self.ensure_available()?;

        let mut storage = self
            .storage
            .write()
            .map_err(|_| ReadModelError::Storage("lock poisoned".into()))?;

        let mut written = 0;
        for write in writes {
            if self.take_dropped_write() {
                debug!(target: "synced::projection", key = write.key(), "write dropped");
                continue;
            }
            Self::write_one(&mut storage, write)?;
            written += 1;
        }
        Ok(written)
    }

    fn discard_pending(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
    }
}
