use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use theta_core::{RecordKey, StateStore, StoreError, StoredRecord};

#[derive(Default)]
struct Inner {
    next_id: u64,
    namespaces: HashMap<String, Vec<(u64, serde_json::Value)>>,
}

/// Process-local [`StateStore`]. Contents are lost on exit.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held in `namespace`.
    #[must_use]
    pub fn len(&self, namespace: &str) -> usize {
        self.inner
            .lock()
            .namespaces
            .get(namespace)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn create_namespace(&self, name: &str) -> Result<(), StoreError> {
        self.inner
            .lock()
            .namespaces
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn get(&self, namespace: &str) -> Result<Option<StoredRecord>, StoreError> {
        let inner = self.inner.lock();
        let record = inner
            .namespaces
            .get(namespace)
            .and_then(|records| records.first())
            .map(|(id, document)| StoredRecord {
                key: RecordKey {
                    namespace: namespace.to_string(),
                    id: id.to_string(),
                },
                document: document.clone(),
            });
        Ok(record)
    }

    async fn insert(
        &self,
        namespace: &str,
        document: serde_json::Value,
    ) -> Result<RecordKey, StoreError> {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .namespaces
            .entry(namespace.to_string())
            .or_default()
            .push((id, document));

        Ok(RecordKey {
            namespace: namespace.to_string(),
            id: id.to_string(),
        })
    }

    async fn update(&self, key: &RecordKey, document: serde_json::Value) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let slot = inner
            .namespaces
            .get_mut(&key.namespace)
            .and_then(|records| {
                records
                    .iter_mut()
                    .find(|(id, _)| id.to_string() == key.id)
            })
            .ok_or_else(|| StoreError::not_found(&key.namespace, &key.id))?;
        slot.1 = document;
        Ok(())
    }
}
