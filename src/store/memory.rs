/// In-memory persistence backend
///
/// Backs the store with plain maps, primarily for tests and ephemeral
/// deployments. Supports simulating write failures so callers can verify
/// that a failed persist leaves no index state behind.
use crate::{
    error::{DirectoryError, DirectoryResult},
    model::{AccountLocators, Person, ProfileRecord},
    store::{PersistenceBackend, ProfileLoad, RecordLoad},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    records: HashMap<i64, Person>,
    profiles: HashMap<String, ProfileRecord>,
    mapping: Vec<AccountLocators>,
}

#[derive(Default)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail until switched off again
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> DirectoryResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DirectoryError::Persistence(
                "simulated write failure".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of persisted record units, for test assertions
    pub async fn record_count(&self) -> usize {
        self.inner.read().await.records.len()
    }
}

#[async_trait]
impl PersistenceBackend for MemoryBackend {
    async fn load_records(&self) -> DirectoryResult<RecordLoad> {
        let inner = self.inner.read().await;
        Ok(RecordLoad {
            records: inner.records.values().cloned().collect(),
            quarantined: 0,
        })
    }

    async fn write_record(&self, person: &Person) -> DirectoryResult<()> {
        self.check_writable()?;
        self.inner
            .write()
            .await
            .records
            .insert(person.id, person.clone());
        Ok(())
    }

    async fn remove_record(&self, id: i64) -> DirectoryResult<bool> {
        Ok(self.inner.write().await.records.remove(&id).is_some())
    }

    async fn load_profiles(&self) -> DirectoryResult<ProfileLoad> {
        let inner = self.inner.read().await;
        Ok(ProfileLoad {
            profiles: inner
                .profiles
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            quarantined: 0,
        })
    }

    async fn read_profile(&self, key: &str) -> DirectoryResult<Option<ProfileRecord>> {
        Ok(self.inner.read().await.profiles.get(key).cloned())
    }

    async fn write_profile(&self, key: &str, record: &ProfileRecord) -> DirectoryResult<()> {
        self.check_writable()?;
        self.inner
            .write()
            .await
            .profiles
            .insert(key.to_string(), record.clone());
        Ok(())
    }

    async fn remove_profile(&self, key: &str) -> DirectoryResult<bool> {
        Ok(self.inner.write().await.profiles.remove(key).is_some())
    }

    async fn load_mapping(&self) -> DirectoryResult<Vec<AccountLocators>> {
        Ok(self.inner.read().await.mapping.clone())
    }

    async fn write_mapping(&self, mapping: &[AccountLocators]) -> DirectoryResult<()> {
        self.check_writable()?;
        self.inner.write().await.mapping = mapping.to_vec();
        Ok(())
    }
}
