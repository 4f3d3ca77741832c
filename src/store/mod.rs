/// Record Storage System
///
/// A dual-indexed repository of identity records over a pluggable
/// persistence backend. The backend is chosen once at startup and injected;
/// the in-memory indices are authoritative for lookups and are rebuilt from
/// the backend at load time.

pub mod file;
pub mod memory;
pub mod sqlite;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use crate::{
    error::{DirectoryError, DirectoryResult},
    model::{AccountLocators, Person, ProfileRecord, RecordFilter},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc, Mutex, MutexGuard,
};

/// Result of enumerating identity record units at startup
#[derive(Debug, Default)]
pub struct RecordLoad {
    pub records: Vec<Person>,
    /// Units that failed to parse and were moved aside
    pub quarantined: usize,
}

/// Result of enumerating profile document units at startup
#[derive(Debug, Default)]
pub struct ProfileLoad {
    pub profiles: Vec<(String, ProfileRecord)>,
    pub quarantined: usize,
}

/// Durable unit-of-record storage
///
/// A unit is one identity record (keyed by id), one profile document (keyed
/// by account key), or the account-locator mapping. Writes are whole-unit
/// replace. Unparseable units are quarantined during `load_*` so a single
/// corrupt unit never blocks the rest of the directory and is never retried
/// on a future startup.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    async fn load_records(&self) -> DirectoryResult<RecordLoad>;
    async fn write_record(&self, person: &Person) -> DirectoryResult<()>;
    async fn remove_record(&self, id: i64) -> DirectoryResult<bool>;

    async fn load_profiles(&self) -> DirectoryResult<ProfileLoad>;
    async fn read_profile(&self, key: &str) -> DirectoryResult<Option<ProfileRecord>>;
    async fn write_profile(&self, key: &str, record: &ProfileRecord) -> DirectoryResult<()>;
    async fn remove_profile(&self, key: &str) -> DirectoryResult<bool>;

    async fn load_mapping(&self) -> DirectoryResult<Vec<AccountLocators>>;
    async fn write_mapping(&self, mapping: &[AccountLocators]) -> DirectoryResult<()>;
}

#[derive(Default)]
struct Indexes {
    by_id: HashMap<i64, Person>,
    by_locator: HashMap<String, i64>,
}

/// Dual-indexed identity record store
///
/// All index mutations happen behind a single lock which is never held
/// across an await; persistence always completes before indices change.
pub struct RecordStore {
    backend: Arc<dyn PersistenceBackend>,
    indexes: Mutex<Indexes>,
    next_id: AtomicI64,
}

impl RecordStore {
    /// Load every persisted record and build both indices.
    ///
    /// When two records claim the same locator, the first one indexed keeps
    /// it; the collision is logged and load continues.
    pub async fn open(backend: Arc<dyn PersistenceBackend>) -> DirectoryResult<Self> {
        let load = backend.load_records().await?;

        if load.quarantined > 0 {
            tracing::warn!(
                count = load.quarantined,
                "quarantined unreadable record units during load"
            );
        }

        let mut indexes = Indexes::default();
        let mut max_id = 0;

        for person in load.records {
            max_id = max_id.max(person.id);

            for locator in &person.locators {
                if indexes.by_locator.contains_key(locator) {
                    tracing::warn!(
                        locator = %locator,
                        id = person.id,
                        "locator already indexed by another record, skipping"
                    );
                    continue;
                }
                indexes.by_locator.insert(locator.clone(), person.id);
            }

            indexes.by_id.insert(person.id, person);
        }

        tracing::info!(records = indexes.by_id.len(), "record store loaded");

        Ok(Self {
            backend,
            indexes: Mutex::new(indexes),
            next_id: AtomicI64::new(max_id + 1),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Indexes> {
        // A poisoned lock only means a panicked writer; the maps themselves
        // are still structurally sound.
        self.indexes.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Resolve a filter to a record. Id takes precedence over locator; a
    /// missing id or locator is always a clean miss, never a fault.
    pub fn get(&self, filter: &RecordFilter) -> Option<Person> {
        let indexes = self.lock();

        let person = if filter.id > 0 {
            indexes.by_id.get(&filter.id)
        } else {
            filter
                .locator
                .as_deref()
                .filter(|loc| !loc.is_empty())
                .and_then(|loc| indexes.by_locator.get(loc))
                .and_then(|id| indexes.by_id.get(id))
        }?;

        Some(person.with_filtered_links(&filter.relationships))
    }

    /// Unordered snapshot of every indexed record
    pub fn list_all(&self) -> Vec<Person> {
        self.lock().by_id.values().cloned().collect()
    }

    /// Insert a new record, assigning the next id.
    ///
    /// The record is persisted before any index is touched, so a failed
    /// write leaves the store unchanged. If a locator already belongs to
    /// another record the just-written unit is removed again and the insert
    /// fails as a whole; persist and index act as one compensating
    /// transaction.
    pub async fn insert(&self, person: Person) -> DirectoryResult<Person> {
        person.validate()?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let person = person.with_id(id);

        self.backend.write_record(&person).await?;

        let collision = {
            let mut indexes = self.lock();

            let dup = person
                .locators
                .iter()
                .find(|loc| indexes.by_locator.contains_key(*loc))
                .cloned();

            if dup.is_none() {
                for locator in &person.locators {
                    indexes.by_locator.insert(locator.clone(), id);
                }
                indexes.by_id.insert(id, person.clone());
            }

            dup
        };

        if let Some(locator) = collision {
            if let Err(err) = self.backend.remove_record(id).await {
                tracing::error!(id, %err, "failed to remove record unit after index rollback");
            }
            return Err(DirectoryError::DuplicateLocator(locator));
        }

        tracing::info!(id, "record inserted");
        Ok(person)
    }

    /// Replace an existing record wholesale.
    ///
    /// Locators present on the old record but absent on the new one are
    /// dropped from the secondary index; every new locator is (re)pointed
    /// at this record, overwriting any stale mapping for that exact key.
    ///
    /// Existence is re-verified inside the post-persist critical section:
    /// a delete of the same id that lands while the write is in flight
    /// wins, and the just-written unit is removed again rather than
    /// resurrecting the record in the indices.
    pub async fn update(&self, person: Person) -> DirectoryResult<Person> {
        person.validate()?;

        if !self.lock().by_id.contains_key(&person.id) {
            return Err(DirectoryError::NotFound(format!(
                "person with id {} not found",
                person.id
            )));
        }

        self.backend.write_record(&person).await?;

        let still_present = {
            let mut indexes = self.lock();

            match indexes.by_id.get(&person.id).cloned() {
                Some(old) => {
                    for dead in old.locators.difference(&person.locators) {
                        indexes.by_locator.remove(dead);
                    }

                    for locator in &person.locators {
                        indexes.by_locator.insert(locator.clone(), person.id);
                    }

                    indexes.by_id.insert(person.id, person.clone());
                    true
                }
                None => false,
            }
        };

        if !still_present {
            if let Err(err) = self.backend.remove_record(person.id).await {
                tracing::error!(
                    id = person.id,
                    %err,
                    "failed to remove record unit after concurrent delete"
                );
            }
            return Err(DirectoryError::NotFound(format!(
                "person with id {} not found",
                person.id
            )));
        }

        tracing::info!(id = person.id, "record updated");
        Ok(person)
    }

    /// Remove a record and all of its locators from both indices.
    ///
    /// Returns whether the record existed.
    pub async fn delete(&self, person: &Person) -> DirectoryResult<bool> {
        let existed = {
            let mut indexes = self.lock();

            match indexes.by_id.remove(&person.id) {
                Some(existing) => {
                    for locator in &existing.locators {
                        indexes.by_locator.remove(locator);
                    }
                    true
                }
                None => false,
            }
        };

        if existed {
            self.backend.remove_record(person.id).await?;
            tracing::info!(id = person.id, "record deleted");
        }

        Ok(existed)
    }
}
