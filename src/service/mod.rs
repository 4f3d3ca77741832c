/// WebFinger Directory Service
///
/// Resolves locators to published profile documents through a two-level
/// cache (account key -> profile, locator -> profile) backed by the
/// persistence backend, and owns generation of canonical links and aliases
/// for federated accounts. The account-to-locator mapping is persisted
/// separately from the profile units and rewritten wholesale on every
/// locator-set change.
use crate::{
    error::{DirectoryError, DirectoryResult},
    model::{normalize_locator, Account, AccountLocators, ProfileRecord},
    store::PersistenceBackend,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Add/update request: the account plus the locators that should resolve
/// to its profile
#[derive(Debug, Clone)]
pub struct UpsertProfileRequest {
    pub account: Account,
    pub locators: Vec<String>,
}

#[derive(Default)]
struct DirectoryState {
    by_account: HashMap<String, ProfileRecord>,
    by_locator: HashMap<String, ProfileRecord>,
    accounts: HashMap<String, AccountLocators>,
}

impl DirectoryState {
    fn mapping_snapshot(&self) -> Vec<AccountLocators> {
        self.accounts.values().cloned().collect()
    }

    fn account_owning(&self, locator: &str) -> Option<&AccountLocators> {
        self.accounts
            .values()
            .find(|entry| entry.locators.iter().any(|l| l == locator))
    }
}

pub struct DirectoryService {
    backend: Arc<dyn PersistenceBackend>,
    // one boundary for both cache levels and the mapping; held across the
    // persistence writes so the on-disk mapping can never drift from what
    // readers observe
    state: Mutex<DirectoryState>,
}

impl DirectoryService {
    /// Load the mapping and every persisted profile, then prime both cache
    /// levels.
    pub async fn open(backend: Arc<dyn PersistenceBackend>) -> DirectoryResult<Self> {
        let mapping = backend.load_mapping().await?;
        let load = backend.load_profiles().await?;

        if load.quarantined > 0 {
            tracing::warn!(
                count = load.quarantined,
                "quarantined unreadable profile units during load"
            );
        }

        let mut state = DirectoryState::default();

        for (key, record) in load.profiles {
            state.by_account.insert(key, record);
        }

        for entry in mapping {
            let key = entry.account.key();

            if let Some(record) = state.by_account.get(&key) {
                for locator in &entry.locators {
                    state.by_locator.insert(locator.clone(), record.clone());
                }
            }

            state.accounts.insert(key, entry);
        }

        tracing::info!(
            profiles = state.by_account.len(),
            accounts = state.accounts.len(),
            "directory service loaded"
        );

        Ok(Self {
            backend,
            state: Mutex::new(state),
        })
    }

    /// Publish a profile for a new account.
    ///
    /// Fails if a profile already exists for the account, or if any
    /// requested locator already resolves to a different account.
    pub async fn add(&self, request: UpsertProfileRequest) -> DirectoryResult<ProfileRecord> {
        let key = request.account.key();
        let mut state = self.state.lock().await;

        if state.by_account.contains_key(&key) {
            return Err(DirectoryError::Conflict(format!(
                "profile already exists for account [{}]",
                key
            )));
        }

        let locators: Vec<String> = request
            .locators
            .iter()
            .map(|loc| normalize_locator(loc))
            .collect();

        for locator in &locators {
            let taken = state.by_locator.contains_key(locator)
                || state
                    .account_owning(locator)
                    .map(|entry| entry.account.key() != key)
                    .unwrap_or(false);

            if taken {
                return Err(DirectoryError::DuplicateLocator(locator.clone()));
            }
        }

        let record = ProfileRecord::for_account(&request.account);
        self.save_profile(&mut state, request.account, locators, record.clone())
            .await?;

        tracing::info!(account = %key, "profile added");
        Ok(record)
    }

    /// Regenerate and republish the profile for an existing account,
    /// rewriting its locator set wholesale.
    pub async fn update(&self, request: UpsertProfileRequest) -> DirectoryResult<ProfileRecord> {
        let key = request.account.key();
        let mut state = self.state.lock().await;

        if self
            .record_for_account(&mut state, &request.account)
            .await?
            .is_none()
        {
            return Err(DirectoryError::NotFound(format!(
                "no profile for account [{}]",
                key
            )));
        }

        let locators: Vec<String> = request
            .locators
            .iter()
            .map(|loc| normalize_locator(loc))
            .collect();

        let record = ProfileRecord::for_account(&request.account);
        self.save_profile(&mut state, request.account, locators, record.clone())
            .await?;

        tracing::info!(account = %key, "profile updated");
        Ok(record)
    }

    /// Remove an account's profile, its locators, and its mapping entry.
    ///
    /// The mapping is saved even when only part of the state was present,
    /// so the persisted mapping always matches the caches.
    pub async fn delete(&self, account: &Account) -> DirectoryResult<bool> {
        let key = account.key();
        let mut state = self.state.lock().await;

        let unit_existed = self.backend.remove_profile(&key).await?;

        let entry = state.accounts.remove(&key);
        if let Some(entry) = &entry {
            for locator in &entry.locators {
                state.by_locator.remove(locator);
            }
        }
        state.by_account.remove(&key);

        self.backend
            .write_mapping(&state.mapping_snapshot())
            .await?;

        let existed = unit_existed || entry.is_some();
        if existed {
            tracing::info!(account = %key, "profile deleted");
        }

        Ok(existed)
    }

    /// Attach one locator to an existing account.
    ///
    /// Returns false when the locator is already taken or the account is
    /// unknown.
    pub async fn add_locator(&self, account: &Account, locator: &str) -> DirectoryResult<bool> {
        let locator = normalize_locator(locator);
        let key = account.key();
        let mut state = self.state.lock().await;

        if state.by_locator.contains_key(&locator) {
            return Ok(false);
        }

        match state.accounts.get_mut(&key) {
            Some(entry) => entry.locators.push(locator.clone()),
            None => return Ok(false),
        }

        self.backend
            .write_mapping(&state.mapping_snapshot())
            .await?;

        if let Some(record) = self.record_for_account(&mut state, account).await? {
            state.by_locator.insert(locator, record);
        }

        Ok(true)
    }

    /// Detach one locator from an existing account.
    pub async fn remove_locator(&self, account: &Account, locator: &str) -> DirectoryResult<bool> {
        let locator = normalize_locator(locator);
        let key = account.key();
        let mut state = self.state.lock().await;

        if !state.by_locator.contains_key(&locator) {
            return Ok(false);
        }

        match state.accounts.get_mut(&key) {
            Some(entry) => entry.locators.retain(|l| l != &locator),
            None => return Ok(false),
        }

        self.backend
            .write_mapping(&state.mapping_snapshot())
            .await?;

        Ok(state.by_locator.remove(&locator).is_some())
    }

    /// Resolve a locator to its profile, optionally narrowed to a
    /// relationship subset.
    ///
    /// Cache-aside: a locator miss walks the mapping to the owning
    /// account, loads that account's persisted profile, and backfills both
    /// cache levels.
    pub async fn lookup(
        &self,
        locator: &str,
        relationships: &[String],
    ) -> DirectoryResult<Option<ProfileRecord>> {
        let mut state = self.state.lock().await;

        if let Some(record) = state.by_locator.get(locator) {
            return Ok(Some(record.with_filtered_links(relationships)));
        }

        let Some(account) = state.account_owning(locator).map(|e| e.account.clone()) else {
            return Ok(None);
        };

        let Some(record) = self.record_for_account(&mut state, &account).await? else {
            return Ok(None);
        };

        state
            .by_locator
            .insert(locator.to_string(), record.clone());

        Ok(Some(record.with_filtered_links(relationships)))
    }

    /// Account-level cache-aside: consult the account cache, fall back to
    /// the persisted unit, and put it back in the cache on a miss.
    async fn record_for_account(
        &self,
        state: &mut DirectoryState,
        account: &Account,
    ) -> DirectoryResult<Option<ProfileRecord>> {
        let key = account.key();

        if let Some(record) = state.by_account.get(&key) {
            return Ok(Some(record.clone()));
        }

        let Some(record) = self.backend.read_profile(&key).await? else {
            return Ok(None);
        };

        state.by_account.insert(key, record.clone());
        Ok(Some(record))
    }

    /// Persist the profile, rewrite the account's locator set, repoint the
    /// locator cache, and save the mapping.
    async fn save_profile(
        &self,
        state: &mut DirectoryState,
        account: Account,
        locators: Vec<String>,
        record: ProfileRecord,
    ) -> DirectoryResult<()> {
        let key = account.key();

        self.backend.write_profile(&key, &record).await?;

        // clear-and-re-add: locators dropped by this update stop resolving
        if let Some(previous) = state.accounts.get(&key) {
            for old in previous.locators.clone() {
                state.by_locator.remove(&old);
            }
        }

        for locator in &locators {
            state.by_locator.insert(locator.clone(), record.clone());
        }

        state
            .accounts
            .insert(key.clone(), AccountLocators { account, locators });
        state.by_account.insert(key, record);

        self.backend.write_mapping(&state.mapping_snapshot()).await
    }
}
