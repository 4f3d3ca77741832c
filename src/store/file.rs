/// File-per-record persistence backend
///
/// Each identity record lives in `people/{id}.json`, each profile document
/// in `webfinger/{account_key}.json`, and the account-locator mapping in a
/// single `account_locators.json`. Units that fail to parse at load time
/// are moved into a `fault/` subdirectory so they are never retried and a
/// single corrupt file cannot block the rest of the directory.
use crate::{
    error::{DirectoryError, DirectoryResult},
    model::{AccountLocators, Person, ProfileRecord},
    store::{PersistenceBackend, ProfileLoad, RecordLoad},
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

const PEOPLE_DIR: &str = "people";
const PROFILE_DIR: &str = "webfinger";
const FAULT_DIR: &str = "fault";
const MAPPING_FILE: &str = "account_locators.json";

#[derive(Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn people_dir(&self) -> PathBuf {
        self.root.join(PEOPLE_DIR)
    }

    fn profile_dir(&self) -> PathBuf {
        self.root.join(PROFILE_DIR)
    }

    fn record_path(&self, id: i64) -> PathBuf {
        self.people_dir().join(format!("{}.json", id))
    }

    fn profile_path(&self, key: &str) -> PathBuf {
        self.profile_dir().join(format!("{}.json", key))
    }

    fn mapping_path(&self) -> PathBuf {
        self.root.join(MAPPING_FILE)
    }

    async fn write_unit<T: Serialize>(&self, path: &Path, value: &T) -> DirectoryResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let buffer = serde_json::to_vec_pretty(value)?;
        // whole-unit replace, handle released as soon as the write returns
        fs::write(path, buffer).await.map_err(|e| {
            DirectoryError::Persistence(format!("failed to write {}: {}", path.display(), e))
        })
    }

    async fn remove_unit(&self, path: &Path) -> DirectoryResult<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(DirectoryError::Persistence(format!(
                "failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Enumerate `*.json` units in a directory, parsing each and moving
    /// unparseable files into the `fault/` subdirectory.
    async fn load_units<T: DeserializeOwned>(
        &self,
        dir: &Path,
    ) -> DirectoryResult<(Vec<(String, T)>, usize)> {
        let fault_dir = dir.join(FAULT_DIR);
        fs::create_dir_all(&fault_dir).await?;

        let mut units = Vec::new();
        let mut faulted = Vec::new();

        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();

            let parsed = match fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice::<T>(&bytes).ok(),
                Err(e) => {
                    tracing::error!(file = %path.display(), %e, "failed to read unit");
                    None
                }
            };

            match parsed {
                Some(unit) => units.push((stem, unit)),
                None => {
                    tracing::error!(file = %path.display(), "failed to index unit, quarantining");
                    faulted.push(path);
                }
            }
        }

        // move faulted files so they won't be indexed again
        for path in &faulted {
            if let Some(name) = path.file_name() {
                if let Err(e) = fs::rename(path, fault_dir.join(name)).await {
                    tracing::error!(file = %path.display(), %e, "failed to quarantine unit");
                }
            }
        }

        Ok((units, faulted.len()))
    }
}

#[async_trait]
impl PersistenceBackend for FileBackend {
    async fn load_records(&self) -> DirectoryResult<RecordLoad> {
        let (units, quarantined) = self.load_units::<Person>(&self.people_dir()).await?;

        Ok(RecordLoad {
            records: units.into_iter().map(|(_, person)| person).collect(),
            quarantined,
        })
    }

    async fn write_record(&self, person: &Person) -> DirectoryResult<()> {
        self.write_unit(&self.record_path(person.id), person).await
    }

    async fn remove_record(&self, id: i64) -> DirectoryResult<bool> {
        self.remove_unit(&self.record_path(id)).await
    }

    async fn load_profiles(&self) -> DirectoryResult<ProfileLoad> {
        let (units, quarantined) = self.load_units::<ProfileRecord>(&self.profile_dir()).await?;

        Ok(ProfileLoad {
            profiles: units,
            quarantined,
        })
    }

    async fn read_profile(&self, key: &str) -> DirectoryResult<Option<ProfileRecord>> {
        let path = self.profile_path(key);

        match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    // malformed units are a load-time concern, never a
                    // request-time fault
                    tracing::warn!(file = %path.display(), %e, "unparseable profile unit");
                    Ok(None)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DirectoryError::Persistence(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn write_profile(&self, key: &str, record: &ProfileRecord) -> DirectoryResult<()> {
        self.write_unit(&self.profile_path(key), record).await
    }

    async fn remove_profile(&self, key: &str) -> DirectoryResult<bool> {
        self.remove_unit(&self.profile_path(key)).await
    }

    async fn load_mapping(&self) -> DirectoryResult<Vec<AccountLocators>> {
        let path = self.mapping_path();

        match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(mapping) => Ok(mapping),
                Err(e) => {
                    tracing::error!(file = %path.display(), %e, "unparseable locator mapping");
                    Ok(Vec::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_mapping(&self, mapping: &[AccountLocators]) -> DirectoryResult<()> {
        self.write_unit(&self.mapping_path(), &mapping).await
    }
}
