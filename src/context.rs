/// Shared application context
///
/// Builds the storage backend selected by configuration and wires it into
/// the record store and the directory service. The backend is chosen once
/// here and passed explicitly; nothing else knows which strategy is live.
use crate::{
    config::{ServerConfig, StorageBackendConfig},
    error::DirectoryResult,
    idcodec::IdCodec,
    service::DirectoryService,
    store::{FileBackend, MemoryBackend, PersistenceBackend, RecordStore, SqliteBackend},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppContext {
    pub config: ServerConfig,
    pub store: Arc<RecordStore>,
    pub directory: Arc<DirectoryService>,
    pub id_codec: Arc<IdCodec>,
}

impl AppContext {
    pub async fn new(config: ServerConfig) -> DirectoryResult<Self> {
        let backend = build_backend(&config).await?;

        let store = Arc::new(RecordStore::open(backend.clone()).await?);
        let directory = Arc::new(DirectoryService::open(backend).await?);
        let id_codec = Arc::new(IdCodec::new(&config.service.hashid_salt)?);

        Ok(Self {
            config,
            store,
            directory,
            id_codec,
        })
    }
}

async fn build_backend(config: &ServerConfig) -> DirectoryResult<Arc<dyn PersistenceBackend>> {
    let backend: Arc<dyn PersistenceBackend> = match &config.storage.backend {
        StorageBackendConfig::File { location } => {
            tracing::info!(location = %location.display(), "using file storage backend");
            Arc::new(FileBackend::new(location.clone()))
        }
        StorageBackendConfig::Sqlite { db_path } => {
            tracing::info!(db = %db_path.display(), "using sqlite storage backend");
            let url = format!("sqlite://{}?mode=rwc", db_path.display());
            Arc::new(SqliteBackend::connect(&url).await?)
        }
        StorageBackendConfig::Memory => {
            tracing::info!("using in-memory storage backend");
            Arc::new(MemoryBackend::new())
        }
    };

    Ok(backend)
}
