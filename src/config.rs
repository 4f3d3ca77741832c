/// Configuration management for the Fingerpost directory server
use crate::error::{DirectoryError, DirectoryResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Domain used to complete bare `/@handle` profile lookups
    pub public_domain: String,
    pub version: String,
    /// Salt for the public id encoding; must stay fixed across restarts
    pub hashid_salt: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub backend: StorageBackendConfig,
}

/// Storage backend selection, decided once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StorageBackendConfig {
    File { location: PathBuf },
    Sqlite { db_path: PathBuf },
    Memory,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> DirectoryResult<Self> {
        dotenv::dotenv().ok();

        let hostname =
            env::var("FINGERPOST_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("FINGERPOST_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| DirectoryError::Validation("Invalid port number".to_string()))?;
        let public_domain =
            env::var("FINGERPOST_PUBLIC_DOMAIN").unwrap_or_else(|_| hostname.clone());
        let version = env!("CARGO_PKG_VERSION").to_string();

        let hashid_salt = env::var("FINGERPOST_HASHID_SALT")
            .map_err(|_| DirectoryError::Validation("Hashid salt required".to_string()))?;

        let data_directory: PathBuf = env::var("FINGERPOST_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();

        let backend = match env::var("FINGERPOST_STORAGE_BACKEND")
            .unwrap_or_else(|_| "file".to_string())
            .to_lowercase()
            .as_str()
        {
            "file" => StorageBackendConfig::File {
                location: env::var("FINGERPOST_FILE_LOCATION")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| data_directory.clone()),
            },
            "sqlite" => StorageBackendConfig::Sqlite {
                db_path: env::var("FINGERPOST_SQLITE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| data_directory.join("fingerpost.sqlite")),
            },
            "memory" => StorageBackendConfig::Memory,
            other => {
                return Err(DirectoryError::Validation(format!(
                    "Unknown storage backend: {}",
                    other
                )))
            }
        };

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                public_domain,
                version,
                hashid_salt,
            },
            storage: StorageConfig {
                data_directory,
                backend,
            },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> DirectoryResult<()> {
        if self.service.hostname.is_empty() {
            return Err(DirectoryError::Validation(
                "Hostname cannot be empty".to_string(),
            ));
        }

        if self.service.hashid_salt.is_empty() {
            return Err(DirectoryError::Validation(
                "Hashid salt cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ServerConfig {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 8080,
                public_domain: "test.social".to_string(),
                version: "0.1.0".to_string(),
                hashid_salt: "salt".to_string(),
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                backend: StorageBackendConfig::Memory,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_empty_salt_is_rejected() {
        let mut config = test_config();
        config.service.hashid_salt = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_hostname_is_rejected() {
        let mut config = test_config();
        config.service.hostname = String::new();
        assert!(config.validate().is_err());
    }
}
