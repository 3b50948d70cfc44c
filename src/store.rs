use std::{io, path::PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};

// persistence for the ordered list of blocked domain strings

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("stored list at {path} is not a json array of strings: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value style store holding the user's list exactly as entered.
///
/// Writes replace the whole list; the last write wins.
#[async_trait]
pub trait DomainStore: Send + Sync {
    async fn get(&self) -> Result<Vec<String>, StoreError>;
    async fn set(&self, domains: &[String]) -> Result<(), StoreError>;
}

/// Stores the list as a JSON array file. A missing file reads as empty.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DomainStore for JsonFileStore {
    async fn get(&self) -> Result<Vec<String>, StoreError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "store file missing, treating as empty");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    async fn set(&self, domains: &[String]) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(domains).map_err(|err| StoreError::Write {
            path: self.path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, err),
        })?;
        write_atomic(&self.path, &body)
            .await
            .map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

/// Volatile store, used when embedding and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    domains: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new(domains: Vec<String>) -> Self {
        Self {
            domains: Mutex::new(domains),
        }
    }
}

#[async_trait]
impl DomainStore for MemoryStore {
    async fn get(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.domains.lock().await.clone())
    }

    async fn set(&self, domains: &[String]) -> Result<(), StoreError> {
        *self.domains.lock().await = domains.to_vec();
        Ok(())
    }
}

/// Writes through a sibling temp file and renames it into place.
pub(crate) async fn write_atomic(destination: &PathBuf, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let temp_path = temp_path_for(destination);
    let result = write_and_rename(&temp_path, destination, bytes).await;
    if result.is_err() {
        if let Err(err) = fs::remove_file(&temp_path).await {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %temp_path.display(), error = %err, "failed to remove temp file");
            }
        }
    }
    result
}

async fn write_and_rename(temp_path: &PathBuf, destination: &PathBuf, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(temp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(temp_path, destination).await
}

// `<file name>.tmp` next to the destination, so distinct files never share one
fn temp_path_for(destination: &PathBuf) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    destination.with_file_name(name)
}
