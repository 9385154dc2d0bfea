//! Credential storage backends

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Cannot access session file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed session file {path}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Cannot serialize session data")]
    Serialize(#[from] toml::ser::Error),
}

/// Persistent key-value storage holding session credentials
pub trait SessionStore: Send + Sync {
    /// Reads the value stored under `key`
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, Error>> + Send;

    /// Stores `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), Error>> + Send;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Store keeping the values in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.entries
            .write()
            .await
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Store persisting values as a flat TOML table
///
/// The file is created on the first write. Missing file is equivalent to an empty store. Writes
/// go through a temporary file renamed over the original, so the file is never left half-written.
/// A malformed file fails reads, but is replaced by the next write.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles on the file
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, Error> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => toml::from_str(&content).map_err(|source| Error::Malformed {
                path: self.path.clone(),
                source,
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(source) => Err(Error::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Loads entries to be modified, starting over if the file is malformed
    async fn load_for_write(&self) -> Result<BTreeMap<String, String>, Error> {
        match self.load().await {
            Err(err @ Error::Malformed { .. }) => {
                warn!(error = %err, "Discarding malformed session file");
                Ok(BTreeMap::new())
            }
            loaded => loaded,
        }
    }

    async fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), Error> {
        let content = toml::to_string(entries)?;
        let io_error = |source| Error::Io {
            path: self.path.clone(),
            source,
        };

        let mut file_name = self.path.file_name().unwrap_or_default().to_owned();
        file_name.push(".tmp");
        let tmp = self.path.with_file_name(file_name);

        tokio::fs::write(&tmp, content).await.map_err(io_error)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_error)
    }
}

impl SessionStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        Ok(entries.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load_for_write().await?;
        entries.insert(key.to_owned(), value.to_owned());
        self.save(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        let mut entries = match self.load().await {
            Err(err @ Error::Malformed { .. }) => {
                warn!(error = %err, "Discarding malformed session file");
                return self.save(&BTreeMap::new()).await;
            }
            loaded => loaded?,
        };
        if entries.remove(key).is_some() {
            self.save(&entries).await?;
        }
        Ok(())
    }
}
