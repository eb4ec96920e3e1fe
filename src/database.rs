use serde::{de::DeserializeOwned, Serialize};
use std::{path::Path, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{fs, sync::RwLock, time};
use tracing::{error, warn};

const SAVE_LIMIT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Codec(String),
    #[error("Database error: {0}")]
    Custom(String),
}

#[derive(Debug)]
struct DatabaseInner<T> {
    data: T,
    path: String,
}

/// A bincode file holding one `T`, cached in memory.
///
/// Writers go through [`transaction`](Self::transaction), which keeps the
/// write lock until the file is on disk: the file never lags behind a
/// change another writer has already built on.
#[derive(Clone, Debug)]
pub struct Database<T: Serialize + DeserializeOwned + Default + Send + Sync + Clone + 'static> {
    inner: Arc<RwLock<DatabaseInner<T>>>,
}

async fn load<T: DeserializeOwned + Default>(path: &str) -> T {
    match fs::read(path).await {
        Ok(bytes) => bincode::deserialize(&bytes).unwrap_or_else(|e| {
            error!("Failed to deserialize database {}: {}", path, e);
            T::default()
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
        Err(e) => {
            error!("Failed to read database {}: {}", path, e);
            T::default()
        }
    }
}

/// Writes next to the target and renames, so a crash mid-write leaves the
/// previous file intact.
async fn store<T: Serialize>(path: &str, data: &T) -> Result<(), DbError> {
    let bytes = bincode::serialize(data).map_err(|e| DbError::Codec(e.to_string()))?;
    let staging = format!("{}.tmp", path);

    let write = async {
        fs::write(&staging, bytes).await?;
        fs::rename(&staging, path).await
    };

    match time::timeout(SAVE_LIMIT, write).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            warn!("Saving {} timed out", path);
            Err(DbError::Custom("Save operation timed out".into()))
        }
    }
}

impl<T: Serialize + DeserializeOwned + Default + Send + Sync + Clone + 'static> Database<T> {
    pub async fn new(path: impl Into<String>) -> Result<Self, DbError> {
        let path = path.into();

        if let Some(parent) = Path::new(&path).parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                error!("Failed to create database directory: {}", e);
                DbError::Io(e)
            })?;
        }

        let data = load(&path).await;
        Ok(Self {
            inner: Arc::new(RwLock::new(DatabaseInner { data, path })),
        })
    }

    /// Applies `f` to a copy, saves it, then publishes it. Nothing changes in
    /// memory when `f` or the save fails.
    pub async fn transaction<F, R>(&self, f: F) -> Result<R, DbError>
    where
        F: FnOnce(&mut T) -> Result<R, String>,
    {
        let mut guard = self.inner.write().await;
        let mut data = guard.data.clone();
        let result = f(&mut data).map_err(DbError::Custom)?;

        store(&guard.path, &data).await?;
        guard.data = data;

        Ok(result)
    }

    pub async fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let guard = self.inner.read().await;
        f(&guard.data)
    }
}
