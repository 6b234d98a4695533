//! Backend-selection factory for the `HistoryStore`, mirroring the
//! teacher's `create_store`/`create_in_memory_store` pair.

use std::sync::Arc;

use crate::config::{StateBackend, StateConfig};
use crate::error::{AppError, Result};

use super::{HistoryStore, InMemoryHistoryStore, SledHistoryStore};

pub async fn create_store(config: &StateConfig) -> Result<Arc<dyn HistoryStore>> {
    match config.backend {
        StateBackend::Sled => {
            let path = config.path.as_ref().ok_or_else(|| {
                AppError::Configuration("sled backend requires 'state.path' configuration".to_string())
            })?;

            tracing::info!(path = ?path, "initializing Sled storage backend");
            Ok(Arc::new(SledHistoryStore::new(path)?))
        }
        StateBackend::InMemory => {
            tracing::info!("initializing in-memory storage backend");
            Ok(Arc::new(InMemoryHistoryStore::new()))
        }
    }
}

pub fn create_in_memory_store() -> Arc<dyn HistoryStore> {
    Arc::new(InMemoryHistoryStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn sled_backend_requires_path() {
        let config = StateConfig {
            backend: StateBackend::Sled,
            path: None,
        };
        assert!(create_store(&config).await.is_err());
    }

    #[tokio::test]
    async fn sled_backend_builds_with_path() {
        let dir = TempDir::new().unwrap();
        let config = StateConfig {
            backend: StateBackend::Sled,
            path: Some(dir.path().to_path_buf()),
        };
        assert!(create_store(&config).await.is_ok());
    }

    #[tokio::test]
    async fn in_memory_backend_always_succeeds() {
        let config = StateConfig {
            backend: StateBackend::InMemory,
            path: None,
        };
        assert!(create_store(&config).await.is_ok());
    }
}
