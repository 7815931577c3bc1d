//! Persistence of session credentials.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use {
    async_trait::async_trait,
    tokio::io::AsyncWriteExt,
    tracing::{debug, warn},
};

use crate::{error::StoreError, types::SessionCredentials};

/// Loads and persists the credentials of the single session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Stored credentials, or `None` when absent or unreadable.
    async fn load(&self) -> Option<SessionCredentials>;

    /// Persist credentials durably, replacing any previous set.
    async fn save(&self, credentials: &SessionCredentials) -> Result<(), StoreError>;

    /// Remove stored credentials. Clearing an empty store succeeds.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// Credentials kept as a single JSON file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "session".into());
        self.path.with_file_name(format!(".{name}.tmp"))
    }

    fn write_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Option<SessionCredentials> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read session file");
                return None;
            },
        };

        match serde_json::from_slice::<serde_json::Value>(&raw) {
            Ok(serde_json::Value::Null) => None,
            Ok(value) => Some(SessionCredentials(value)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring malformed session file");
                None
            },
        }
    }

    async fn save(&self, credentials: &SessionCredentials) -> Result<(), StoreError> {
        let body = serde_json::to_vec(credentials)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.write_error(e))?;
        }

        let tmp = self.temp_path();
        let write = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&body).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, &self.path).await
        };
        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(self.write_error(e));
        }

        debug!(path = %self.path.display(), "session credentials saved");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "session credentials cleared");
                Ok(())
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn creds() -> SessionCredentials {
        SessionCredentials(json!({
            "WABrowserId": "\"abc\"",
            "WASecretBundle": "{\"key\":\"k\"}",
            "WAToken1": "\"t1\"",
            "WAToken2": "\"1@t2\""
        }))
    }

    #[tokio::test]
    async fn save_load_clear_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("whatsapp-session.json"));

        assert!(store.load().await.is_none());
        store.save(&creds()).await.unwrap();
        assert_eq!(store.load().await, Some(creds()));

        store.clear().await.unwrap();
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn clearing_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("none.json"));
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn truncated_file_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whatsapp-session.json");
        std::fs::write(&path, b"{\"WABrowserId\": \"ab").unwrap();
        assert!(FileSessionStore::new(&path).load().await.is_none());
    }

    #[tokio::test]
    async fn save_creates_parent_dirs_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state/session.json");
        let store = FileSessionStore::new(&path);
        store.save(&creds()).await.unwrap();

        assert!(path.exists());
        let names: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[tokio::test]
    async fn save_replaces_previous_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("s.json"));
        store.save(&creds()).await.unwrap();
        let next = SessionCredentials(json!({"WAToken1": "new"}));
        store.save(&next).await.unwrap();
        assert_eq!(store.load().await, Some(next));
    }

    #[tokio::test]
    async fn unwritable_target_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        // The target path is an existing directory, so the rename fails.
        let target = dir.path().join("taken");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("f"), b"x").unwrap();
        let err = FileSessionStore::new(&target)
            .save(&creds())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }));
    }
}
