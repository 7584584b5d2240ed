//! Local filesystem storage backend.

use super::{StorageBackend, StorageError};
use actix_web::web;
use async_trait::async_trait;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Local filesystem storage backend.
pub struct LocalStorage {
    /// Base path for file storage
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend.
    ///
    /// The `base_path` directory will be created if it doesn't exist.
    pub fn new(base_path: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path)?;
        log::info!("LocalStorage initialized at {:?}", base_path);
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a key to a path under the base directory.
    /// Only plain relative components are accepted.
    fn get_file_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let clean = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        Ok(self.base_path.join(relative))
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn put_object(&self, data: Vec<u8>, key: &str) -> Result<(), StorageError> {
        let path = self.get_file_path(key)?;
        log::info!("LocalStorage: put_object: {:?}", path);

        web::block(move || {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, data)
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;

        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        let path = self.get_file_path(key)?;
        log::info!("LocalStorage: delete_object: {:?}", path);

        web::block(move || fs::remove_file(&path))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;

        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), StorageError> {
        let path = self.get_file_path(prefix)?;
        log::info!("LocalStorage: delete_prefix: {:?}", path);

        let result = web::block(move || fs::remove_dir_all(&path))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))?;

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.get_file_path(key)?;
        Ok(path.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().to_path_buf()).unwrap();

        assert!(storage.get_file_path("3/abc.png").is_ok());
        assert!(storage.get_file_path("../etc/passwd").is_err());
        assert!(storage.get_file_path("/etc/passwd").is_err());
        assert!(storage.get_file_path("3/../../x").is_err());
        assert!(storage.get_file_path("").is_err());
    }

    #[actix_rt::test]
    async fn test_put_then_delete_object() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().to_path_buf()).unwrap();

        storage
            .put_object(b"hello".to_vec(), "7/file.png")
            .await
            .unwrap();
        assert!(storage.exists("7/file.png").await.unwrap());
        assert_eq!(fs::read(dir.path().join("7/file.png")).unwrap(), b"hello");

        storage.delete_object("7/file.png").await.unwrap();
        assert!(!storage.exists("7/file.png").await.unwrap());

        assert!(matches!(
            storage.delete_object("7/file.png").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[actix_rt::test]
    async fn test_delete_prefix_tolerates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().to_path_buf()).unwrap();

        storage.put_object(vec![1, 2, 3], "9/a.gif").await.unwrap();
        storage.delete_prefix("9").await.unwrap();
        assert!(!dir.path().join("9").exists());

        storage.delete_prefix("9").await.unwrap();
    }
}
