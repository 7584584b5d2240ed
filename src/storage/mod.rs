//! Storage backend abstraction for uploaded survey images.
//!
//! Objects are addressed by a key relative to the storage root, laid out as
//! `{survey_id}/{filename}` so each survey owns one directory.

pub mod local;

use async_trait::async_trait;

/// Storage operation errors.
#[derive(Debug)]
pub enum StorageError {
    /// File not found
    NotFound(String),
    /// Key escapes the storage root or is otherwise unusable
    InvalidKey(String),
    /// I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::NotFound(msg) => write!(f, "Not found: {}", msg),
            StorageError::InvalidKey(key) => write!(f, "Invalid key: {}", key),
            StorageError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(e.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

/// Build the storage key for a file belonging to a survey.
pub fn survey_key(survey_id: i32, filename: &str) -> String {
    format!("{}/{}", survey_id, filename)
}

/// Public URL a stored key is served under.
pub fn public_url(key: &str) -> String {
    format!("{}/{}", crate::constants::UPLOADS_URL_PREFIX, key)
}

/// Trait for storage backends.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store a file under `key`, creating intermediate directories.
    async fn put_object(&self, data: Vec<u8>, key: &str) -> Result<(), StorageError>;

    /// Remove a file. Missing files report `StorageError::NotFound`.
    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;

    /// Remove everything stored under `prefix`. Missing prefixes are not an error.
    async fn delete_prefix(&self, prefix: &str) -> Result<(), StorageError>;

    /// Check if a file exists.
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}
