//! Application configuration from file and environment variables
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Environment variables (prefixed with SURVEY__, sections split by `__`)
//! 2. Config file (config.toml)
//! 3. Default values
//!
//! Secrets like signing keys should be kept in environment variables, not in
//! the config file.

use config::{Config, ConfigError, Environment, File};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Global application configuration
pub static APP_CONFIG: Lazy<RwLock<AppConfig>> = Lazy::new(|| {
    RwLock::new(AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config file, using defaults: {}", e);
        AppConfig::default()
    }))
});

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Worker threads; 0 keeps the actix default (one per core).
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            workers: 0,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection string (overridden by DATABASE_URL when set)
    pub url: String,
    pub max_connections: u32,
    /// Create missing tables from the entity definitions at startup
    pub create_schema: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://survey.db?mode=rwc".to_string(),
            max_connections: 10,
            create_schema: true,
        }
    }
}

/// Bearer token verification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Algorithm for `public_key_pem`: RS256, RS384, RS512, ES256 or ES384
    pub algorithm: String,
    /// Identity provider public key (should be in env var SURVEY__AUTH__PUBLIC_KEY_PEM)
    pub public_key_pem: String,
    /// HS256 shared secret, used when no public key is set
    pub shared_secret: String,
    /// Expected `iss` claim; empty to skip the check
    pub issuer: String,
    /// Clock skew tolerance for `exp`/`nbf`
    pub leeway_seconds: u64,
    /// Decode tokens without checking signatures. Development only.
    pub allow_unverified: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            algorithm: "RS256".to_string(),
            public_key_pem: String::new(),
            shared_secret: String::new(),
            issuer: String::new(),
            leeway_seconds: 60,
            allow_unverified: false,
        }
    }
}

/// Image upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Root directory for stored files
    pub directory: String,
    /// Maximum image size in bytes
    pub max_image_size: u64,
    /// Accepted MIME types
    pub allowed_image_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            directory: "./uploads".to_string(),
            max_image_size: 5 * 1024 * 1024,
            allowed_image_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/gif".to_string(),
                "image/webp".to_string(),
            ],
        }
    }
}

impl UploadConfig {
    /// Case-insensitive allow-list check, ignoring MIME parameters.
    pub fn allows(&self, mime_type: &str) -> bool {
        let essence = mime_type.split(';').next().unwrap_or("").trim();
        self.allowed_image_types
            .iter()
            .any(|t| t.trim().eq_ignore_ascii_case(essence))
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub uploads: UploadConfig,
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &str) -> Result<Self, ConfigError> {
        use config::FileFormat;

        let config = Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(File::new(path, FileFormat::Toml).required(false))
            // e.g., SURVEY__UPLOADS__MAX_IMAGE_SIZE, SURVEY__AUTH__SHARED_SECRET
            .add_source(
                Environment::with_prefix("SURVEY")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("uploads.allowed_image_types")
                    .try_parsing(true),
            )
            .build()?;

        let mut app_config: AppConfig = config.try_deserialize()?;
        if let Ok(url) = std::env::var("DATABASE_URL") {
            app_config.database.url = url;
        }
        Ok(app_config)
    }
}

/// Initialize application configuration
///
/// This triggers the lazy loading of the config file and logs the result.
/// Should be called early in application startup.
pub fn init() {
    let config = get_config();
    log::info!(
        "Configuration loaded: bind_address = {}, uploads = {}",
        config.server.bind_address,
        config.uploads.directory
    );
}

/// Get the current application configuration
pub fn get_config() -> AppConfig {
    APP_CONFIG.read().map(|c| c.clone()).unwrap_or_default()
}

pub fn server() -> ServerConfig {
    get_config().server
}

pub fn database() -> DatabaseConfig {
    get_config().database
}

pub fn auth() -> AuthConfig {
    get_config().auth
}

pub fn uploads() -> UploadConfig {
    get_config().uploads
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:8000");
        assert_eq!(config.uploads.max_image_size, 5 * 1024 * 1024);
        assert_eq!(config.uploads.allowed_image_types.len(), 4);
        assert!(!config.auth.allow_unverified);
    }

    #[test]
    fn test_allow_list_ignores_case_and_parameters() {
        let uploads = UploadConfig::default();
        assert!(uploads.allows("image/png"));
        assert!(uploads.allows("IMAGE/JPEG"));
        assert!(uploads.allows("image/webp; charset=binary"));
        assert!(!uploads.allows("image/svg+xml"));
        assert!(!uploads.allows("application/pdf"));
        assert!(!uploads.allows(""));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut temp_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[server]
bind_address = "127.0.0.1:9000"

[auth]
issuer = "https://clerk.example.com"
leeway_seconds = 5

[uploads]
directory = "/var/lib/surveys"
max_image_size = 1024
allowed_image_types = ["image/png"]
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(temp_file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert_eq!(config.auth.issuer, "https://clerk.example.com");
        assert_eq!(config.auth.leeway_seconds, 5);
        assert_eq!(config.uploads.directory, "/var/lib/surveys");
        assert_eq!(config.uploads.max_image_size, 1024);
        assert_eq!(config.uploads.allowed_image_types, vec!["image/png"]);
        // Defaults should still apply for unspecified values
        assert_eq!(config.auth.algorithm, "RS256");
        assert_eq!(config.database.max_connections, 10);
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let config = AppConfig::load_from_path("/nonexistent/config.toml").unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:8000");
        assert_eq!(config.uploads.directory, "./uploads");
    }
}
