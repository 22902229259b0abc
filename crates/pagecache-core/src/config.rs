//! Process-wide cache configuration.
//!
//! The configuration is assembled once before any request is served and is
//! then shared read-only by the key builder and the storage orchestrator.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default first component of every composite key.
pub const DEFAULT_BASE_NAME: &str = "index";

/// Default header carrying the URL-encoded JSON query object.
pub const DEFAULT_QUERY_HEADER: &str = "x-cache-query";

/// Complete cache configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Key derivation settings.
    #[serde(default)]
    pub keys: KeyConfig,

    /// Selected storage backend.
    #[serde(default)]
    pub backend: BackendConfig,
}

impl CacheConfig {
    /// Create a config with empty allow-lists and the default backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from a file (TOML, or JSON when the extension is `.json`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str::<Self>(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        } else {
            Self::from_toml_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?
        };

        Ok(config.normalized())
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config.normalized())
    }

    /// Allow a cookie name to participate in key derivation.
    pub fn with_cookie(mut self, name: impl Into<String>) -> Self {
        register(&mut self.keys.cookies, name.into());
        self
    }

    /// Allow a query parameter to participate in key derivation.
    pub fn with_query(mut self, name: impl Into<String>) -> Self {
        register(&mut self.keys.query, name.into());
        self
    }

    /// Enable or disable splitting entries by device class.
    pub fn with_device_split(mut self, enabled: bool) -> Self {
        self.keys.device_split = enabled;
        self
    }

    /// Select the storage backend.
    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    // File-loaded allow-lists may repeat names; keep first positions only.
    fn normalized(mut self) -> Self {
        self.keys.cookies = dedup(std::mem::take(&mut self.keys.cookies));
        self.keys.query = dedup(std::mem::take(&mut self.keys.query));
        self
    }
}

/// Settings that feed composite key derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyConfig {
    /// First component of every composite key.
    #[serde(default = "default_base_name")]
    pub base_name: String,

    /// Allow-listed cookie names, in registration order.
    #[serde(default)]
    pub cookies: Vec<String>,

    /// Allow-listed query parameter names, in registration order.
    #[serde(default)]
    pub query: Vec<String>,

    /// Whether entries are split by device class.
    #[serde(default)]
    pub device_split: bool,

    /// Request header carrying the URL-encoded JSON query object.
    #[serde(default = "default_query_header")]
    pub query_header: String,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            base_name: default_base_name(),
            cookies: Vec::new(),
            query: Vec::new(),
            device_split: false,
            query_header: default_query_header(),
        }
    }
}

fn default_base_name() -> String {
    DEFAULT_BASE_NAME.to_string()
}

fn default_query_header() -> String {
    DEFAULT_QUERY_HEADER.to_string()
}

/// Storage backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BackendConfig {
    /// Bucket-style object store.
    ObjectStore {
        /// Bucket holding the cache objects.
        bucket: String,
    },
    /// Key-value store.
    KeyValue {
        /// Record layout.
        #[serde(default)]
        shape: RecordShape,
        /// Connection URL.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::KeyValue {
            shape: RecordShape::default(),
            url: None,
        }
    }
}

/// Layout of records in a key-value store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordShape {
    /// One multi-field record per entry (value, html, tags).
    #[default]
    Structured,
    /// One opaque serialized value per entry.
    Flat,
}

impl std::fmt::Display for RecordShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Structured => write!(f, "structured"),
            Self::Flat => write!(f, "flat"),
        }
    }
}

impl std::str::FromStr for RecordShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "structured" => Ok(Self::Structured),
            "flat" => Ok(Self::Flat),
            other => Err(format!("unknown record shape: {}", other)),
        }
    }
}

fn register(list: &mut Vec<String>, name: String) {
    if !list.contains(&name) {
        list.push(name);
    }
}

fn dedup(names: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        register(&mut out, name);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::new();
        assert_eq!(config.keys.base_name, "index");
        assert_eq!(config.keys.query_header, DEFAULT_QUERY_HEADER);
        assert!(!config.keys.device_split);
        assert!(config.keys.cookies.is_empty());
        assert_eq!(
            config.backend,
            BackendConfig::KeyValue {
                shape: RecordShape::Structured,
                url: None
            }
        );
    }

    #[test]
    fn test_registration_preserves_order_and_ignores_repeats() {
        let config = CacheConfig::new()
            .with_cookie("locale")
            .with_cookie("currency")
            .with_cookie("locale")
            .with_query("page");

        assert_eq!(config.keys.cookies, vec!["locale", "currency"]);
        assert_eq!(config.keys.query, vec!["page"]);
    }

    #[test]
    fn test_parse_toml() {
        let config = CacheConfig::from_toml_str(
            r#"
            [keys]
            cookies = ["locale", "currency", "locale"]
            query = ["page"]
            device_split = true

            [backend]
            kind = "key-value"
            shape = "flat"
            url = "redis://127.0.0.1/"
            "#,
        )
        .unwrap();

        assert_eq!(config.keys.cookies, vec!["locale", "currency"]);
        assert!(config.keys.device_split);
        assert_eq!(config.keys.base_name, "index");
        assert_eq!(
            config.backend,
            BackendConfig::KeyValue {
                shape: RecordShape::Flat,
                url: Some("redis://127.0.0.1/".to_string())
            }
        );
    }

    #[test]
    fn test_parse_object_store_backend() {
        let config = CacheConfig::from_toml_str(
            r#"
            [backend]
            kind = "object-store"
            bucket = "pages"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.backend,
            BackendConfig::ObjectStore {
                bucket: "pages".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let result = CacheConfig::from_toml_str(
            r#"
            [backend]
            kind = "filesystem"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pagecache.json");
        std::fs::write(
            &path,
            r#"{"keys": {"cookies": ["locale"]}, "backend": {"kind": "object-store", "bucket": "b"}}"#,
        )
        .unwrap();

        let config = CacheConfig::load(&path).unwrap();
        assert_eq!(config.keys.cookies, vec!["locale"]);
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = CacheConfig::load("/nonexistent/pagecache.toml").unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read config file"));
    }

    #[test]
    fn test_record_shape_from_str() {
        assert_eq!("flat".parse::<RecordShape>(), Ok(RecordShape::Flat));
        assert_eq!("Structured".parse::<RecordShape>(), Ok(RecordShape::Structured));
        assert!("columnar".parse::<RecordShape>().is_err());
    }
}
