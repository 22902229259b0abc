//! CLI execution context.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use pagecache_core::{BackendConfig, CacheConfig};
use pagecache_storage::{KeyValueBackend, PageCache, RedisClient};

use crate::output::Output;

/// Redis URL used when the config names none.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1/";

const CONFIG_NAMES: [&str; 3] = ["pagecache.toml", ".pagecache.toml", "pagecache.json"];

/// Execution context for CLI commands.
pub struct Context {
    /// Cache configuration.
    pub config: CacheConfig,
    /// Where the configuration came from, if anywhere.
    pub config_path: Option<PathBuf>,
    /// Output handler.
    pub output: Output,
}

impl Context {
    /// Load context from an explicit config file, or the nearest one found
    /// walking up from the working directory.
    pub fn load(config_path: Option<&str>, output: Output) -> Result<Self> {
        let (config, config_path) = match config_path {
            Some(path) => (CacheConfig::load(path)?, Some(PathBuf::from(path))),
            None => {
                let cwd = std::env::current_dir().context("Failed to get current directory")?;
                match Self::find_config(&cwd) {
                    Some(path) => (CacheConfig::load(&path)?, Some(path)),
                    None => (CacheConfig::default(), None),
                }
            }
        };

        match &config_path {
            Some(path) => output.debug(&format!("Using config {}", path.display())),
            None => output.debug("No config file found, using defaults"),
        }

        Ok(Self {
            config,
            config_path,
            output,
        })
    }

    /// Human-readable origin of the configuration.
    pub fn config_source(&self) -> String {
        match &self.config_path {
            Some(path) => path.display().to_string(),
            None => "defaults".to_string(),
        }
    }

    fn find_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .flat_map(|dir| CONFIG_NAMES.iter().map(move |name| dir.join(name)))
            .find(|path| path.is_file())
    }

    /// Connect to the configured backend.
    pub async fn cache(&self) -> Result<PageCache> {
        let backend = match &self.config.backend {
            BackendConfig::KeyValue { shape, url } => {
                let url = url.as_deref().unwrap_or(DEFAULT_REDIS_URL);
                self.output.debug(&format!("Connecting to {} ({} records)", url, shape));
                let client = RedisClient::connect(url)
                    .await
                    .with_context(|| format!("Failed to connect to {}", url))?;
                KeyValueBackend::new(*shape, Arc::new(client))
            }
            BackendConfig::ObjectStore { bucket } => {
                bail!(
                    "bucket '{}' uses the object-store backend, which has no network client in this tool",
                    bucket
                );
            }
        };

        Ok(PageCache::new(self.config.clone(), Arc::new(backend)))
    }
}
