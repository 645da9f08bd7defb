use dotenvy::dotenv;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("project ID not set")]
    MissingProjectId,

    #[error("branch ID not set")]
    MissingBranchId,

    #[error("invalid listen address {0:?}")]
    InvalidListenAddr(String),

    #[error("failed to watch config file: {0}")]
    Watch(#[from] notify::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub branch_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_product_id: Option<String>,
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_catalog")]
    pub catalog: String,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_credentials_file() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_location() -> String {
    "global".to_string()
}

fn default_catalog() -> String {
    "default_catalog".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_api_endpoint() -> String {
    "https://retail.googleapis.com".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Config {
    /// Parse a config document without touching the environment.
    pub fn from_json(path: &Path, content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        dotenv().ok(); // Load .env file if present
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json(path, &content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = get_env("RETAIL_PROJECT_ID") {
            self.project_id = v;
        }
        if let Some(v) = get_env("RETAIL_BRANCH_ID") {
            self.branch_id = v;
        }
        if let Some(v) = get_env("RETAIL_API_ENDPOINT") {
            self.api_endpoint = v;
        }
        if let Some(v) = get_env("RETAIL_LISTEN_ADDR") {
            self.listen_addr = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project_id.trim().is_empty() {
            return Err(ConfigError::MissingProjectId);
        }
        if self.branch_id.trim().is_empty() {
            return Err(ConfigError::MissingBranchId);
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddr(self.listen_addr.clone()))
    }

    pub fn catalog_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/catalogs/{}",
            self.project_id, self.location, self.catalog
        )
    }

    pub fn branch_path(&self) -> String {
        format!("{}/branches/{}", self.catalog_path(), self.branch_id)
    }

    /// Fully-qualified name of a product in the configured branch.
    pub fn product_name(&self, product_id: &str) -> String {
        format!("{}/products/{}", self.branch_path(), product_id)
    }

    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }

    pub fn allows_origin(&self, origin: &str) -> bool {
        self.allows_any_origin() || self.allowed_origins.iter().any(|o| o == origin)
    }

    pub fn pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("<unprintable config: {e}>"))
    }
}

fn get_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

/// Shared handle to the live configuration.
///
/// Readers take a cheap `Arc` clone of the current snapshot; a reload swaps the
/// whole snapshot, so nobody ever observes a half-updated config.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    current: Arc<RwLock<Arc<Config>>>,
}

impl ConfigHandle {
    pub fn new(config: Config) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub fn current(&self) -> Arc<Config> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, config: Config) {
        let next = Arc::new(config);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Re-read `path` and swap the snapshot if the new config is valid.
    /// An invalid file leaves the previous snapshot in place.
    pub fn reload_from(&self, path: &Path) -> Result<Arc<Config>, ConfigError> {
        let config = Config::load(path)?;
        self.replace(config);
        Ok(self.current())
    }

    /// Watch the config file and reload on change until `shutdown` fires.
    pub fn watch(&self, path: PathBuf, shutdown: CancellationToken) -> Result<(), ConfigError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )?;

        // Editors often replace the file rather than write it in place, so the
        // directory is watched and events are filtered by file name.
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let handle = self.clone();
        let file_name = path.file_name().map(|n| n.to_os_string());
        tokio::spawn(async move {
            // keep the watcher alive for as long as the task runs
            let _watcher = watcher;
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        log::warn!("config watch error: {e}");
                        continue;
                    }
                };
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    continue;
                }
                let touches_config = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                if !touches_config {
                    continue;
                }

                // coalesce the burst of events a single save produces
                tokio::time::sleep(Duration::from_millis(100)).await;
                while rx.try_recv().is_ok() {}

                log::info!("Config file changed: {}", path.display());
                match handle.reload_from(&path) {
                    Ok(config) => log::info!("\"config\": {}", config.pretty()),
                    Err(e) => log::error!("config reload rejected, keeping previous: {e}"),
                }
            }
            log::debug!("config watcher stopped");
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Config, ConfigError> {
        Config::from_json(Path::new("config.json"), json)
    }

    #[test]
    fn test_defaults_fill_optional_keys() {
        let config = parse(r#"{"project_id": "p", "branch_id": "1"}"#).unwrap();
        assert_eq!(config.location, "global");
        assert_eq!(config.catalog, "default_catalog");
        assert_eq!(config.allowed_origins, vec!["*"]);
        assert_eq!(config.credentials_file, PathBuf::from("credentials.json"));
        assert!(config.sample_product_id.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_front_end_keys_are_ignored() {
        let config = parse(
            r#"{"project_id": "p", "branch_id": "1", "api_base_url": "http://localhost:8080",
                "use_autocomplete": true, "search_on_type": false}"#,
        )
        .unwrap();
        assert_eq!(config.project_id, "p");
    }

    #[test]
    fn test_missing_project_or_branch_is_rejected() {
        let config = parse(r#"{"branch_id": "1"}"#).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::MissingProjectId)));

        let config = parse(r#"{"project_id": "p", "branch_id": ""}"#).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::MissingBranchId)));
    }

    #[test]
    fn test_bad_listen_addr_is_rejected() {
        let config = parse(r#"{"project_id": "p", "branch_id": "1", "listen_addr": "nope"}"#).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidListenAddr(_))
        ));
    }

    #[test]
    fn test_resource_paths() {
        let config = parse(r#"{"project_id": "P", "branch_id": "B"}"#).unwrap();
        assert_eq!(
            config.catalog_path(),
            "projects/P/locations/global/catalogs/default_catalog"
        );
        assert_eq!(
            config.product_name("42"),
            "projects/P/locations/global/catalogs/default_catalog/branches/B/products/42"
        );
    }

    #[test]
    fn test_origin_allow_list() {
        let config = parse(
            r#"{"project_id": "p", "branch_id": "1", "allowed_origins": ["https://shop.example"]}"#,
        )
        .unwrap();
        assert!(config.allows_origin("https://shop.example"));
        assert!(!config.allows_origin("https://evil.example"));
    }

    #[test]
    fn test_handle_swaps_whole_snapshot() {
        let first = parse(r#"{"project_id": "a", "branch_id": "1"}"#).unwrap();
        let second = parse(r#"{"project_id": "b", "branch_id": "2"}"#).unwrap();
        let handle = ConfigHandle::new(first);

        let before = handle.current();
        handle.replace(second);
        let after = handle.current();

        assert_eq!(before.project_id, "a");
        assert_eq!(before.branch_id, "1");
        assert_eq!(after.project_id, "b");
        assert_eq!(after.branch_id, "2");
    }
}
