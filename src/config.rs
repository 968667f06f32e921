use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the REST record store
    pub store_url: String,
    /// Directory holding the persisted session
    pub session_dir: PathBuf,
    /// Log directory, logs go to stderr when unset
    pub log_dir: Option<PathBuf>,
    pub request_timeout_secs: u64,
    /// Upper bound of concurrent store calls inside one workflow step
    pub max_concurrent_requests: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_url: "http://localhost:3000".to_string(),
            session_dir: PathBuf::from(".lms"),
            log_dir: None,
            request_timeout_secs: 30,
            max_concurrent_requests: 8,
        }
    }
}

impl Config {
    /// Load the config file when given, then apply `LMS_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        let _ = dotenvy::dotenv();
        config.apply_env(|key| dotenvy::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("LMS_STORE_URL") {
            self.store_url = url;
        }
        if let Some(dir) = var("LMS_SESSION_DIR") {
            self.session_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("LMS_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_requests == 0 {
            return Err(Error::Config(
                "max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.store_url.trim().is_empty() {
            return Err(Error::Config("store_url is empty".to_string()));
        }
        Ok(())
    }
}
