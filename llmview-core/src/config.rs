use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::{CoreResult, LlmViewError};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HostCfg {
    /// Root URL of the inspection UI.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable that contains a bearer token for the UI.
    #[serde(default)]
    pub token_env: Option<String>,
}

impl Default for HostCfg {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_env: None,
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpCfg {
    /// TCP connect timeout in milliseconds (default 5000ms)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Total request timeout in milliseconds (default 60000ms)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Optional per-host idle connection pool cap (None = reqwest default)
    #[serde(default)]
    pub pool_max_idle_per_host: Option<usize>,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            pool_max_idle_per_host: None,
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_request_timeout_ms() -> u64 {
    60_000
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CacheCfg {
    /// Number of flows kept by the flow cache.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for CacheCfg {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

fn default_capacity() -> usize {
    1024
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Config {
    #[serde(default)]
    pub host: HostCfg,
    /// HTTP client configuration (timeouts, pooling). Missing → defaults.
    #[serde(default)]
    pub http: HttpCfg,
    #[serde(default)]
    pub cache: CacheCfg,
}

impl Config {
    /// Load a Config from a file path (JSON or TOML by extension). If the
    /// extension is missing or unrecognized, try JSON first, then TOML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(LlmViewError::from)?;
        let s = std::str::from_utf8(&bytes).map_err(|e| LlmViewError::Other(e.into()))?;
        let cfg: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                serde_json::from_str::<Self>(s).map_err(|e| LlmViewError::Other(e.into()))?
            }
            Some("toml") => toml::from_str::<Self>(s).map_err(|e| LlmViewError::Other(e.into()))?,
            _ => serde_json::from_str::<Self>(s)
                .map_err(|e| LlmViewError::Other(e.into()))
                .or_else(|_| toml::from_str::<Self>(s).map_err(|e| LlmViewError::Other(e.into())))?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.cache.capacity == 0 {
            return Err(LlmViewError::Validation(
                "cache.capacity must be greater than zero".into(),
            ));
        }
        if self.host.base_url.trim().is_empty() {
            return Err(LlmViewError::Validation("host.base_url is empty".into()));
        }
        Ok(())
    }
}
