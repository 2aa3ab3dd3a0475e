use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Optional TOML settings file. Every value here is overridden by CLI flags and
/// environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub server: Option<ServerConfig>,
    pub paths: Option<PathsConfig>,
    pub policy: Option<PolicyConfig>,
    pub confirm: Option<ConfirmConfig>,
    pub identity: Option<IdentityConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub app_title: Option<String>,
    /// Request body limit for uploads.
    pub max_upload_bytes: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    pub downloads_dir: Option<String>,
    pub conf_dir: Option<String>,
    pub conf_path: Option<String>,
    pub icon_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyConfig {
    pub valid_modes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfirmConfig {
    pub require_confirm_on_foreign: Option<bool>,
    pub confirm_on_self: Option<bool>,
    /// Seconds; 0 waits forever.
    pub approval_timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityConfig {
    pub tailscale_bin: Option<String>,
    pub lookup_timeout_secs: Option<u64>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let cfg: Self =
            toml::from_str(&raw).with_context(|| format!("invalid TOML in {}", path.display()))?;
        Ok(cfg)
    }
}
