use crate::{
    config,
    confirm::{ConfirmSettings, DEFAULT_APPROVAL_TIMEOUT_SECS},
    identity::{DEFAULT_LOOKUP_TIMEOUT, DEFAULT_TAILSCALE_BIN},
    policy_store::{PolicyPaths, ValidModes},
};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_APP_TITLE: &str = "Spacedrop Server (one-way)";
pub const DEFAULT_DOWNLOADS_DIR: &str = "~/Downloads";
pub const DEFAULT_CONF_DIR: &str = "~/.config/Spacedrop";
pub const DEFAULT_ICON_PATH: &str = "~/Spacedrop/icon.png";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Values supplied on the command line or through the matching environment variables.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub app_title: Option<String>,
    pub downloads_dir: Option<PathBuf>,
    pub conf_dir: Option<PathBuf>,
    pub conf_path: Option<PathBuf>,
    pub valid_modes: Option<String>,
    pub icon_path: Option<PathBuf>,
    pub require_confirm_on_foreign: Option<bool>,
    pub confirm_on_self: Option<bool>,
    pub approval_timeout: Option<u64>,
    pub max_upload_bytes: Option<usize>,
    pub tailscale_bin: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct EffectiveSettings {
    pub host: String,
    pub port: u16,
    pub app_title: String,
    pub downloads_dir: PathBuf,
    pub policy_paths: PolicyPaths,
    pub valid_modes: ValidModes,
    pub icon_path: PathBuf,
    pub confirm: ConfirmSettings,
    pub max_upload_bytes: usize,
    pub tailscale_bin: PathBuf,
    pub lookup_timeout: Duration,
}

/// Parse an on/off switch. `0`, `false`, `no` and `off` (any case) are off; anything else is on.
pub fn parse_toggle(s: &str) -> Result<bool, String> {
    Ok(!matches!(
        s.trim().to_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    ))
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs_next::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

pub fn effective_settings(cli: &CliOverrides, cfg: Option<&config::Config>) -> EffectiveSettings {
    let cfg_server = cfg.and_then(|c| c.server.as_ref());
    let cfg_paths = cfg.and_then(|c| c.paths.as_ref());
    let cfg_policy = cfg.and_then(|c| c.policy.as_ref());
    let cfg_confirm = cfg.and_then(|c| c.confirm.as_ref());
    let cfg_identity = cfg.and_then(|c| c.identity.as_ref());

    let host = cli
        .host
        .clone()
        .or_else(|| cfg_server.and_then(|s| s.host.clone()))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = cli
        .port
        .or_else(|| cfg_server.and_then(|s| s.port))
        .unwrap_or(DEFAULT_PORT);

    let app_title = cli
        .app_title
        .clone()
        .or_else(|| cfg_server.and_then(|s| s.app_title.clone()))
        .unwrap_or_else(|| DEFAULT_APP_TITLE.to_string());

    let max_upload_bytes = cli
        .max_upload_bytes
        .or_else(|| cfg_server.and_then(|s| s.max_upload_bytes))
        .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

    let path_setting = |cli_val: &Option<PathBuf>,
                        cfg_val: fn(&config::PathsConfig) -> Option<&String>|
     -> Option<PathBuf> {
        cli_val
            .clone()
            .or_else(|| cfg_paths.and_then(cfg_val).map(PathBuf::from))
            .map(expand_home)
    };

    let downloads_dir = path_setting(&cli.downloads_dir, |p| p.downloads_dir.as_ref())
        .unwrap_or_else(|| expand_home(DEFAULT_DOWNLOADS_DIR));
    let conf_dir = path_setting(&cli.conf_dir, |p| p.conf_dir.as_ref())
        .unwrap_or_else(|| expand_home(DEFAULT_CONF_DIR));
    let conf_path = path_setting(&cli.conf_path, |p| p.conf_path.as_ref())
        .unwrap_or_else(|| conf_dir.join("config.json"));
    let icon_path = path_setting(&cli.icon_path, |p| p.icon_path.as_ref())
        .unwrap_or_else(|| expand_home(DEFAULT_ICON_PATH));

    let valid_modes = match (&cli.valid_modes, cfg_policy.and_then(|p| p.valid_modes.as_ref())) {
        (Some(list), _) => ValidModes::parse(list),
        (None, Some(list)) => ValidModes::parse(&list.join(",")),
        (None, None) => ValidModes::default(),
    };

    let confirm = ConfirmSettings {
        require_confirm_on_foreign: cli
            .require_confirm_on_foreign
            .or_else(|| cfg_confirm.and_then(|c| c.require_confirm_on_foreign))
            .unwrap_or(true),
        confirm_on_self: cli
            .confirm_on_self
            .or_else(|| cfg_confirm.and_then(|c| c.confirm_on_self))
            .unwrap_or(false),
        approval_timeout_secs: cli
            .approval_timeout
            .or_else(|| cfg_confirm.and_then(|c| c.approval_timeout))
            .unwrap_or(DEFAULT_APPROVAL_TIMEOUT_SECS),
    };

    let tailscale_bin = cli
        .tailscale_bin
        .clone()
        .or_else(|| {
            cfg_identity
                .and_then(|i| i.tailscale_bin.as_ref())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TAILSCALE_BIN));

    let lookup_timeout = cfg_identity
        .and_then(|i| i.lookup_timeout_secs)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_LOOKUP_TIMEOUT);

    EffectiveSettings {
        host,
        port,
        app_title,
        downloads_dir,
        policy_paths: PolicyPaths::new(conf_dir, conf_path),
        valid_modes,
        icon_path,
        confirm,
        max_upload_bytes,
        tailscale_bin,
        lookup_timeout,
    }
}
