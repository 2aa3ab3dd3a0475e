use anyhow::Context;
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf};
use tracing::{info, warn};

use spacedrop::{app, app_state_builder, config, desktop::Desktop, server_config};

const DEFAULT_CONFIG_PATH: &str = "~/.config/Spacedrop/spacedrop.toml";

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Bind host (default: 0.0.0.0)
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// Bind port (default: 8787)
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Title shown on confirmation dialogs
    #[arg(long, env = "APP_TITLE")]
    app_title: Option<String>,

    /// Where dropped files are saved (default: ~/Downloads)
    #[arg(long, env = "DOWNLOADS_DIR")]
    downloads_dir: Option<PathBuf>,

    /// Directory holding the policy file (default: ~/.config/Spacedrop)
    #[arg(long, env = "CONF_DIR")]
    conf_dir: Option<PathBuf>,

    /// Policy file (default: <conf-dir>/config.json)
    #[arg(long, env = "CONF_PATH")]
    conf_path: Option<PathBuf>,

    /// Comma-separated list of accepted policy modes
    #[arg(long, env = "VALID_MODES")]
    valid_modes: Option<String>,

    /// Icon for dialogs and notifications; ignored if missing
    #[arg(long, env = "ICON_PATH")]
    icon_path: Option<PathBuf>,

    /// Prompt before accepting items (0/false/no/off disables)
    #[arg(long, env = "REQUIRE_CONFIRM_ON_FOREIGN", value_parser = server_config::parse_toggle)]
    require_confirm_on_foreign: Option<bool>,

    /// Also prompt for items sent by the personal user
    #[arg(long, env = "CONFIRM_ON_SELF", value_parser = server_config::parse_toggle)]
    confirm_on_self: Option<bool>,

    /// Seconds before an unanswered prompt declines (0 waits forever)
    #[arg(long, env = "APPROVAL_TIMEOUT")]
    approval_timeout: Option<u64>,

    /// Request body limit in bytes (default: 256 MiB)
    #[arg(long, env = "MAX_UPLOAD_BYTES")]
    max_upload_bytes: Option<usize>,

    /// Tailscale CLI used to identify senders
    #[arg(long, env = "TAILSCALE_BIN")]
    tailscale_bin: Option<PathBuf>,

    /// Config TOML file (default: ~/.config/Spacedrop/spacedrop.toml)
    #[arg(long, env = "SPACEDROP_CONFIG")]
    config: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> server_config::CliOverrides {
        server_config::CliOverrides {
            host: self.host.clone(),
            port: self.port,
            app_title: self.app_title.clone(),
            downloads_dir: self.downloads_dir.clone(),
            conf_dir: self.conf_dir.clone(),
            conf_path: self.conf_path.clone(),
            valid_modes: self.valid_modes.clone(),
            icon_path: self.icon_path.clone(),
            require_confirm_on_foreign: self.require_confirm_on_foreign,
            confirm_on_self: self.confirm_on_self,
            approval_timeout: self.approval_timeout,
            max_upload_bytes: self.max_upload_bytes,
            tailscale_bin: self.tailscale_bin.clone(),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Existing environment variables win over .env entries.
    let dotenv = dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Some(path) = dotenv {
        info!("loaded environment from {}", path.display());
    }

    let args = Args::parse();
    let config_path = server_config::expand_home(
        args.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
    );
    let config = match config::Config::load(&config_path) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            if let Some(ioe) = e.downcast_ref::<std::io::Error>() {
                if ioe.kind() == std::io::ErrorKind::NotFound {
                    info!(
                        "config file not found at {}; continuing",
                        config_path.display()
                    );
                    None
                } else {
                    return Err(e);
                }
            } else {
                return Err(e);
            }
        }
    };

    let eff = server_config::effective_settings(&args.overrides(), config.as_ref());

    let resolver = app_state_builder::build_resolver(&eff);
    let desktop = Desktop::macos(Some(eff.icon_path.clone()));
    let state = app_state_builder::build_app_state(&eff, resolver, desktop).await?;

    {
        let policy = state.policies.snapshot();
        info!(
            mode = %policy.mode,
            personal_user_id = policy.personal_user_id,
            contacts = policy.contacts_user_ids.len(),
            config_path = %eff.policy_paths.config_path.display(),
            downloads_dir = %eff.downloads_dir.display(),
            "policy loaded"
        );
    }
    if !eff.confirm.require_confirm_on_foreign {
        warn!("confirmation prompts disabled; every allowed sender is auto-accepted");
    }

    let app = app::build_router(state);

    let listener = tokio::net::TcpListener::bind((eff.host.as_str(), eff.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", eff.host, eff.port))?;
    info!("listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}
