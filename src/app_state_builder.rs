use crate::{
    desktop::Desktop,
    identity::{IdentityResolver, TailscaleResolver},
    policy_store::PolicyStore,
    server_config::EffectiveSettings,
    state,
};
use anyhow::Result;
use std::sync::Arc;

/// Tailscale CLI resolver configured from settings.
pub fn build_resolver(eff: &EffectiveSettings) -> Arc<dyn IdentityResolver> {
    Arc::new(TailscaleResolver::new(&eff.tailscale_bin).with_timeout(eff.lookup_timeout))
}

pub fn settings_from(eff: &EffectiveSettings) -> state::Settings {
    state::Settings {
        app_title: eff.app_title.clone(),
        downloads_dir: eff.downloads_dir.clone(),
        confirm: eff.confirm.clone(),
        max_upload_bytes: eff.max_upload_bytes,
    }
}

/// Load the policy (creating it on first run) and assemble the shared AppState.
///
/// Fails if an existing policy file is unreadable or corrupt.
pub async fn build_app_state(
    eff: &EffectiveSettings,
    resolver: Arc<dyn IdentityResolver>,
    desktop: Desktop,
) -> Result<Arc<state::AppState>> {
    let policies = PolicyStore::open(
        eff.policy_paths.clone(),
        eff.valid_modes.clone(),
        resolver.as_ref(),
    )
    .await?;

    Ok(Arc::new(state::AppState {
        settings: settings_from(eff),
        policies: Arc::new(policies),
        resolver,
        desktop,
    }))
}
