use crate::{
    confirm::ConfirmSettings, desktop::Desktop, identity::IdentityResolver,
    policy_store::PolicyStore,
};
use std::{path::PathBuf, sync::Arc};

/// Static, per-process settings that handlers read.
#[derive(Clone, Debug)]
pub struct Settings {
    pub app_title: String,
    pub downloads_dir: PathBuf,
    pub confirm: ConfirmSettings,
    pub max_upload_bytes: usize,
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub policies: Arc<PolicyStore>,
    pub resolver: Arc<dyn IdentityResolver>,
    pub desktop: Desktop,
}
