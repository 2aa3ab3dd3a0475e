use crate::{
    authz,
    confirm::{self, ConfirmOutcome},
    error::ApiError,
    policy_store::PolicyRecord,
    state::AppState,
};
use std::{net::IpAddr, sync::Arc};
use tracing::{info, warn};

/// A sender that passed authorization and confirmation.
#[derive(Debug, Clone)]
pub struct Admission {
    pub user_id: Option<u64>,
    pub policy: Arc<PolicyRecord>,
    pub outcome: ConfirmOutcome,
}

/// Resolve the sender, check the policy snapshot, then confirm with the human if needed.
///
/// One snapshot is used for both checks so a concurrent reload cannot split them.
pub async fn admit(state: &AppState, peer: IpAddr) -> Result<Admission, ApiError> {
    let user_id = state.resolver.resolve(peer).await;
    let policy = state.policies.snapshot();

    if !authz::allowed(user_id, &policy) {
        warn!(%peer, ?user_id, mode = %policy.mode, "sender not allowed");
        return Err(ApiError::NotAllowed {
            message: authz::denial_message(user_id, &policy),
            user_id,
            mode: policy.mode,
        });
    }

    let outcome = confirm::confirm(
        user_id,
        &policy,
        &state.settings.confirm,
        state.desktop.prompt.clone(),
        &state.settings.app_title,
        state.desktop.existing_icon().map(|p| p.to_path_buf()),
    )
    .await;

    match outcome {
        ConfirmOutcome::Declined(reason) => {
            warn!(%peer, ?user_id, ?reason, "item declined");
            Err(ApiError::Declined(reason))
        }
        _ => {
            info!(%peer, ?user_id, mode = %policy.mode, "sender admitted");
            Ok(Admission {
                user_id,
                policy,
                outcome,
            })
        }
    }
}
