use crate::{
    desktop::{PromptRequest, PromptSurface, PROMPT_GRACE},
    policy_store::{Mode, PolicyRecord},
};
use serde::Serialize;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};

pub const DEFAULT_APPROVAL_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmSettings {
    /// Global switch: when false nothing is ever prompted.
    pub require_confirm_on_foreign: bool,
    /// Also prompt when the sender is the personal identity (outside PERSONAL mode).
    pub confirm_on_self: bool,
    /// 0 waits for an answer indefinitely.
    pub approval_timeout_secs: u64,
}

impl ConfirmSettings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.approval_timeout_secs > 0).then(|| Duration::from_secs(self.approval_timeout_secs))
    }
}

impl Default for ConfirmSettings {
    fn default() -> Self {
        Self {
            require_confirm_on_foreign: true,
            confirm_on_self: false,
            approval_timeout_secs: DEFAULT_APPROVAL_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoAcceptReason {
    PromptingDisabled,
    SelfSender,
    PersonalMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmDecision {
    AutoAccept(AutoAcceptReason),
    Prompt { message: String },
}

pub fn prompt_message(identity: Option<u64>) -> String {
    match identity {
        None => "Unknown sender (no UserID). Accept incoming item?".to_string(),
        Some(id) => format!("Incoming item from UserID {id}. Accept?"),
    }
}

/// Decide whether this sender needs a human to approve the item. First match wins.
pub fn decide(
    identity: Option<u64>,
    policy: &PolicyRecord,
    settings: &ConfirmSettings,
) -> ConfirmDecision {
    if !settings.require_confirm_on_foreign {
        return ConfirmDecision::AutoAccept(AutoAcceptReason::PromptingDisabled);
    }

    let is_self = identity == Some(policy.personal_user_id);
    if is_self && !settings.confirm_on_self {
        return ConfirmDecision::AutoAccept(AutoAcceptReason::SelfSender);
    }
    if is_self && policy.mode == Mode::Personal {
        return ConfirmDecision::AutoAccept(AutoAcceptReason::PersonalMode);
    }

    ConfirmDecision::Prompt {
        message: prompt_message(identity),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineReason {
    User,
    TimedOut,
    PromptFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    AutoAccepted(AutoAcceptReason),
    Accepted,
    Declined(DeclineReason),
}

/// Ask the prompt surface and collapse every non-accept into a decline.
///
/// The prompt runs on its own task: if the caller goes away the dialog still
/// runs to completion (or its deadline) and the answer is dropped.
pub async fn ask(
    surface: Arc<dyn PromptSurface>,
    title: &str,
    message: String,
    icon: Option<PathBuf>,
    timeout: Option<Duration>,
) -> ConfirmOutcome {
    let req = PromptRequest {
        title: title.to_string(),
        message,
        icon,
        timeout,
    };

    let task = tokio::spawn(async move {
        let call = surface.confirm(&req);
        match req.timeout {
            Some(t) => tokio::time::timeout(t.saturating_add(PROMPT_GRACE), call)
                .await
                .ok(),
            None => Some(call.await),
        }
    });

    match task.await {
        Ok(Some(Ok(true))) => ConfirmOutcome::Accepted,
        Ok(Some(Ok(false))) => ConfirmOutcome::Declined(DeclineReason::User),
        Ok(Some(Err(e))) => {
            warn!(error = %e, "confirmation prompt failed; declining");
            ConfirmOutcome::Declined(DeclineReason::PromptFailed)
        }
        Ok(None) => {
            warn!("confirmation prompt exceeded its deadline; declining");
            ConfirmOutcome::Declined(DeclineReason::TimedOut)
        }
        Err(e) => {
            warn!(error = %e, "confirmation task aborted; declining");
            ConfirmOutcome::Declined(DeclineReason::PromptFailed)
        }
    }
}

/// Full confirmation step: decide, then prompt if needed.
pub async fn confirm(
    identity: Option<u64>,
    policy: &PolicyRecord,
    settings: &ConfirmSettings,
    surface: Arc<dyn PromptSurface>,
    title: &str,
    icon: Option<PathBuf>,
) -> ConfirmOutcome {
    match decide(identity, policy, settings) {
        ConfirmDecision::AutoAccept(reason) => {
            info!(user_id = ?identity, ?reason, "confirmation skipped");
            ConfirmOutcome::AutoAccepted(reason)
        }
        ConfirmDecision::Prompt { message } => {
            let outcome = ask(surface, title, message, icon, settings.timeout()).await;
            info!(user_id = ?identity, ?outcome, "confirmation answered");
            outcome
        }
    }
}
