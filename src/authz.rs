use crate::policy_store::{Mode, PolicyRecord};

/// Decide whether `identity` may submit anything under `policy`.
pub fn allowed(identity: Option<u64>, policy: &PolicyRecord) -> bool {
    match policy.mode {
        Mode::Off => false,
        Mode::Everyone => true,
        Mode::ContactsOnly => identity.is_some_and(|id| {
            id == policy.personal_user_id || policy.contacts_user_ids.contains(&id)
        }),
        Mode::Personal => identity.is_some_and(|id| id == policy.personal_user_id),
    }
}

pub fn describe_identity(identity: Option<u64>) -> String {
    identity.map_or_else(|| "None".to_string(), |id| id.to_string())
}

pub fn denial_message(identity: Option<u64>, policy: &PolicyRecord) -> String {
    format!(
        "Sender not allowed (UserID={}) in mode {}",
        describe_identity(identity),
        policy.mode
    )
}
