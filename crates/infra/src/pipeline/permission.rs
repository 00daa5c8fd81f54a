//! Sender/recipient account gating.
//!
//! Fail-closed: a lookup error denies the job instead of crashing the worker.

use std::sync::Arc;

use talentbridge_core::UserId;
use talentbridge_notifications::NotificationType;
use tracing::warn;

use crate::repositories::AccountDirectory;

/// Why a job was not allowed through.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DenialReason {
    #[error("sender not found")]
    SenderNotFound,
    #[error("recipient not found")]
    RecipientNotFound,
    #[error("sender inactive")]
    SenderInactive,
    #[error("recipient inactive")]
    RecipientInactive,
    #[error("account lookup failed: {0}")]
    LookupFailed(String),
}

/// Result of a permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionCheck {
    Granted,
    Denied(DenialReason),
}

impl PermissionCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Granted)
    }

    pub fn reason(&self) -> Option<&DenialReason> {
        match self {
            Self::Granted => None,
            Self::Denied(reason) => Some(reason),
        }
    }
}

#[derive(Clone)]
pub struct PermissionValidator {
    accounts: Arc<dyn AccountDirectory>,
}

impl PermissionValidator {
    pub fn new(accounts: Arc<dyn AccountDirectory>) -> Self {
        Self { accounts }
    }

    /// Check both parties in one batched read.
    ///
    /// Soft-deleted accounts count as inactive. The sender is checked first.
    pub async fn validate(&self, sender: UserId, recipient: UserId, kind: &NotificationType) -> PermissionCheck {
        let ids: Vec<UserId> = if sender == recipient {
            vec![sender]
        } else {
            vec![sender, recipient]
        };

        let accounts = match self.accounts.find_accounts_by_ids(&ids).await {
            Ok(accounts) => accounts,
            Err(err) => {
                warn!(sender_id = %sender, recipient_id = %recipient, kind = %kind, error = %err, "account lookup failed");
                return PermissionCheck::Denied(DenialReason::LookupFailed(err.to_string()));
            }
        };

        let find = |id: UserId| accounts.iter().find(|a| a.id == id);

        match find(sender) {
            None => return PermissionCheck::Denied(DenialReason::SenderNotFound),
            Some(account) if !account.is_usable() => {
                return PermissionCheck::Denied(DenialReason::SenderInactive);
            }
            Some(_) => {}
        }

        match find(recipient) {
            None => PermissionCheck::Denied(DenialReason::RecipientNotFound),
            Some(account) if !account.is_usable() => PermissionCheck::Denied(DenialReason::RecipientInactive),
            Some(_) => PermissionCheck::Granted,
        }
    }
}
