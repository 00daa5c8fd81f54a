//! Channel selection from stored preferences, with a safe fallback.

use std::sync::Arc;

use talentbridge_core::UserId;
use talentbridge_notifications::preference::DEFAULT_CHANNELS;
use talentbridge_notifications::{Channel, NotificationType, Preference, resolve_channels};
use tracing::warn;

use crate::repositories::PreferenceStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPreferences {
    pub enabled_channels: Vec<Channel>,
    /// The stored row, if one exists for the type.
    pub raw: Option<Preference>,
}

#[derive(Clone)]
pub struct PreferenceResolver {
    preferences: Arc<dyn PreferenceStore>,
}

impl PreferenceResolver {
    pub fn new(preferences: Arc<dyn PreferenceStore>) -> Self {
        Self { preferences }
    }

    /// Resolve channels for `(user_id, kind)`. Lookup failures fall back to
    /// the default (in-app only) rather than blocking the pipeline.
    pub async fn resolve(&self, user_id: UserId, kind: &NotificationType) -> ResolvedPreferences {
        match self.preferences.find_preferences(user_id).await {
            Ok(rows) => {
                let raw = rows.into_iter().find(|p| &p.kind == kind);
                ResolvedPreferences {
                    enabled_channels: resolve_channels(raw.as_ref()),
                    raw,
                }
            }
            Err(err) => {
                warn!(user_id = %user_id, kind = %kind, error = %err, "preference lookup failed, using defaults");
                ResolvedPreferences {
                    enabled_channels: DEFAULT_CHANNELS.to_vec(),
                    raw: None,
                }
            }
        }
    }
}
