//! Delivery channels and per-user channel preferences.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use talentbridge_core::{DomainError, UserId};

use crate::payload::NotificationType;

/// A delivery medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    InApp,
    Socket,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::InApp => "in_app",
            Self::Socket => "socket",
        }
    }
}

impl core::fmt::Display for Channel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "in_app" => Ok(Self::InApp),
            "socket" => Ok(Self::Socket),
            other => Err(DomainError::validation(format!("unknown channel: {other}"))),
        }
    }
}

/// Channel enablement for one (user, notification type) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preference {
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub email: bool,
    pub in_app: bool,
    /// Master switch; when off the row is ignored and defaults apply.
    pub enabled: bool,
}

/// Channels used when no usable preference exists.
pub const DEFAULT_CHANNELS: [Channel; 1] = [Channel::InApp];

/// Channel set for a stored preference row (or its absence).
///
/// - no row, or row disabled: in-app only
/// - otherwise: exactly the flagged channels (possibly none)
pub fn resolve_channels(preference: Option<&Preference>) -> Vec<Channel> {
    match preference {
        Some(p) if p.enabled => {
            let mut channels = Vec::with_capacity(2);
            if p.email {
                channels.push(Channel::Email);
            }
            if p.in_app {
                channels.push(Channel::InApp);
            }
            channels
        }
        _ => DEFAULT_CHANNELS.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pref(email: bool, in_app: bool, enabled: bool) -> Preference {
        Preference {
            user_id: UserId::new(),
            kind: NotificationType::new("connect_request"),
            email,
            in_app,
            enabled,
        }
    }

    #[test]
    fn missing_preference_defaults_to_in_app_only() {
        assert_eq!(resolve_channels(None), vec![Channel::InApp]);
    }

    #[test]
    fn disabled_row_falls_back_to_default() {
        assert_eq!(resolve_channels(Some(&pref(true, false, false))), vec![Channel::InApp]);
    }

    #[test]
    fn flags_select_channels() {
        assert_eq!(
            resolve_channels(Some(&pref(true, true, true))),
            vec![Channel::Email, Channel::InApp]
        );
        assert_eq!(resolve_channels(Some(&pref(true, false, true))), vec![Channel::Email]);
    }

    #[test]
    fn all_false_row_opts_out_entirely() {
        assert!(resolve_channels(Some(&pref(false, false, true))).is_empty());
    }

    #[test]
    fn channel_tags_parse() {
        assert_eq!("in_app".parse::<Channel>().unwrap(), Channel::InApp);
        assert!("sms".parse::<Channel>().is_err());
    }
}
