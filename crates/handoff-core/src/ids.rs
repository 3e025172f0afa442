//! Channel identifiers and participant identity.
//!
//! A [`ChannelId`] is the stable key for one conversation. Authenticated
//! participants get `user-{identityId}-{instanceNonce}` so that every client
//! instance owns its own room; anonymous visitors get `guest-{nonce}` where
//! the nonce is persisted across visits.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::constants::DEFAULT_DISPLAY_NAME;

/// Generate a fresh random nonce for channel identifiers.
pub fn new_nonce() -> String {
    Uuid::new_v4().to_string()
}

const USER_PREFIX: &str = "user-";
const GUEST_PREFIX: &str = "guest-";

/// Stable key identifying one conversational channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Channel for an authenticated identity on one client instance.
    #[must_use]
    pub fn for_user(identity_id: &str, instance_nonce: &str) -> Self {
        Self(format!("{USER_PREFIX}{identity_id}-{instance_nonce}"))
    }

    /// Channel for an anonymous visitor with a persisted nonce.
    #[must_use]
    pub fn for_guest(nonce: &str) -> Self {
        Self(format!("{GUEST_PREFIX}{nonce}"))
    }

    /// Wrap an existing identifier verbatim.
    #[must_use]
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this channel belongs to an anonymous visitor.
    pub fn is_guest(&self) -> bool {
        self.0.starts_with(GUEST_PREFIX)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ChannelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// An authenticated end user. Required to request a human handoff.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Account identifier assigned by the identity provider.
    pub user_id: String,
    /// Display name shown to agents.
    pub name: Option<String>,
    /// Short nickname shown to agents.
    pub nickname: Option<String>,
}

impl Participant {
    /// Participant with only an account id.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: None,
            nickname: None,
        }
    }

    /// Participant whose name and nickname are the local part of `email`.
    pub fn from_email(user_id: impl Into<String>, email: &str) -> Self {
        let local = email.split('@').next().map(str::trim).unwrap_or_default();
        let local = (!local.is_empty()).then(|| local.to_string());
        Self {
            user_id: user_id.into(),
            name: local.clone(),
            nickname: local,
        }
    }

    /// Name for outbound frames, falling back to a generic label.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_DISPLAY_NAME)
    }

    /// Nickname for outbound frames, falling back to the display name.
    pub fn display_nickname(&self) -> &str {
        self.nickname.as_deref().unwrap_or_else(|| self.display_name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
