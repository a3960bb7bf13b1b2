//! Identity and privilege tier of the person chatting.
//!
//! The identity provider is an external collaborator. The session never reads
//! it directly; the caller resolves a [`Profile`] value and hands it to the
//! session at construction time or through `ChatSession::set_profile`.

use std::fmt;

use dhan_saathi_core::UserId;
use serde::{Deserialize, Serialize};

/// User id sent when the identity provider has not loaded a user yet.
pub const GUEST_USER_ID: &str = "guest";

/// Privilege tier, serialized as the request `mode` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeTier {
    /// Regular dashboard feature set.
    #[default]
    Normal,
    /// Premium "super" feature set.
    Super,
}

impl PrivilegeTier {
    /// Map the provider's boolean flag onto a tier.
    #[must_use]
    pub const fn from_super_flag(is_super: bool) -> Self {
        if is_super {
            Self::Super
        } else {
            Self::Normal
        }
    }

    /// Wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Super => "super",
        }
    }
}

impl fmt::Display for PrivilegeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load state of the current user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserState {
    /// The provider is still resolving the session.
    Loading,
    /// Nobody is signed in.
    SignedOut,
    /// A user is signed in.
    Loaded(UserId),
}

/// The identity-provider collaborator.
pub trait IdentityProvider {
    /// Current user and whether it has finished loading.
    fn user(&self) -> UserState;

    /// Whether the user has the super privilege tier.
    fn is_super(&self) -> bool;

    /// Snapshot both answers into a [`Profile`].
    fn profile(&self) -> Profile {
        let user_id = match self.user() {
            UserState::Loaded(id) => Some(id),
            UserState::Loading | UserState::SignedOut => None,
        };
        Profile {
            user_id,
            tier: PrivilegeTier::from_super_flag(self.is_super()),
        }
    }
}

/// Identity values injected into the session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Profile {
    /// Signed-in user, if loaded.
    pub user_id: Option<UserId>,
    /// Privilege tier used for the request `mode`.
    pub tier: PrivilegeTier,
}

impl Profile {
    /// Create a profile.
    #[must_use]
    pub const fn new(user_id: Option<UserId>, tier: PrivilegeTier) -> Self {
        Self { user_id, tier }
    }

    /// User id to put on the wire, falling back to [`GUEST_USER_ID`].
    #[must_use]
    pub fn wire_user_id(&self) -> &str {
        self.user_id.as_ref().map_or(GUEST_USER_ID, UserId::as_str)
    }
}

/// An [`IdentityProvider`] with fixed answers, used by the terminal front-end.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    user: UserState,
    is_super: bool,
}

impl StaticIdentity {
    /// Create a provider that always reports the given answers.
    #[must_use]
    pub const fn new(user: UserState, is_super: bool) -> Self {
        Self { user, is_super }
    }
}

impl IdentityProvider for StaticIdentity {
    fn user(&self) -> UserState {
        self.user.clone()
    }

    fn is_super(&self) -> bool {
        self.is_super
    }
}
