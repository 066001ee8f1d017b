//! Role ladder and per-operation requirements.
//!
//! Roles are a closed set with no inheritance; ladder semantics live in the
//! [`RoleRequirement`] sets that operations register, not in the type.

use serde::{Deserialize, Serialize};

use crate::AuthError;

/// Account role for access control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full administrative access.
    Admin,
    /// Can manage shared data but not destroy it.
    Moderator,
    /// Regular account holder.
    #[default]
    User,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Moderator => write!(f, "moderator"),
            Self::User => write!(f, "user"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "moderator" => Ok(Self::Moderator),
            "user" => Ok(Self::User),
            _ => Err(AuthError::Config(format!("Unknown role: {s}"))),
        }
    }
}

/// The set of roles permitted to invoke an operation.
///
/// Attached to each operation at registration time and consulted per
/// request by [`authorize`]; stateless, no caching.
#[derive(Debug, Clone, Copy)]
pub struct RoleRequirement {
    allowed: &'static [Role],
}

impl RoleRequirement {
    /// Define a requirement from a static set of permitted roles.
    #[must_use]
    pub const fn new(allowed: &'static [Role]) -> Self {
        Self { allowed }
    }

    /// Whether the given role is a member of the permitted set.
    #[must_use]
    pub fn permits(&self, role: Role) -> bool {
        self.allowed.contains(&role)
    }
}

/// Check a caller's role against an operation's requirement.
///
/// Denial is `Forbidden` — deliberately distinct from `Unauthenticated`,
/// so callers can tell "not logged in" from "logged in but not permitted".
///
/// # Errors
///
/// Returns `AuthError::Forbidden` when the role is not in the set.
pub fn authorize(requirement: &RoleRequirement, role: Role) -> Result<(), AuthError> {
    if requirement.permits(role) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}
