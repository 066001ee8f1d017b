//! Role requirements for the contact operations.
//!
//! Registered once here, consulted per request by the shared authorizer.
//! The ladder is deliberate: destructive operations admit strictly fewer,
//! higher-trust roles.

use cardfile_auth::{Role, RoleRequirement};

/// List, get, search, and birthday queries.
pub const READ: RoleRequirement =
    RoleRequirement::new(&[Role::Admin, Role::Moderator, Role::User]);

/// Contact creation.
pub const CREATE: RoleRequirement =
    RoleRequirement::new(&[Role::Admin, Role::Moderator, Role::User]);

/// Contact updates.
pub const UPDATE: RoleRequirement = RoleRequirement::new(&[Role::Admin, Role::Moderator]);

/// Contact removal.
pub const REMOVE: RoleRequirement = RoleRequirement::new(&[Role::Admin]);
