//! Contact records for Cardfile.
//!
//! Contacts are plain keyed records, each owned by exactly one account.
//! Every query is scoped to the owning account; the store interface takes
//! the owner on every call, so cross-account reads are structurally
//! impossible.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod contact;
pub mod policy;
pub mod store;

pub use contact::{Contact, ContactDraft, SearchFilter, birthday_in_window};
pub use store::{ContactError, ContactStore, MemoryContactStore};
