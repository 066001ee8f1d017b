//! # Cardfile Core
//!
//! Core types, configuration, and validation for Cardfile.
//!
//! This crate provides:
//! - Configuration loading and validation (JSON5 format)
//! - Identifier newtypes shared across crates
//! - Input validation and sanitization for user-supplied fields

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod types;
pub mod validation;

pub use config::{Config, ConfigError};
pub use types::{AccountId, ContactId};
pub use validation::{ValidationError, normalize_email, sanitize_display_name};
