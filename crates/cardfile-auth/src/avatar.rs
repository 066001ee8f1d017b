//! Avatar lookup capability.
//!
//! Image hosting is external; the identity layer only derives a stable URL
//! for an account at signup time.

use md5::{Digest, Md5};

/// Derives an avatar URL from an account email.
pub trait AvatarLookup: Send + Sync {
    /// Stable image URL for the given email.
    fn image_url_for(&self, email: &str) -> String;
}

/// Gravatar-style lookup: MD5 of the trimmed, lowercased email.
#[derive(Debug, Clone)]
pub struct Gravatar {
    base_url: String,
}

impl Gravatar {
    /// Lookup against the public Gravatar endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_url: "https://www.gravatar.com/avatar".to_string(),
        }
    }

    /// Lookup against a custom endpoint (self-hosted mirrors).
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for Gravatar {
    fn default() -> Self {
        Self::new()
    }
}

impl AvatarLookup for Gravatar {
    fn image_url_for(&self, email: &str) -> String {
        let mut hasher = Md5::new();
        hasher.update(email.trim().to_lowercase().as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("{}/{digest}", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_uses_md5_of_normalized_email() {
        let gravatar = Gravatar::new();
        // Well-known reference digest for "alice@example.com".
        let url = gravatar.image_url_for("  Alice@Example.COM ");
        assert_eq!(url, gravatar.image_url_for("alice@example.com"));
        assert!(url.starts_with("https://www.gravatar.com/avatar/"));
        assert_eq!(url.rsplit('/').next().unwrap().len(), 32);
    }

    #[test]
    fn custom_base_url() {
        let gravatar = Gravatar::with_base_url("https://avatars.internal");
        let url = gravatar.image_url_for("bob@example.com");
        assert!(url.starts_with("https://avatars.internal/"));
    }
}
