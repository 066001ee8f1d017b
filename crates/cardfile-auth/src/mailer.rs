//! Confirmation-mail dispatch capability.
//!
//! Delivery is external. Dispatch is fire-and-forget: implementations must
//! return promptly, must not fail the caller, and observe their own errors.
//! A failed dispatch never rolls back the signup that triggered it.

/// A confirmation email ready for dispatch.
#[derive(Debug, Clone)]
pub struct ConfirmationEmail {
    /// Recipient address.
    pub to: String,
    /// Recipient display name.
    pub username: String,
    /// Confirm-class token to embed in the confirmation link. Treated as a
    /// credential: implementations must not log it.
    pub token: String,
}

/// Dispatches confirmation emails.
pub trait ConfirmationMailer: Send + Sync {
    /// Queue a confirmation email. Must not block and must not fail the
    /// caller.
    fn send_confirmation(&self, message: ConfirmationEmail);
}

/// Dispatcher that records the event in the log stream.
///
/// Stands in for a real delivery pipeline in development and tests. The
/// token itself is deliberately absent from the log line.
#[derive(Debug, Clone, Default)]
pub struct TracingMailer;

impl TracingMailer {
    /// Create a new tracing-backed dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ConfirmationMailer for TracingMailer {
    fn send_confirmation(&self, message: ConfirmationEmail) {
        tracing::info!(
            to = %message.to,
            username = %message.username,
            "confirmation email queued"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_mailer_is_infallible() {
        let mailer = TracingMailer::new();
        mailer.send_confirmation(ConfirmationEmail {
            to: "alice@example.com".to_string(),
            username: "alice".to_string(),
            token: "token".to_string(),
        });
    }
}
