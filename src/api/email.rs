//! Outbound email abstraction.
//!
//! Registration hands the verification link to an `EmailSender` on a spawned
//! task: delivery is best-effort, and a failing sender never rolls back or
//! fails the request that triggered it. The default sender for local dev is
//! `LogEmailSender`, which logs the payload and returns `Ok(())`; an SMTP or
//! API-backed sender implements the same trait.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone, Debug)]
pub struct VerificationEmail {
    pub to_email: String,
    pub verify_url: String,
}

/// Email delivery abstraction.
pub trait EmailSender: Send + Sync {
    /// Deliver a verification message or return an error to be logged.
    fn send_verification(&self, message: &VerificationEmail) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send_verification(&self, message: &VerificationEmail) -> Result<()> {
        info!(
            to_email = %message.to_email,
            verify_url = %message.verify_url,
            "verification email send stub"
        );
        Ok(())
    }
}

/// Fire-and-forget dispatch; failures are logged and never surfaced.
pub fn dispatch_verification_email(sender: Arc<dyn EmailSender>, message: VerificationEmail) {
    tokio::spawn(async move {
        if let Err(err) = sender.send_verification(&message) {
            error!(
                to_email = %message.to_email,
                "failed to send verification email: {err}"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_sender_always_succeeds() {
        let sender = LogEmailSender;
        let message = VerificationEmail {
            to_email: "user@example.com".to_string(),
            verify_url: "http://localhost:3000/verify-email?token=abc".to_string(),
        };
        assert!(sender.send_verification(&message).is_ok());
    }

    #[tokio::test]
    async fn dispatch_swallows_sender_failures() {
        struct FailingSender;
        impl EmailSender for FailingSender {
            fn send_verification(&self, _message: &VerificationEmail) -> Result<()> {
                Err(anyhow::anyhow!("smtp unreachable"))
            }
        }

        // Must not panic or propagate.
        dispatch_verification_email(
            Arc::new(FailingSender),
            VerificationEmail {
                to_email: "user@example.com".to_string(),
                verify_url: "http://localhost:3000/verify-email?token=abc".to_string(),
            },
        );
        tokio::task::yield_now().await;
    }
}
