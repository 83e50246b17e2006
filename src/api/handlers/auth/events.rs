//! Structured security events.
//!
//! Events are write-only audit records: every security-relevant action emits
//! one, the sink serializes it, and nothing in the core ever reads them back.
//! Emission must never fail or block a request, so sink errors are swallowed
//! after logging.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    Registration,
    AuthSuccess,
    AuthFailure,
    AccountLockout,
    RateLimitExceeded,
    EmailVerified,
    UserAction,
    AccountDeletion,
    AdminUserCreation,
    AdminUserUpdate,
    AdminUserActivation,
    AdminUserDeactivation,
    AdminUserDeletion,
}

#[derive(Clone, Debug, Serialize)]
pub struct SecurityEvent {
    pub event_type: SecurityEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    #[must_use]
    pub fn new(event_type: SecurityEventType, success: bool) -> Self {
        Self {
            event_type,
            user_id: None,
            email: None,
            ip_address: None,
            user_agent: None,
            endpoint: None,
            success,
            details: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_ip_address(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint;
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Write-only sink for security events; `emit` must never fail the caller.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &SecurityEvent);
}

/// Default sink: one JSON line per event through `tracing`.
///
/// Successes log at info as `SECURITY_EVENT`, failures at warn as
/// `SECURITY_ALERT`, so alerting can key off the level or the prefix.
#[derive(Clone, Debug)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &SecurityEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                error!("failed to serialize security event: {err}");
                return;
            }
        };

        if event.success {
            info!("SECURITY_EVENT: {payload}");
        } else {
            warn!("SECURITY_ALERT: {payload}");
        }
    }
}

/// Test sink that records every emitted event.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: std::sync::Mutex<Vec<SecurityEvent>>,
}

#[cfg(test)]
impl RecordingEventSink {
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn event_types(&self) -> Vec<SecurityEventType> {
        self.events()
            .into_iter()
            .map(|event| event.event_type)
            .collect()
    }
}

#[cfg(test)]
impl EventSink for RecordingEventSink {
    fn emit(&self, event: &SecurityEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
