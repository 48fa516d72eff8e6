//! Security audit events.
//!
//! Realm lifecycle changes and authentication outcomes are recorded as
//! [`SecurityEvent`]s and emitted through `tracing` under the
//! `security_audit` target, so hosts route them with their subscriber
//! configuration.
//!
//! Every event carries an id, a UTC timestamp, the event type, the outcome,
//! and the realm and principal when known.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// A realm was validated, built and published in the registry.
    RealmActivated,
    /// A realm was withdrawn from the registry.
    RealmRemoved,
    /// A configuration change was rejected as a whole.
    ConfigurationRejected,
    /// A change was accepted but only takes effect after a reload.
    ReloadRequired,
    /// Credentials were verified.
    AuthenticationSucceeded,
    /// Credentials were rejected or could not be checked.
    AuthenticationFailed,
}

/// Outcome of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Failure,
}

/// A security event for audit logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// Unique event identifier.
    pub id: Uuid,
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,
    /// Type of event.
    pub event_type: EventType,
    /// Outcome of the event.
    pub outcome: EventOutcome,
    /// Realm the event concerns.
    pub realm: Option<String>,
    /// Principal name, for authentication events.
    pub principal: Option<String>,
    /// Error message for failure events.
    pub error: Option<String>,
    /// Additional details as key-value pairs.
    pub details: Vec<(String, String)>,
}

impl SecurityEvent {
    /// Creates a new event builder.
    #[must_use]
    pub const fn builder(event_type: EventType) -> EventBuilder {
        EventBuilder::new(event_type)
    }

    /// Writes the event to the `security_audit` tracing target.
    pub fn emit(&self) {
        let details = self
            .details
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");

        match self.outcome {
            EventOutcome::Success => tracing::info!(
                target: "security_audit",
                event_id = %self.id,
                event_type = ?self.event_type,
                realm = self.realm.as_deref().unwrap_or("-"),
                principal = self.principal.as_deref().unwrap_or("-"),
                details = %details,
                "security event"
            ),
            EventOutcome::Failure => tracing::warn!(
                target: "security_audit",
                event_id = %self.id,
                event_type = ?self.event_type,
                realm = self.realm.as_deref().unwrap_or("-"),
                principal = self.principal.as_deref().unwrap_or("-"),
                error = self.error.as_deref().unwrap_or("-"),
                details = %details,
                "security event"
            ),
        }
    }
}

/// Builder for creating events.
#[derive(Debug)]
pub struct EventBuilder {
    event_type: EventType,
    outcome: EventOutcome,
    realm: Option<String>,
    principal: Option<String>,
    error: Option<String>,
    details: Vec<(String, String)>,
}

impl EventBuilder {
    /// Creates a new event builder.
    #[must_use]
    pub const fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            outcome: EventOutcome::Success,
            realm: None,
            principal: None,
            error: None,
            details: Vec::new(),
        }
    }

    /// Sets the outcome to failure with an error message.
    #[must_use]
    pub fn failure(mut self, error: impl Into<String>) -> Self {
        self.outcome = EventOutcome::Failure;
        self.error = Some(error.into());
        self
    }

    /// Sets the realm name.
    #[must_use]
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Sets the principal name.
    #[must_use]
    pub fn principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// Adds a detail key-value pair.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.push((key.into(), value.into()));
        self
    }

    /// Builds the event.
    #[must_use]
    pub fn build(self) -> SecurityEvent {
        SecurityEvent {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            event_type: self.event_type,
            outcome: self.outcome,
            realm: self.realm,
            principal: self.principal,
            error: self.error,
            details: self.details,
        }
    }

    /// Builds and emits the event.
    pub fn emit(self) {
        self.build().emit();
    }
}
