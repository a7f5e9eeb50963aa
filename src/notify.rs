//! Escalation notification capability.
//!
//! The agent receives a notifier at construction time; there is no global
//! client. Alerts are built from qualitative labels only and render through
//! [`sanitize_for_sms`], so a notifier never sees raw sensor values.

use serde::{Deserialize, Serialize};

use crate::agent::HypothesisKind;
use crate::error::TransportError;
use crate::guardrails::{sanitize_for_sms, scrub_label};

/// Qualitative escalation alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationAlert {
    /// Qualitative symptom label, e.g. "Low heart rate variability".
    pub symptom_label: String,
    /// Qualitative reason.
    pub reason: String,
    /// Likely cause, if one was concluded.
    pub conclusion: Option<HypothesisKind>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

impl EscalationAlert {
    /// Alert raised when HRV falls below the safety threshold.
    #[must_use]
    pub fn rest_intervention() -> Self {
        Self {
            symptom_label: "Low heart rate variability".to_string(),
            reason: "Immediate rest intervention recommended".to_string(),
            conclusion: None,
            confidence: 1.0,
        }
    }

    /// Privacy-safe message body.
    #[must_use]
    pub fn render(&self) -> String {
        sanitize_for_sms(&self.symptom_label, self.conclusion, self.confidence)
    }

    /// Reason text with numeric tokens removed.
    #[must_use]
    pub fn sanitized_reason(&self) -> String {
        scrub_label(&self.reason)
    }
}

/// Outcome of a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Accepted by the provider.
    Sent,
    /// Not delivered; see the receipt reason.
    Rejected,
}

/// Receipt returned by a notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReceipt {
    /// Whether the alert went out.
    pub status: DispatchStatus,

    /// Provider message ID when sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Why the alert was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DispatchReceipt {
    /// Receipt for an alert the provider accepted.
    #[must_use]
    pub fn sent(id: impl Into<String>) -> Self {
        Self {
            status: DispatchStatus::Sent,
            id: Some(id.into()),
            reason: None,
        }
    }

    /// Receipt for an alert that was not delivered.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            status: DispatchStatus::Rejected,
            id: None,
            reason: Some(reason.into()),
        }
    }

    /// True for a [`DispatchStatus::Sent`] receipt.
    #[must_use]
    pub fn is_sent(&self) -> bool {
        self.status == DispatchStatus::Sent
    }
}

/// Outbound escalation channel (SMS, push, pager).
pub trait EscalationNotifier: Send + Sync {
    /// Returns false when the channel lacks credentials or a recipient.
    fn is_configured(&self) -> bool;

    /// Send an alert.
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` when the provider cannot be reached.
    fn send(&self, alert: &EscalationAlert) -> Result<DispatchReceipt, TransportError>;
}

/// Notifier for deployments without an escalation channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledNotifier;

impl EscalationNotifier for DisabledNotifier {
    fn is_configured(&self) -> bool {
        false
    }

    fn send(&self, _alert: &EscalationAlert) -> Result<DispatchReceipt, TransportError> {
        Ok(DispatchReceipt::rejected("escalation channel not configured"))
    }
}
