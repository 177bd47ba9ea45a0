//! Engine client error types and the failure policy
//!
//! Every failed request is classified once, in a fixed priority order:
//! `401` first, then `5xx`, then any response carrying a structured
//! `message`, then everything else. The class decides which notification the
//! operator sees.

use serde_json::Value;
use thiserror::Error;

use crate::domain::ValidationError;
use crate::notify::Notification;

/// Toast text for `5xx` responses
pub const SERVER_ERROR_MESSAGE: &str = "Server error occurred. Please try again later.";

/// Toast text when nothing more specific is known
pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred.";

/// Errors that can occur talking to the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// `401`; `reauth` is true when this request sends the operator to log in
    #[error("Unauthorized: log in again")]
    Unauthorized { reauth: bool },

    #[error("{resource} not found")]
    NotFound { resource: String, message: Option<String> },

    #[error("Server error {status}")]
    Server { status: u16 },

    #[error("Request rejected ({status}): {}", .message.as_deref().unwrap_or("no message"))]
    Rejected { status: u16, message: Option<String> },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Realtime channel error: {0}")]
    Realtime(String),
}

impl EngineError {
    /// Build the error for a non-success response
    ///
    /// `reauth` says whether the session asked for a login because of it;
    /// only meaningful for `401`.
    pub fn from_response(status: u16, body: &[u8], resource: &str, reauth: bool) -> Self {
        match classify_failure(Some(status), body) {
            FailureClass::Unauthorized => Self::Unauthorized { reauth },
            FailureClass::Server => Self::Server { status },
            class => {
                let message = match class {
                    FailureClass::Message(message) => Some(message),
                    _ => None,
                };
                if status == 404 {
                    Self::NotFound {
                        resource: resource.to_string(),
                        message,
                    }
                } else {
                    Self::Rejected { status, message }
                }
            }
        }
    }

    /// Policy class of this error
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Unauthorized { .. } => FailureClass::Unauthorized,
            Self::Server { .. } => FailureClass::Server,
            Self::NotFound {
                message: Some(message), ..
            }
            | Self::Rejected {
                message: Some(message), ..
            } => FailureClass::Message(message.clone()),
            Self::NotFound { .. }
            | Self::Rejected { .. }
            | Self::Network(_)
            | Self::Decode(_)
            | Self::Validation(_)
            | Self::Realtime(_) => FailureClass::Generic,
        }
    }

    /// The one notification this failure produces, if any
    ///
    /// A `401` that did not ask for a login (an already-queued response
    /// carrying a revoked token, or a login already requested) stays silent. Validation failures are shown
    /// by the plan browser as a display error instead of a toast.
    pub fn notification(&self) -> Option<Notification> {
        match self {
            Self::Unauthorized { reauth: false } | Self::Validation(_) => None,
            Self::Unauthorized { reauth: true } => Some(Notification::reauth_required()),
            other => Some(Notification::request_failed(other.class().message())),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Worth trying again later without operator action
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Server { .. } | Self::Network(_) | Self::Realtime(_) => true,
            Self::Unauthorized { .. }
            | Self::NotFound { .. }
            | Self::Rejected { .. }
            | Self::Decode(_)
            | Self::Validation(_) => false,
        }
    }
}

/// The four mutually exclusive failure outcomes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureClass {
    Unauthorized,
    Server,
    Message(String),
    Generic,
}

impl FailureClass {
    /// Operator-facing text
    pub fn message(&self) -> String {
        match self {
            Self::Unauthorized => "Session expired. Please log in again.".to_string(),
            Self::Server => SERVER_ERROR_MESSAGE.to_string(),
            Self::Message(message) => message.clone(),
            Self::Generic => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }
}

/// Classify a failed request
///
/// `status` is `None` when no response arrived.
pub fn classify_failure(status: Option<u16>, body: &[u8]) -> FailureClass {
    match status {
        Some(401) => FailureClass::Unauthorized,
        Some(s) if s >= 500 => FailureClass::Server,
        Some(_) => match structured_message(body) {
            Some(message) => FailureClass::Message(message),
            None => FailureClass::Generic,
        },
        None => FailureClass::Generic,
    }
}

/// Non-empty `message` field of a JSON body
pub fn structured_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    match value.get("message")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationKind;

    #[test]
    fn test_classify_priority() {
        let with_message = br#"{"message":"Plan is locked"}"#;

        assert_eq!(classify_failure(Some(401), with_message), FailureClass::Unauthorized);
        assert_eq!(classify_failure(Some(503), with_message), FailureClass::Server);
        assert_eq!(
            classify_failure(Some(409), with_message),
            FailureClass::Message("Plan is locked".to_string())
        );
        assert_eq!(classify_failure(Some(400), b"not json"), FailureClass::Generic);
        assert_eq!(classify_failure(None, with_message), FailureClass::Generic);
    }

    #[test]
    fn test_structured_message_ignores_blank_and_non_string() {
        assert_eq!(structured_message(br#"{"message":"  "}"#), None);
        assert_eq!(structured_message(br#"{"message":42}"#), None);
        assert_eq!(structured_message(br#"{"error":"x"}"#), None);
    }

    #[test]
    fn test_from_response_not_found() {
        let err = EngineError::from_response(404, br#"{"message":"no such plan"}"#, "plan P9", false);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "plan P9 not found");
        assert_eq!(err.class(), FailureClass::Message("no such plan".to_string()));

        let err = EngineError::from_response(404, b"", "plan P9", false);
        assert_eq!(err.class(), FailureClass::Generic);
    }

    #[test]
    fn test_from_response_server_beats_message() {
        let err = EngineError::from_response(500, br#"{"message":"NPE at line 3"}"#, "plans", false);
        assert!(matches!(err, EngineError::Server { status: 500 }));
        let n = err.notification().unwrap();
        assert_eq!(n.message, SERVER_ERROR_MESSAGE);
    }

    #[test]
    fn test_unauthorized_notifies_only_when_cleared() {
        let first = EngineError::from_response(401, b"", "plans", true);
        let queued = EngineError::from_response(401, b"", "plans", false);

        assert_eq!(first.notification().unwrap().kind, NotificationKind::ReauthRequired);
        assert!(queued.notification().is_none());
    }

    #[test]
    fn test_rejected_generic_message() {
        let err = EngineError::from_response(400, b"", "execute", false);
        assert_eq!(err.notification().unwrap().message, GENERIC_ERROR_MESSAGE);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_validation_is_silent() {
        let err = EngineError::from(ValidationError::single("planId", "must not be empty"));
        assert!(err.notification().is_none());
    }
}
