//! Errors raised by middleware and handlers.
//!
//! A pipeline step fails by returning [`Error`]. Which variant it lands in is
//! decided when the value is built, not by inspecting it later:
//!
//! ```text
//! Err(RouteError::forbidden("not yours"))?   → Error::Handled    → 403 {message, type}
//! Err(io_error)?                             → Error::Unhandled  → 500, failure hook
//! panic!("…")                                → Error::Unhandled  → 500, failure hook
//! ```
//!
//! [`Error`] deliberately does not implement [`std::error::Error`]; that is
//! what lets the blanket `From<E: std::error::Error>` coexist with
//! `From<RouteError>`.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;

use http::StatusCode;
use serde::Serialize;

use crate::pipeline::InputClass;
use crate::schema::Issue;

/// A boxed, thread-safe error. The payload of an unhandled failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ── RouteError ────────────────────────────────────────────────────────────────

/// An intentional, client-facing failure with an explicit status, a short
/// machine-readable `type` and a human-readable message.
///
/// Serialized verbatim as `{"message": …, "type": …}` with [`status`] as the
/// HTTP status. Validation failures additionally carry `"issues"`.
///
/// [`status`]: RouteError::status
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RouteError {
    #[serde(skip)]
    status: StatusCode,
    message: String,
    #[serde(rename = "type")]
    kind: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    issues: Option<Vec<Issue>>,
}

impl RouteError {
    pub fn new(
        status: StatusCode,
        kind: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
    ) -> Self {
        Self { status, message: message.into(), kind: kind.into(), issues: None }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }

    /// The 400 produced when the input for `class` fails its schema.
    pub(crate) fn validation(class: InputClass, issues: Vec<Issue>) -> Self {
        Self {
            issues: Some(issues),
            ..Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", class.invalid_message())
        }
    }

    /// The fixed body sent for every unhandled failure. The real cause never
    /// leaves the process.
    pub(crate) fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Internal server error",
        )
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn kind(&self) -> &str { &self.kind }
    pub fn message(&self) -> &str { &self.message }

    /// Schema issues, present only on validation failures.
    pub fn issues(&self) -> Option<&[Issue]> { self.issues.as_deref() }
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.status.as_u16(), self.kind, self.message)
    }
}

// ── Error ─────────────────────────────────────────────────────────────────────

/// The failure type of every middleware and handler.
#[derive(Debug)]
pub enum Error {
    /// Sent to the client as-is. Never reported to the failure hook.
    Handled(RouteError),
    /// Replaced by a generic 500. Reported to the failure hook.
    Unhandled(BoxError),
}

impl Error {
    /// Wraps anything convertible into a [`BoxError`], including `&str`,
    /// `String` and `Box<dyn Error>`, as an unhandled failure.
    pub fn unhandled(error: impl Into<BoxError>) -> Self {
        Self::Unhandled(error.into())
    }

    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }
}

impl From<RouteError> for Error {
    fn from(e: RouteError) -> Self {
        Self::Handled(e)
    }
}

impl<E> From<E> for Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(e: E) -> Self {
        Self::Unhandled(Box::new(e))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handled(e) => write!(f, "handled: {e}"),
            Self::Unhandled(e) => write!(f, "unhandled: {e}"),
        }
    }
}

// ── Panicked ──────────────────────────────────────────────────────────────────

/// A middleware or handler panicked. Surfaces as an unhandled failure.
#[derive(Debug, thiserror::Error)]
#[error("pipeline step panicked: {message}")]
pub struct Panicked {
    message: String,
}

impl Panicked {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(s) => *s,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(s) => (*s).to_owned(),
                Err(_) => "non-string panic payload".to_owned(),
            },
        };
        Self { message }
    }

    pub fn message(&self) -> &str { &self.message }
}
