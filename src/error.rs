//! Crate-wide error type.
//!
//! Mirrors the taxonomy in the design: validation failures are raised before
//! any network I/O, `NotInitialized` gates tool calls ahead of readiness,
//! and `Auth`/`Transport`/`Upstream` are the shapes the gateway can return
//! after exhausting retries.

use serde_json::Value;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    NotInitialized(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("salesforce returned an error: {0}")]
    Upstream(String),

    #[error("cli invocation failed: {0}")]
    Cli(String),

    #[error("operation cancelled by user")]
    UserCancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn internal(msg: impl std::fmt::Display) -> Self {
        Error::Internal(msg.to_string())
    }

    /// Stable tag used in logs and in `structuredContent.error`.
    pub fn tag(&self) -> &'static str {
        match self {
            Error::Validation(_) => "ValidationError",
            Error::NotInitialized(_) => "NotInitialized",
            Error::Auth(_) => "AuthError",
            Error::Transport(_) => "TransportError",
            Error::Upstream(_) => "UpstreamError",
            Error::Cli(_) => "CliError",
            Error::UserCancelled => "UserCancelled",
            Error::Internal(_) => "InternalError",
        }
    }

    /// Render as the `{error, message}` structured body used by the
    /// dispatcher's failure envelope.
    pub fn to_structured(&self) -> Value {
        serde_json::json!({
            "error": self.tag(),
            "message": self.to_string(),
        })
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            Error::Transport(e.to_string())
        } else {
            Error::Upstream(e.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Validation(format!("invalid JSON: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_stable() {
        assert_eq!(Error::Validation("x".into()).tag(), "ValidationError");
        assert_eq!(Error::UserCancelled.tag(), "UserCancelled");
    }

    #[test]
    fn structured_shape() {
        let e = Error::Upstream("boom".into());
        let v = e.to_structured();
        assert_eq!(v["error"], "UpstreamError");
        assert_eq!(v["message"], "salesforce returned an error: boom");
    }
}
