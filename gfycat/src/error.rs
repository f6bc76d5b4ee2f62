//! Error types returned by the Gfycat client.

use crate::transport::Content;
use http::StatusCode;
use std::time::Duration;

/// Remote error code the token endpoint uses for a refresh token it no longer accepts.
pub const INVALID_REFRESH_TOKEN: &str = "InvalidRefreshToken";

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while talking to Gfycat.
///
/// The variants fall into three groups:
///
/// * usage errors ([`Error::TooManyTags`], [`Error::InvalidPageSize`], [`Error::UnknownSortField`])
///   are raised locally before any request is made;
/// * [`Error::Auth`] means the API rejected our credentials even after one refresh-and-retry;
/// * [`Error::Api`] is any other non-2xx response, with the remote payload kept verbatim.
///
/// The remaining variants wrap failures of the surrounding machinery (network, files, the
/// local authorization callback listener).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("too many tags: supplied {supplied}, max. {max}")]
    TooManyTags { supplied: usize, max: usize },

    #[error("number per request needs to be between {min} and {max}, got {requested}")]
    InvalidPageSize {
        requested: usize,
        min: usize,
        max: usize,
    },

    #[error("unknown sort field `{0}`")]
    UnknownSortField(String),

    #[error("the Gfycat API responded with a {status} / {}: {message}", .code.as_deref().unwrap_or("no code"))]
    Auth {
        status: StatusCode,
        /// Machine-readable cause, e.g. [`INVALID_REFRESH_TOKEN`], when the API sent one.
        code: Option<String>,
        message: String,
    },

    #[error("the Gfycat API responded with a {status}: {payload}")]
    Api { status: StatusCode, payload: Content },

    #[error("no refresh token is stored, the user has to authorize first")]
    MissingRefreshToken,

    #[error("no authorization code received within {0:?}")]
    AuthorizationTimeout(Duration),

    #[error("authorization callback failed: {0}")]
    Callback(String),

    #[error("unexpected response from {route}: {reason}")]
    UnexpectedResponse { route: String, reason: String },

    #[error("invalid URL `{url}`")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    #[error("malformed JSON")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True if the token endpoint told us the refresh token is no longer valid.
    ///
    /// This is the one failure [`crate::Client::authenticate`] recovers from by falling back to
    /// the interactive browser flow.
    pub fn is_invalid_refresh_token(&self) -> bool {
        matches!(self, Error::Auth { code: Some(code), .. } if code == INVALID_REFRESH_TOKEN)
    }

    /// The HTTP status of a remote failure, if this error came from one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Auth { status, .. } | Error::Api { status, .. } => Some(*status),
            Error::Http(e) => e.status(),
            _ => None,
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    /// Builds an [`Error::Auth`] from a rejected response.
    ///
    /// Gfycat reports authorization problems in two shapes: a top-level `message`, or an
    /// `errorMessage` object carrying `code` and `description`.
    pub(crate) fn auth(status: StatusCode, content: &Content) -> Self {
        let (code, message) = match content {
            Content::Json(body) => {
                if let Some(message) = body.get("message").and_then(|m| m.as_str()) {
                    (None, message.to_owned())
                } else if let Some(error) = body.get("errorMessage") {
                    match error.as_str() {
                        Some(message) => (None, message.to_owned()),
                        None => (
                            error
                                .get("code")
                                .and_then(|c| c.as_str())
                                .map(str::to_owned),
                            error
                                .get("description")
                                .and_then(|d| d.as_str())
                                .map_or_else(|| error.to_string(), str::to_owned),
                        ),
                    }
                } else {
                    (None, body.to_string())
                }
            }
            Content::Text(text) => (None, text.clone()),
        };
        Error::Auth {
            status,
            code,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn auth_error_from_error_message_object() {
        let content = Content::Json(json!({
            "errorMessage": {"code": "InvalidRefreshToken", "description": "refresh token expired"}
        }));
        let err = Error::auth(StatusCode::UNAUTHORIZED, &content);
        assert!(err.is_invalid_refresh_token());
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(
            err.to_string(),
            "the Gfycat API responded with a 401 Unauthorized / InvalidRefreshToken: refresh token expired"
        );
    }

    #[test]
    fn auth_error_from_top_level_message() {
        let content = Content::Json(json!({"message": "Unauthorized"}));
        let err = Error::auth(StatusCode::FORBIDDEN, &content);
        assert!(!err.is_invalid_refresh_token());
        match err {
            Error::Auth { code, message, .. } => {
                assert_eq!(code, None);
                assert_eq!(message, "Unauthorized");
            }
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[test]
    fn auth_error_from_text_body() {
        let err = Error::auth(StatusCode::UNAUTHORIZED, &Content::Text("nope".into()));
        assert!(matches!(err, Error::Auth { ref message, .. } if message == "nope"));
    }
}
