//! Unified error type.

use std::fmt;

/// The error type returned by strand's fallible operations.
///
/// Application-level outcomes (404, 405, etc.) are expressed as HTTP
/// responses, not as `Error`s. This type surfaces the failures a caller can
/// actually act on: binding or accepting on the socket, serializing response
/// data, and the outbound client helpers.
///
/// Template failures never appear here — [`Context::render_files`]
/// (crate::Context::render_files) and friends degrade to inline error text
/// in the response body instead.
#[derive(Debug)]
pub enum Error {
    /// Socket, file, or compression I/O failed.
    Io(std::io::Error),
    /// Response data could not be serialized to JSON. Nothing was written.
    Json(serde_json::Error),
    /// An outbound GET helper failed.
    Http(reqwest::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Json(e) => write!(f, "json: {e}"),
            Self::Http(e) => write!(f, "http: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Http(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}
