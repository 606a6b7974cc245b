//! Error types for the protocol client.
//!
//! # Design
//! Status errors carry only the extracted message and the HTTP status, so
//! `Display` on them is exactly the server's message. Transport failures are
//! wrapped in `TransportError`, which forwards display and source to the
//! underlying error and lets callers recover it by downcasting.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Boxed error as produced by arbitrary transports.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors returned by `ProtocolClient`.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The configured endpoint is not an absolute URL.
    #[error("invalid endpoint {endpoint:?}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    /// The request body could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The default transport could not be constructed.
    #[error("transport setup failed: {0}")]
    TransportSetup(#[source] TransportError),

    /// The transport failed before a response was available.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with status >= 400.
    #[error("{message}")]
    Status { status: u16, message: String },

    /// A success response carried a body that is not JSON.
    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

impl ProtocolError {
    /// HTTP status of a `Status` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProtocolError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A failure reported by a `Transport`, kept as the transport produced it.
pub struct TransportError {
    inner: BoxError,
}

impl TransportError {
    pub fn new(error: impl Into<BoxError>) -> Self {
        Self { inner: error.into() }
    }

    pub fn get_ref(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.inner.as_ref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    pub fn into_inner(self) -> BoxError {
        self.inner
    }
}

impl fmt::Debug for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}
