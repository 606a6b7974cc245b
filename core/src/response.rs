//! Response normalization.
//!
//! # Design
//! A `ResponseHandler` turns a buffered `HttpResponse` into the value an
//! operation resolves to. The default `JsonResponseHandler` maps error
//! statuses to `ProtocolError::Status`, no-content responses to `None`, and
//! everything else to parsed JSON.

use serde_json::Value;

use crate::error::ProtocolError;
use crate::http::HttpResponse;

/// Converts a raw response into the result of an operation.
pub trait ResponseHandler: Send + Sync {
    fn handle(&self, response: HttpResponse) -> Result<Option<Value>, ProtocolError>;
}

impl<F> ResponseHandler for F
where
    F: Fn(HttpResponse) -> Result<Option<Value>, ProtocolError> + Send + Sync,
{
    fn handle(&self, response: HttpResponse) -> Result<Option<Value>, ProtocolError> {
        self(response)
    }
}

/// Body of an error response, read as JSON when possible.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorBody {
    Parsed(Value),
    RawText(String),
}

impl ErrorBody {
    pub fn read(response: &HttpResponse) -> Self {
        match response.json() {
            Ok(value) => ErrorBody::Parsed(value),
            Err(_) => ErrorBody::RawText(response.text()),
        }
    }

    /// The human-readable message: the `error` field of a JSON body, or the
    /// raw text of a body that is not JSON. A JSON body without `error`
    /// yields an empty message.
    pub fn message(&self) -> String {
        match self {
            ErrorBody::Parsed(value) => match value.get("error") {
                Some(Value::String(message)) => message.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            },
            ErrorBody::RawText(text) => text.clone(),
        }
    }
}

/// The default handler for JSON APIs.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonResponseHandler;

impl ResponseHandler for JsonResponseHandler {
    fn handle(&self, response: HttpResponse) -> Result<Option<Value>, ProtocolError> {
        if response.status >= 400 {
            let message = ErrorBody::read(&response).message();
            tracing::debug!(status = response.status, %message, "error response");
            return Err(ProtocolError::Status {
                status: response.status,
                message,
            });
        }
        if response.status == 204 || response.body.is_empty() {
            return Ok(None);
        }
        response.json().map(Some)
    }
}
