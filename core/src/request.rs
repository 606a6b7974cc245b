//! Per-call request options: query parameters and an optional body.

use serde::Serialize;
use serde_json::Value;

use crate::error::ProtocolError;

/// Query parameters and body for a single operation.
///
/// `params: None` leaves the endpoint's own query untouched, while
/// `Some(vec![])` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub params: Option<Vec<(String, String)>>,
    pub body: Option<Value>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one query parameter, keeping insertion order.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .get_or_insert_with(Vec::new)
            .push((key.into(), value.into()));
        self
    }

    /// Replace all query parameters.
    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params = Some(
            params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Use any serializable value as the body.
    pub fn json<T: Serialize + ?Sized>(self, body: &T) -> Result<Self, ProtocolError> {
        let value =
            serde_json::to_value(body).map_err(|e| ProtocolError::Serialization(e.to_string()))?;
        Ok(self.body(value))
    }
}
