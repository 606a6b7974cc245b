//! Protocol client for a single remote endpoint.
//!
//! # Design
//! `ProtocolClient` holds only immutable configuration: the endpoint and
//! three shared collaborators (transport, body serializer, response handler).
//! Each operation is split the same way: `build_request` produces an
//! `HttpRequest` without I/O, the transport executes it, and
//! `handle_response` normalizes the result. The method and credential mode
//! come from `Operation`, never from the caller.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::Instrument;
use url::Url;

use crate::error::{ProtocolError, TransportError};
use crate::http::{HttpRequest, HttpResponse};
use crate::operation::Operation;
use crate::request::RequestOptions;
use crate::response::{JsonResponseHandler, ResponseHandler};
use crate::transport::{ReqwestTransport, Transport};

pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Serializes a request body into the string sent on the wire.
pub type SerializeBody = dyn Fn(&Value) -> Result<String, ProtocolError> + Send + Sync;

fn serialize_json(body: &Value) -> Result<String, ProtocolError> {
    serde_json::to_string(body).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Construction failures are reported apart from failed requests.
fn setup_transport<T: Transport + 'static>(
    transport: Result<T, TransportError>,
) -> Result<Arc<dyn Transport>, ProtocolError> {
    match transport {
        Ok(transport) => Ok(Arc::new(transport)),
        Err(err) => Err(ProtocolError::TransportSetup(err)),
    }
}

/// Asynchronous client for the five protocol operations.
///
/// Cloning is cheap; clones share the same transport and handlers.
#[derive(Clone)]
pub struct ProtocolClient {
    endpoint: Url,
    transport: Arc<dyn Transport>,
    serialize_body: Arc<SerializeBody>,
    content_type: String,
    response_handler: Arc<dyn ResponseHandler>,
}

impl fmt::Debug for ProtocolClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl ProtocolClient {
    /// Client with the default `reqwest` transport, JSON bodies and the
    /// default response handler.
    pub fn new(endpoint: &str) -> Result<Self, ProtocolError> {
        Self::builder(endpoint).build()
    }

    pub fn builder(endpoint: &str) -> ClientBuilder {
        ClientBuilder::new(endpoint)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub async fn probe(&self, options: RequestOptions) -> Result<Option<Value>, ProtocolError> {
        self.request(Operation::Probe, options).await
    }

    pub async fn register(
        &self,
        options: RequestOptions,
    ) -> Result<Option<Value>, ProtocolError> {
        self.request(Operation::Register, options).await
    }

    pub async fn submit(&self, options: RequestOptions) -> Result<Option<Value>, ProtocolError> {
        self.request(Operation::Submit, options).await
    }

    pub async fn query(&self, options: RequestOptions) -> Result<Option<Value>, ProtocolError> {
        self.request(Operation::Query, options).await
    }

    pub async fn purge(&self, options: RequestOptions) -> Result<Option<Value>, ProtocolError> {
        self.request(Operation::Purge, options).await
    }

    /// Build, send and normalize one request.
    pub async fn request(
        &self,
        operation: Operation,
        options: RequestOptions,
    ) -> Result<Option<Value>, ProtocolError> {
        let span = tracing::debug_span!("protocol_request", %operation);
        async move {
            let request = self.build_request(operation, &options)?;
            tracing::debug!(
                method = %request.method,
                url = %request.url,
                credentials = %request.credentials,
                "sending request"
            );
            let response = self.transport.send(request).await?;
            tracing::debug!(status = response.status, "received response");
            self.handle_response(response)
        }
        .instrument(span)
        .await
    }

    /// Describe the HTTP request for `operation` without sending it.
    pub fn build_request(
        &self,
        operation: Operation,
        options: &RequestOptions,
    ) -> Result<HttpRequest, ProtocolError> {
        let mut url = self.endpoint.clone();
        if let Some(params) = &options.params {
            url.set_query(None);
            if !params.is_empty() {
                url.query_pairs_mut().extend_pairs(params);
            }
        }

        let body = match &options.body {
            Some(_) if !operation.accepts_body() => {
                tracing::debug!(%operation, "dropping body on GET request");
                None
            }
            Some(body) => Some((self.serialize_body)(body)?),
            None => None,
        };
        let headers = match body {
            Some(_) => vec![("Content-Type".to_string(), self.content_type.clone())],
            None => Vec::new(),
        };

        Ok(HttpRequest {
            method: operation.method(),
            url,
            credentials: operation.credentials(),
            headers,
            body,
        })
    }

    /// Normalize a raw response with the configured handler.
    pub fn handle_response(
        &self,
        response: HttpResponse,
    ) -> Result<Option<Value>, ProtocolError> {
        self.response_handler.handle(response)
    }
}

/// Collects overrides for a `ProtocolClient`.
pub struct ClientBuilder {
    endpoint: String,
    transport: Option<Arc<dyn Transport>>,
    serialize_body: Option<Arc<SerializeBody>>,
    content_type: Option<String>,
    response_handler: Option<Arc<dyn ResponseHandler>>,
}

impl ClientBuilder {
    fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            transport: None,
            serialize_body: None,
            content_type: None,
            response_handler: None,
        }
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Share an existing transport, e.g. to keep access to its cookie jar.
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn serialize_body<F>(mut self, serialize: F) -> Self
    where
        F: Fn(&Value) -> Result<String, ProtocolError> + Send + Sync + 'static,
    {
        self.serialize_body = Some(Arc::new(serialize));
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn handle_response(mut self, handler: impl ResponseHandler + 'static) -> Self {
        self.response_handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Result<ProtocolClient, ProtocolError> {
        let endpoint =
            Url::parse(&self.endpoint).map_err(|source| ProtocolError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                source,
            })?;
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => setup_transport(ReqwestTransport::new())?,
        };
        let serialize_body: Arc<SerializeBody> = match self.serialize_body {
            Some(serialize) => serialize,
            None => Arc::new(serialize_json),
        };
        let response_handler: Arc<dyn ResponseHandler> = match self.response_handler {
            Some(handler) => handler,
            None => Arc::new(JsonResponseHandler),
        };

        Ok(ProtocolClient {
            endpoint,
            transport,
            serialize_body,
            content_type: self
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            response_handler,
        })
    }
}
