//! Asynchronous client for a five-operation HTTP protocol.
//!
//! # Overview
//! `ProtocolClient` targets one endpoint and exposes `probe`, `register`,
//! `submit`, `query` and `purge`. Each operation maps to a fixed HTTP method
//! and credential mode, and every response is normalized into parsed JSON,
//! `None`, or a `ProtocolError` carrying the HTTP status.
//!
//! # Design
//! - Requests are built as plain data (`build_request`) and normalized as
//!   plain data (`handle_response`); only the `Transport` performs I/O.
//! - Transport, body serializer and response handler are injected at
//!   construction and shared behind `Arc`, so the client is cheap to clone.
//! - `ReqwestTransport` is the default transport; it keeps cookies only for
//!   credentialed operations.

pub mod client;
pub mod error;
pub mod http;
pub mod operation;
pub mod request;
pub mod response;
pub mod transport;

pub use client::{ClientBuilder, ProtocolClient, SerializeBody, DEFAULT_CONTENT_TYPE};
pub use error::{BoxError, ProtocolError, TransportError};
pub use http::{CredentialsMode, HttpMethod, HttpRequest, HttpResponse};
pub use operation::Operation;
pub use request::RequestOptions;
pub use response::{ErrorBody, JsonResponseHandler, ResponseHandler};
pub use transport::{ReqwestTransport, Transport};
