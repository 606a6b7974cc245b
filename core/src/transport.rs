//! Transport capability: executes an `HttpRequest` and buffers the response.
//!
//! # Design
//! `ReqwestTransport` keeps two `reqwest::Client`s. The anonymous client has
//! no cookie store, so `CredentialsMode::Omit` requests neither send cookies
//! nor keep the ones they receive. The credentialed client shares a cookie
//! jar that callers can inspect or seed.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::Jar;

use crate::error::TransportError;
use crate::http::{CredentialsMode, HttpMethod, HttpRequest, HttpResponse};

/// Executes HTTP requests on behalf of `ProtocolClient`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Default transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    anonymous: reqwest::Client,
    credentialed: reqwest::Client,
    jar: Arc<Jar>,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_jar(Arc::new(Jar::default()))
    }

    /// Use `jar` for every request sent with credentials included.
    pub fn with_jar(jar: Arc<Jar>) -> Result<Self, TransportError> {
        let anonymous = reqwest::Client::builder()
            .build()
            .map_err(TransportError::new)?;
        let credentialed = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(TransportError::new)?;
        Ok(Self {
            anonymous,
            credentialed,
            jar,
        })
    }

    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.jar
    }

    fn client_for(&self, credentials: CredentialsMode) -> &reqwest::Client {
        match credentials {
            CredentialsMode::Omit => &self.anonymous,
            CredentialsMode::Include => &self.credentialed,
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client_for(request.credentials)
            .request(request.method.into(), request.url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(TransportError::new)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(TransportError::new)?;

        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}
