//! Server side of the probe/register/submit/query/purge protocol.
//!
//! Every operation is served on `/` and delegated to an `Adapter`, one per
//! operation. Users are identified by a cookie whose name comes from
//! `ServerConfig`; a `GET` without that cookie is a probe, a `GET` with it is
//! a query. When an adapter reports a user id, it is set as that cookie.
//! Adapter failures and unreadable cookies answer `500`.
//!
//! `ServerBuilder` fills every adapter left unset with an in-memory one.

use std::{collections::HashMap, error::Error, fmt, future::Future, pin::Pin, sync::Arc};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const DEFAULT_COOKIE_NAME: &str = "user";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub cookie_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
        }
    }
}

impl ServerConfig {
    /// Read `COOKIE_NAME`, falling back to the defaults.
    pub fn from_env() -> Self {
        match std::env::var("COOKIE_NAME") {
            Ok(cookie_name) if !cookie_name.is_empty() => Self { cookie_name },
            _ => Self::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Adapters
// ---------------------------------------------------------------------------

pub type AdapterError = Box<dyn Error + Send + Sync>;
pub type AdapterFuture = Pin<Box<dyn Future<Output = Result<AdapterResult, AdapterError>> + Send>>;

/// Handles one operation for the user named by the cookie, if any.
pub type Adapter = Arc<dyn Fn(AdapterRequest, Option<String>) -> AdapterFuture + Send + Sync>;

/// What an adapter sees of the incoming request.
#[derive(Clone, Debug)]
pub struct AdapterRequest {
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// What an adapter answers. `status: None` means `200 OK`.
#[derive(Clone, Debug, Default)]
pub struct AdapterResult {
    pub status: Option<StatusCode>,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
    pub user_id: Option<String>,
}

impl AdapterResult {
    pub fn status(status: StatusCode) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn json(status: StatusCode, value: &Value) -> Self {
        Self {
            status: Some(status),
            content_type: Some(HeaderValue::from_static("application/json")),
            body: Bytes::from(value.to_string()),
            user_id: None,
        }
    }

    pub fn text(status: StatusCode, text: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            content_type: Some(HeaderValue::from_static("text/plain; charset=utf-8")),
            body: Bytes::from(text.into()),
            user_id: None,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Box an async function into an `Adapter`.
pub fn adapter<F, Fut>(f: F) -> Adapter
where
    F: Fn(AdapterRequest, Option<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<AdapterResult, AdapterError>> + Send + 'static,
{
    Arc::new(
        move |request: AdapterRequest, user_id: Option<String>| -> AdapterFuture {
            Box::pin(f(request, user_id))
        },
    )
}

#[derive(Clone)]
struct Adapters {
    probe: Adapter,
    register: Adapter,
    submit: Adapter,
    query: Adapter,
    purge: Adapter,
}

/// Collects the cookie name and per-operation adapters.
#[derive(Default)]
pub struct ServerBuilder {
    config: ServerConfig,
    probe: Option<Adapter>,
    register: Option<Adapter>,
    submit: Option<Adapter>,
    query: Option<Adapter>,
    purge: Option<Adapter>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cookie_name(mut self, cookie_name: impl Into<String>) -> Self {
        self.config.cookie_name = cookie_name.into();
        self
    }

    pub fn probe_adapter(mut self, adapter: Adapter) -> Self {
        self.probe = Some(adapter);
        self
    }

    pub fn register_adapter(mut self, adapter: Adapter) -> Self {
        self.register = Some(adapter);
        self
    }

    pub fn submit_adapter(mut self, adapter: Adapter) -> Self {
        self.submit = Some(adapter);
        self
    }

    pub fn query_adapter(mut self, adapter: Adapter) -> Self {
        self.query = Some(adapter);
        self
    }

    pub fn purge_adapter(mut self, adapter: Adapter) -> Self {
        self.purge = Some(adapter);
        self
    }

    pub fn build(self) -> Router {
        let memory = MemoryAdapters::new(Vault::default());
        let adapters = Adapters {
            probe: self.probe.unwrap_or_else(|| memory.probe()),
            register: self.register.unwrap_or_else(|| memory.register()),
            submit: self.submit.unwrap_or_else(|| memory.submit()),
            query: self.query.unwrap_or_else(|| memory.query()),
            purge: self.purge.unwrap_or_else(|| memory.purge()),
        };
        let state = AppState {
            cookie_name: Arc::from(self.config.cookie_name),
            adapters: Arc::new(adapters),
        };
        Router::new()
            .route(
                "/",
                get(probe_or_query)
                    .post(register)
                    .put(submit)
                    .delete(purge),
            )
            .with_state(state)
    }
}

pub fn app() -> Router {
    ServerBuilder::new().build()
}

pub fn app_with_config(config: ServerConfig) -> Router {
    ServerBuilder::new().config(config).build()
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_config(listener, ServerConfig::default()).await
}

pub async fn run_with_config(
    listener: TcpListener,
    config: ServerConfig,
) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_config(config)).await
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct AppState {
    cookie_name: Arc<str>,
    adapters: Arc<Adapters>,
}

/// Value of the cookie called `name`, if the request carries it.
fn user_id(headers: &HeaderMap, name: &str) -> Result<Option<String>, header::ToStrError> {
    for value in headers.get_all(header::COOKIE) {
        let found = value
            .to_str()?
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, id)| *key == name && !id.is_empty());
        if let Some((_, id)) = found {
            return Ok(Some(id.to_string()));
        }
    }
    Ok(None)
}

fn internal_error(err: impl fmt::Display) -> Response {
    tracing::warn!(error = %err, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

impl IntoResponse for AdapterResult {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        if let Some(content_type) = self.content_type {
            response.headers_mut().insert(header::CONTENT_TYPE, content_type);
        }
        response
    }
}

async fn dispatch(
    state: &AppState,
    adapter: &Adapter,
    request: AdapterRequest,
    user_id: Option<String>,
) -> Response {
    let result = match adapter(request, user_id).await {
        Ok(result) => result,
        Err(err) => return internal_error(err),
    };
    let cookie = result
        .user_id
        .as_ref()
        .map(|id| format!("{}={id}; Path=/; HttpOnly", state.cookie_name));
    let mut response = result.into_response();
    if let Some(cookie) = cookie {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(err) => return internal_error(err),
        }
    }
    response
}

async fn probe_or_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let user_id = match user_id(&headers, &state.cookie_name) {
        Ok(user_id) => user_id,
        Err(err) => return internal_error(err),
    };
    let adapter = match user_id {
        Some(_) => &state.adapters.query,
        None => &state.adapters.probe,
    };
    dispatch(&state, adapter, AdapterRequest { headers, body }, user_id).await
}

async fn register(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let user_id = match user_id(&headers, &state.cookie_name) {
        Ok(user_id) => user_id,
        Err(err) => return internal_error(err),
    };
    let request = AdapterRequest { headers, body };
    dispatch(&state, &state.adapters.register, request, user_id).await
}

async fn submit(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let user_id = match user_id(&headers, &state.cookie_name) {
        Ok(user_id) => user_id,
        Err(err) => return internal_error(err),
    };
    let request = AdapterRequest { headers, body };
    dispatch(&state, &state.adapters.submit, request, user_id).await
}

async fn purge(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let user_id = match user_id(&headers, &state.cookie_name) {
        Ok(Some(user_id)) => user_id,
        Ok(None) => return StatusCode::OK.into_response(),
        Err(err) => return internal_error(err),
    };
    let request = AdapterRequest { headers, body };
    dispatch(&state, &state.adapters.purge, request, Some(user_id)).await
}

// ---------------------------------------------------------------------------
// In-memory adapters
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProbeResult {
    pub ok: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResult {
    pub user_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub user_id: String,
    pub events: Vec<Value>,
}

#[derive(Deserialize)]
pub struct SubmitPayload {
    pub events: Vec<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SubmitResult {
    pub accepted: usize,
}

/// Events stored per user id.
pub type Vault = Arc<RwLock<HashMap<String, Vec<Value>>>>;

fn error_body(status: StatusCode, message: &str) -> AdapterResult {
    AdapterResult::json(status, &json!({ "error": message }))
}

/// Default adapters backed by a shared `Vault`.
#[derive(Clone, Default)]
pub struct MemoryAdapters {
    vault: Vault,
}

impl MemoryAdapters {
    pub fn new(vault: Vault) -> Self {
        Self { vault }
    }

    pub fn probe(&self) -> Adapter {
        adapter(|_request, _user_id| async {
            tracing::debug!("probe");
            let body = serde_json::to_value(ProbeResult { ok: true })?;
            Ok::<_, AdapterError>(AdapterResult::json(StatusCode::OK, &body))
        })
    }

    pub fn register(&self) -> Adapter {
        let vault = Arc::clone(&self.vault);
        adapter(move |_request, _user_id| {
            let vault = Arc::clone(&vault);
            async move {
                let user_id = Uuid::new_v4().to_string();
                vault.write().await.insert(user_id.clone(), Vec::new());
                tracing::debug!(%user_id, "registered user");
                let body = serde_json::to_value(RegisterResult {
                    user_id: user_id.clone(),
                })?;
                let result = AdapterResult::json(StatusCode::OK, &body).with_user_id(user_id);
                Ok::<_, AdapterError>(result)
            }
        })
    }

    pub fn query(&self) -> Adapter {
        let vault = Arc::clone(&self.vault);
        adapter(move |_request, user_id| {
            let vault = Arc::clone(&vault);
            async move {
                let Some(user_id) = user_id else {
                    return Ok(error_body(StatusCode::UNAUTHORIZED, "missing user identifier"));
                };
                tracing::debug!(%user_id, "query");
                let Some(events) = vault.read().await.get(&user_id).cloned() else {
                    return Ok(error_body(StatusCode::NOT_FOUND, "unknown user"));
                };
                let body = serde_json::to_value(QueryResult { user_id, events })?;
                Ok::<_, AdapterError>(AdapterResult::json(StatusCode::OK, &body))
            }
        })
    }

    /// Expects a JSON `{"events": [...]}` body; malformed bodies are rejected
    /// with plain text.
    pub fn submit(&self) -> Adapter {
        let vault = Arc::clone(&self.vault);
        adapter(move |request, user_id| {
            let vault = Arc::clone(&vault);
            async move {
                let is_json = request
                    .headers
                    .get(header::CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .is_some_and(|value| value.starts_with("application/json"));
                if !is_json {
                    return Ok(AdapterResult::text(
                        StatusCode::UNSUPPORTED_MEDIA_TYPE,
                        "Expected request with `Content-Type: application/json`",
                    ));
                }
                let payload: SubmitPayload = match serde_json::from_slice(&request.body) {
                    Ok(payload) => payload,
                    Err(err) => {
                        return Ok(AdapterResult::text(
                            StatusCode::BAD_REQUEST,
                            format!("Failed to parse the request body as JSON: {err}"),
                        ))
                    }
                };
                let Some(user_id) = user_id else {
                    return Ok(error_body(StatusCode::UNAUTHORIZED, "missing user identifier"));
                };

                let mut vault = vault.write().await;
                let Some(events) = vault.get_mut(&user_id) else {
                    return Ok(error_body(StatusCode::NOT_FOUND, "unknown user"));
                };
                let accepted = payload.events.len();
                events.extend(payload.events);
                tracing::debug!(%user_id, accepted, "stored events");
                let body = serde_json::to_value(SubmitResult { accepted })?;
                Ok::<_, AdapterError>(AdapterResult::json(StatusCode::CREATED, &body))
            }
        })
    }

    pub fn purge(&self) -> Adapter {
        let vault = Arc::clone(&self.vault);
        adapter(move |_request, user_id| {
            let vault = Arc::clone(&vault);
            async move {
                if let Some(user_id) = user_id {
                    vault.write().await.remove(&user_id);
                    tracing::debug!(%user_id, "purged user");
                }
                Ok::<_, AdapterError>(AdapterResult::status(StatusCode::NO_CONTENT))
            }
        })
    }
}
