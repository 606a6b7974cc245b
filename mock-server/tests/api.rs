use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{
    adapter, app, app_with_config, AdapterError, AdapterResult, ProbeResult, QueryResult,
    RegisterResult, ServerBuilder, ServerConfig, SubmitResult,
};
use serde_json::json;
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn request(method: &str, cookie: Option<&str>) -> Request<String> {
    let mut builder = Request::builder().method(method).uri("/");
    if let Some(cookie) = cookie {
        builder = builder.header(http::header::COOKIE, cookie);
    }
    builder.body(String::new()).unwrap()
}

fn json_request(method: &str, cookie: Option<&str>, body: &str) -> Request<String> {
    let mut builder = Request::builder()
        .method(method)
        .uri("/")
        .header(http::header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(http::header::COOKIE, cookie);
    }
    builder.body(body.to_string()).unwrap()
}

fn set_cookies(response: &axum::response::Response) -> Vec<String> {
    response
        .headers()
        .get_all(http::header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

/// Router whose adapters answer fixed values, keyed on the `test` cookie.
fn fixed_app() -> axum::Router {
    ServerBuilder::new()
        .cookie_name("test")
        .probe_adapter(adapter(|_, _| async {
            Ok::<_, AdapterError>(AdapterResult::text(StatusCode::OK, "OK"))
        }))
        .register_adapter(adapter(|_, _| async {
            Ok::<_, AdapterError>(AdapterResult::default().with_user_id("test-user"))
        }))
        .query_adapter(adapter(|_, user_id: Option<String>| async move {
            let user_id = user_id.unwrap_or_default();
            Ok::<_, AdapterError>(AdapterResult::text(StatusCode::OK, format!("user: {user_id}")))
        }))
        .submit_adapter(adapter(|_, _| async {
            Ok::<_, AdapterError>(AdapterResult::status(StatusCode::CREATED))
        }))
        .purge_adapter(adapter(|_, _| async {
            Ok::<_, AdapterError>(AdapterResult::status(StatusCode::NO_CONTENT))
        }))
        .build()
}

// --- custom adapters ---

#[tokio::test]
async fn custom_adapters_handle_each_operation() {
    // probe
    let resp = fixed_app().oneshot(request("GET", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, "OK");

    // register: the adapter's user id becomes the cookie
    let resp = fixed_app().oneshot(request("POST", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let cookies = set_cookies(&resp);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("test=test-user;"), "cookie: {}", cookies[0]);

    // query sees the cookie value
    let resp = fixed_app()
        .oneshot(request("GET", Some("test=test-user")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, "user: test-user");

    // submit
    let resp = fixed_app().oneshot(request("PUT", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    // purge
    let resp = fixed_app()
        .oneshot(request("DELETE", Some("test=test-user")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn adapter_failure_returns_500() {
    let app = ServerBuilder::new()
        .probe_adapter(adapter(|_, _| async {
            Err::<AdapterResult, AdapterError>("storage unavailable".into())
        }))
        .build();
    let resp = app.oneshot(request("GET", None)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_bytes(resp).await, "Internal Server Error");
}

#[tokio::test]
async fn unreadable_cookie_returns_500() {
    let req = Request::builder()
        .method("GET")
        .uri("/")
        .header(
            http::header::COOKIE,
            http::HeaderValue::from_bytes(b"user=\xff").unwrap(),
        )
        .body(String::new())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn unset_adapters_fall_back_to_memory() {
    let app = ServerBuilder::new()
        .probe_adapter(adapter(|_, _| async {
            Ok::<_, AdapterError>(AdapterResult::text(StatusCode::OK, "custom"))
        }))
        .build();
    let resp = app.oneshot(request("POST", None)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let result: RegisterResult = body_json(resp).await;
    assert!(!result.user_id.is_empty());
}

// --- probe ---

#[tokio::test]
async fn probe_without_cookie() {
    let resp = app().oneshot(request("GET", None)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let result: ProbeResult = body_json(resp).await;
    assert!(result.ok);
}

// --- register ---

#[tokio::test]
async fn register_sets_configured_cookie() {
    let app = app_with_config(ServerConfig {
        cookie_name: "test".to_string(),
    });
    let resp = app.oneshot(request("POST", None)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let cookies = set_cookies(&resp);
    assert_eq!(cookies.len(), 1);
    let result: RegisterResult = body_json(resp).await;
    assert!(cookies[0].starts_with(&format!("test={}", result.user_id)));
    assert!(cookies[0].contains("HttpOnly"));
}

// --- query ---

#[tokio::test]
async fn query_unknown_user_returns_404() {
    let resp = app()
        .oneshot(request("GET", Some("user=nobody")))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = body_json(resp).await;
    assert_eq!(body, json!({"error": "unknown user"}));
}

// --- submit ---

#[tokio::test]
async fn submit_without_cookie_returns_401() {
    let resp = app()
        .oneshot(json_request("PUT", None, r#"{"events":[]}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = body_json(resp).await;
    assert_eq!(body["error"], "missing user identifier");
}

#[tokio::test]
async fn submit_malformed_json_returns_text_rejection() {
    let resp = app()
        .oneshot(json_request("PUT", Some("user=someone"), "{not json"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_bytes(resp).await;
    assert!(serde_json::from_slice::<serde_json::Value>(&body).is_err());
    assert!(!body.is_empty());
}

#[tokio::test]
async fn submit_without_content_type_returns_415() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/")
                .header(http::header::COOKIE, "user=someone")
                .body(r#"{"events":[]}"#.to_string())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

// --- purge ---

#[tokio::test]
async fn purge_without_cookie_is_empty_ok() {
    let resp = app().oneshot(request("DELETE", None)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_bytes(resp).await.is_empty());
}

#[tokio::test]
async fn purge_with_cookie_returns_204() {
    let resp = app()
        .oneshot(request("DELETE", Some("user=anyone")))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

// --- full protocol lifecycle ---

#[tokio::test]
async fn protocol_lifecycle() {
    use tower::Service;

    let mut app = app().into_service();

    // register
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("POST", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let registered: RegisterResult = body_json(resp).await;
    let cookie = format!("user={}", registered.user_id);

    // query: no events yet
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("GET", Some(cookie.as_str())))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let result: QueryResult = body_json(resp).await;
    assert_eq!(result.user_id, registered.user_id);
    assert!(result.events.is_empty());

    // submit two events
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request(
            "PUT",
            Some(cookie.as_str()),
            r#"{"events":[{"kind":"pageview"},{"kind":"click"}]}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let submitted: SubmitResult = body_json(resp).await;
    assert_eq!(submitted.accepted, 2);

    // query: events are stored in order
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("GET", Some(cookie.as_str())))
        .await
        .unwrap();
    let result: QueryResult = body_json(resp).await;
    assert_eq!(
        result.events,
        vec![json!({"kind":"pageview"}), json!({"kind":"click"})]
    );

    // purge
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("DELETE", Some(cookie.as_str())))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    // query after purge: user is gone
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("GET", Some(cookie.as_str())))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
