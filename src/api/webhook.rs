//! Webhook handler for VCS hook notifications

use axum::{
    Json,
    body::Bytes,
    extract::ConnectInfo,
    extract::State as AxumState,
    extract::rejection::BytesRejection,
    http::{Extensions, HeaderMap, Method, Uri, Version, header},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::SharedState;
use crate::logging::REQUEST_LOG_TARGET;
use crate::webhook::BasicHook;

/// The payload is not a JSON hook object
pub const ERROR_IN_PARSING: i32 = 1001;
/// The request body could not be read
pub const ERROR_IN_GET_DATA: i32 = 1002;

/// Body of every webhook response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookAck {
    pub errcode: i32,
    pub errmsg: String,
}

impl HookAck {
    pub fn ok() -> Self {
        Self {
            errcode: 0,
            errmsg: "ok".to_string(),
        }
    }

    pub fn error(errcode: i32, errmsg: impl Into<String>) -> Self {
        Self {
            errcode,
            errmsg: errmsg.into(),
        }
    }
}

/// Handles the webhook POST request.
///
/// Only the hook name is decoded here; the event is queued for dispatch and
/// acknowledged straight away. The answer is always HTTP 200 and only
/// reflects whether the body could be read and decoded.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    extensions: Extensions,
    body: Result<Bytes, BytesRejection>,
) -> Json<HookAck> {
    let started = Instant::now();
    debug!("receive post");

    let ack = match body {
        Ok(body) => {
            debug!("{}", String::from_utf8_lossy(&body));
            match serde_json::from_slice::<BasicHook>(&body) {
                Ok(basic_hook) => {
                    match state.queue.submit(basic_hook.hook_name, body) {
                        Ok(id) => debug!("Queued dispatch {}", id),
                        Err(e) => error!("Could not queue webhook: {}", e),
                    }
                    HookAck::ok()
                }
                Err(e) => {
                    error!("Could not parse webhook body: {}", e);
                    HookAck::error(ERROR_IN_PARSING, e.to_string())
                }
            }
        }
        Err(e) => {
            error!("Could not read webhook body: {}", e);
            HookAck::error(ERROR_IN_GET_DATA, e.body_text())
        }
    };

    info!(
        target: REQUEST_LOG_TARGET,
        "{} \"{} {} {:?}\" 200 errcode={} {:?} \"{}\"",
        client_ip(&headers, &extensions),
        method,
        uri.path(),
        version,
        ack.errcode,
        started.elapsed(),
        header_str(&headers, header::USER_AGENT).unwrap_or("-")
    );
    Json(ack)
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Address of the client for the request log. Proxy headers win over the
/// peer address of the connection.
fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> String {
    let forwarded = header::HeaderName::from_static("x-forwarded-for");
    if let Some(forwarded) = header_str(headers, forwarded)
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return forwarded.to_string();
    }
    if let Some(real_ip) = header_str(headers, header::HeaderName::from_static("x-real-ip")) {
        return real_ip.to_string();
    }
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppState;
    use crate::api::build_router;
    use crate::config::{DispatchConfig, NotifierSettings};
    use crate::dispatch::{DispatchContext, spawn_workers};
    use crate::notifier::Notifier;
    use crate::targets::TargetStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn post(body: &'static str) -> (StatusCode, HookAck) {
        let context = DispatchContext::new(
            TargetStore::default(),
            Notifier::new(NotifierSettings::default()).unwrap(),
        );
        let (queue, pool) = spawn_workers(context.clone(), DispatchConfig::default());
        let app = build_router(
            Arc::new(AppState::new(queue, Arc::clone(&context.targets))),
            "/notify",
        );

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/notify")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        pool.drain().await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn acknowledges_any_hook_object() {
        assert_eq!(post(r#"{"hook_name": "push_hooks"}"#).await, (StatusCode::OK, HookAck::ok()));
        assert_eq!(post(r#"{"something": "else"}"#).await, (StatusCode::OK, HookAck::ok()));
    }

    #[tokio::test]
    async fn reports_parse_errors_with_200() {
        let (status, ack) = post("not json").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack.errcode, ERROR_IN_PARSING);
        assert!(!ack.errmsg.is_empty());

        let (_, ack) = post(r#"{"hook_name": 5}"#).await;
        assert_eq!(ack.errcode, ERROR_IN_PARSING);
    }

    #[tokio::test]
    async fn null_hook_name_is_acknowledged() {
        assert_eq!(post(r#"{"hook_name": null}"#).await, (StatusCode::OK, HookAck::ok()));
    }

    #[test]
    fn client_ip_prefers_proxy_headers() {
        let mut extensions = Extensions::new();
        assert_eq!(client_ip(&HeaderMap::new(), &extensions), "-");

        extensions.insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 40312))));
        assert_eq!(client_ip(&HeaderMap::new(), &extensions), "10.0.0.7");

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "192.168.1.20".parse().unwrap());
        assert_eq!(client_ip(&headers, &extensions), "192.168.1.20");

        headers.insert("x-forwarded-for", "203.0.113.5, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, &extensions), "203.0.113.5");
    }
}
