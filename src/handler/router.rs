//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: body limits, route matching,
//! the catch-all for failed handlers, and access logging.

use crate::api;
use crate::config::AppState;
use crate::error::ApiError;
use crate::handler::media;
use crate::http;
use crate::logger::{self, AccessLogEntry};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::header::{HeaderValue, SERVER};
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Request information needed by the route handlers
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub is_head: bool,
    pub if_none_match: Option<String>,
    pub body: Bytes,
}

impl RequestContext {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            is_head: method == Method::HEAD,
            method,
            path: path.to_string(),
            if_none_match: None,
            body: Bytes::new(),
        }
    }
}

/// Main entry point for HTTP request handling
pub async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let enable_cors = state.config.http.enable_cors;
    let max_body_size = state.config.http.max_body_size;

    let mut entry = state.access_log_enabled().then(|| {
        let mut entry = AccessLogEntry::new(
            peer_addr.ip().to_string(),
            req.method().to_string(),
            req.uri().path().to_string(),
        );
        entry.query = req.uri().query().map(ToString::to_string);
        entry.http_version = format!("{:?}", req.version()).trim_start_matches("HTTP/").to_string();
        entry.user_agent = header_value(&req, "user-agent");
        entry
    });

    let read_timeout = state.config.performance.read_timeout();
    let mut response = match read_context(req, max_body_size, read_timeout).await {
        Ok(ctx) => dispatch(ctx, Arc::clone(&state)).await,
        Err(e) => e.into_response(enable_cors),
    };
    if let Ok(server_name) = HeaderValue::from_str(&state.config.http.server_name) {
        response.headers_mut().insert(SERVER, server_name);
    }

    if let Some(entry) = entry.as_mut() {
        entry.status = response.status().as_u16();
        entry.body_bytes = usize::try_from(response.body().size_hint().lower()).unwrap_or(0);
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

fn header_value<B>(req: &Request<B>, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

/// Run `route` in its own task within `performance.write_timeout`.
///
/// Every request gets a response: a handler panic becomes a 500 and an
/// expired deadline a 503.
async fn dispatch(ctx: RequestContext, state: Arc<AppState>) -> Response<Full<Bytes>> {
    let enable_cors = state.config.http.enable_cors;
    let path = ctx.path.clone();

    let mut handle = tokio::spawn(route(ctx, Arc::clone(&state)));
    let joined = match state.config.performance.write_timeout() {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                logger::log_warning(&format!(
                    "Request to {path} exceeded {}s, aborted",
                    limit.as_secs()
                ));
                return ApiError::Deadline.into_response(enable_cors);
            }
        },
        None => handle.await,
    };

    joined.unwrap_or_else(|e| {
        ApiError::Internal(format!("Request handler failed: {e}")).into_response(enable_cors)
    })
}

/// Collect the body within `max_body_size` and build the routing context
async fn read_context(
    req: Request<Incoming>,
    max_body_size: u64,
    read_timeout: Option<Duration>,
) -> Result<RequestContext, ApiError> {
    check_body_size(&req, max_body_size)?;

    let mut ctx = RequestContext::new(req.method().clone(), req.uri().path());
    ctx.if_none_match = header_value(&req, "if-none-match");

    let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
    let collect = Limited::new(req.into_body(), limit).collect();
    let collected = match read_timeout {
        Some(timeout) => tokio::time::timeout(timeout, collect)
            .await
            .map_err(|_| ApiError::BodyTimeout)?,
        None => collect.await,
    };
    ctx.body = match collected {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(ApiError::PayloadTooLarge(max_body_size));
        }
        Err(e) => {
            return Err(ApiError::Validation(format!("failed to read request body: {e}")));
        }
    };
    Ok(ctx)
}

/// Reject early on a declared Content-Length above the limit
fn check_body_size<B>(req: &Request<B>, max_body_size: u64) -> Result<(), ApiError> {
    let Some(content_length) = req.headers().get("content-length") else {
        return Ok(());
    };
    match content_length.to_str().ok().map(str::parse::<u64>) {
        Some(Ok(size)) if size > max_body_size => {
            logger::log_warning(&format!(
                "Request body too large: {size} bytes (max: {max_body_size})"
            ));
            Err(ApiError::PayloadTooLarge(max_body_size))
        }
        Some(Ok(_)) => Ok(()),
        _ => {
            logger::log_warning("Invalid Content-Length header, skipping size check");
            Ok(())
        }
    }
}

/// Route a fully read request
pub async fn route(ctx: RequestContext, state: Arc<AppState>) -> Response<Full<Bytes>> {
    let enable_cors = state.config.http.enable_cors;
    let routes = &state.config.routes;
    let media_prefix = state.config.media.url_prefix.as_str();
    let path = ctx.path.as_str();

    if ctx.method == Method::OPTIONS {
        return http::build_options_response(enable_cors);
    }

    if let Some(name) = path.strip_prefix(media_prefix) {
        return match ctx.method {
            Method::GET | Method::HEAD => media::serve_media(&ctx, name, &state).await,
            _ => http::build_405_response("GET, HEAD, OPTIONS"),
        };
    }

    let result = if path == routes.health_path {
        if ctx.method == Method::GET {
            Ok(api::handle_health(&state))
        } else {
            return http::build_405_response("GET, OPTIONS");
        }
    } else if path == routes.catalog_path {
        if ctx.method == Method::GET {
            api::handle_catalog(&state).await
        } else {
            return http::build_405_response("GET, OPTIONS");
        }
    } else if path == routes.match_path {
        if ctx.method == Method::POST {
            api::handle_match(&ctx.body, &state).await
        } else {
            return http::build_405_response("POST, OPTIONS");
        }
    } else {
        Err(ApiError::NotFound)
    };

    result.unwrap_or_else(|e| e.into_response(enable_cors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::{MATCHED_MESSAGE, NO_MATCH_MESSAGE};
    use crate::config::tests::test_config;
    use hyper::StatusCode;
    use serde_json::{json, Value};
    use std::path::Path;

    /// State whose matcher is `sh -c <script> matcher <stickers> <media dir>`
    fn state_with_script(media_dir: &Path, script: &str, timeout_ms: u64) -> Arc<AppState> {
        let mut cfg = test_config(media_dir);
        cfg.matcher.args = vec!["-c".to_string(), script.to_string(), "matcher".to_string()];
        cfg.matcher.timeout_ms = timeout_ms;
        Arc::new(AppState::new(&cfg))
    }

    fn match_request(body: &str) -> RequestContext {
        let mut ctx = RequestContext::new(Method::POST, "/match");
        ctx.body = Bytes::from(body.to_string());
        ctx
    }

    async fn body_json(resp: Response<Full<Bytes>>) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_declared_body_size_limit() {
        let with_length = |len: &str| {
            Request::builder()
                .method(Method::POST)
                .uri("/match")
                .header("content-length", len)
                .body(())
                .unwrap()
        };

        assert!(check_body_size(&with_length("1024"), 1024).is_ok());
        assert!(matches!(
            check_body_size(&with_length("1025"), 1024),
            Err(ApiError::PayloadTooLarge(1024))
        ));
        assert!(check_body_size(&with_length("abc"), 1024).is_ok());
        assert!(check_body_size(&Request::new(()), 1024).is_ok());
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_script(dir.path(), "echo None", 1_000);

        let resp = route(RequestContext::new(Method::GET, "/health"), state).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_catalog_lists_media_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mid"), [1u8; 10]).unwrap();
        std::fs::write(dir.path().join("b.midi"), [1u8; 20]).unwrap();
        std::fs::write(dir.path().join("c.txt"), [1u8; 30]).unwrap();
        let state = state_with_script(dir.path(), "echo None", 1_000);

        let resp = route(RequestContext::new(Method::GET, "/catalog"), state).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            json!([
                {"name": "a.mid", "url": "/media/a.mid", "sizeBytes": 10},
                {"name": "b.midi", "url": "/media/b.midi", "sizeBytes": 20},
            ])
        );
    }

    #[tokio::test]
    async fn test_catalog_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_script(&dir.path().join("missing"), "echo None", 1_000);

        let resp = route(RequestContext::new(Method::GET, "/catalog"), state).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await, json!({"error": "Failed to read media files"}));
    }

    #[tokio::test]
    async fn test_match_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_script(dir.path(), "echo scoring 1>&2; echo kb1.mid", 5_000);

        let resp = route(match_request(r#"{"selectedStickers":["rainy","winter"]}"#), state).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            json!({
                "matchedFile": "kb1.mid",
                "selectedStickers": ["rainy", "winter"],
                "message": MATCHED_MESSAGE,
            })
        );
    }

    #[tokio::test]
    async fn test_match_none() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_script(dir.path(), "echo working; echo None", 5_000);

        let resp = route(match_request(r#"{"selectedStickers":["cat"]}"#), state).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["matchedFile"], Value::Null);
        assert_eq!(body["selectedStickers"], json!(["cat"]));
        assert_eq!(body["message"], NO_MATCH_MESSAGE);
    }

    #[tokio::test]
    async fn test_invalid_input_never_spawns() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("spawned");
        let script = format!("touch '{}'; echo None", marker.display());
        let state = state_with_script(dir.path(), &script, 5_000);

        for body in [r#"{}"#, r#"{"selectedStickers":"sunny"}"#] {
            let resp = route(match_request(body), Arc::clone(&state)).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            assert!(body_json(resp).await["error"].is_string());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_process_failure_returns_details() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_script(dir.path(), "echo 'KeyError: sticker' 1>&2; exit 1", 5_000);

        let resp = route(match_request(r#"{"selectedStickers":["x"]}"#), state).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "Sticker matching failed");
        assert_eq!(body["details"], "KeyError: sticker\n");
    }

    #[tokio::test]
    async fn test_empty_output_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_script(dir.path(), "true", 5_000);

        let resp = route(match_request(r#"{"selectedStickers":["x"]}"#), state).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(resp).await,
            json!({"error": "Failed to parse match result"})
        );
    }

    #[tokio::test]
    async fn test_timeout_is_408() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_script(dir.path(), "exec sleep 5", 200);

        let started = Instant::now();
        let resp = route(match_request(r#"{"selectedStickers":["snowy"]}"#), state).await;
        assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(body_json(resp).await["error"].is_string());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_matches_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let script = r#"case "$1" in slow) exec sleep 5 ;; *) sleep 0.3; echo "$1.mid" ;; esac"#;
        let state = state_with_script(dir.path(), script, 600);

        let (slow, fast) = tokio::join!(
            route(match_request(r#"{"selectedStickers":["slow"]}"#), Arc::clone(&state)),
            route(match_request(r#"{"selectedStickers":["fast"]}"#), Arc::clone(&state)),
        );
        assert_eq!(slow.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(fast.status(), StatusCode::OK);
        assert_eq!(body_json(fast).await["matchedFile"], "fast.mid");
    }

    #[tokio::test]
    async fn test_media_served_with_cache_headers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b3.mid"), b"MThd-data").unwrap();
        let state = state_with_script(dir.path(), "echo None", 1_000);

        let resp = route(RequestContext::new(Method::GET, "/media/b3.mid"), Arc::clone(&state)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["Content-Type"], "audio/midi");
        assert_eq!(resp.headers()["Cache-Control"], "public, max-age=31536000");
        assert!(resp.headers().contains_key("Last-Modified"));
        let etag = resp.headers()["ETag"].to_str().unwrap().to_string();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"MThd-data");

        let mut revalidate = RequestContext::new(Method::GET, "/media/b3.mid");
        revalidate.if_none_match = Some(etag);
        let resp = route(revalidate, Arc::clone(&state)).await;
        assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);

        let resp = route(RequestContext::new(Method::HEAD, "/media/b3.mid"), state).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["Content-Length"], "9");
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_media_names_are_percent_decoded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("my song.mid"), b"MThd-a").unwrap();
        std::fs::write(dir.path().join("sunny,summer,beach.mid"), b"MThd-b").unwrap();
        let state = state_with_script(dir.path(), "echo None", 1_000);

        for (path, content) in [
            ("/media/my%20song.mid", &b"MThd-a"[..]),
            ("/media/sunny%2Csummer%2Cbeach.mid", &b"MThd-b"[..]),
            ("/media/sunny,summer,beach.mid", &b"MThd-b"[..]),
        ] {
            let resp = route(RequestContext::new(Method::GET, path), Arc::clone(&state)).await;
            assert_eq!(resp.status(), StatusCode::OK, "{path}");
            let body = resp.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(&body[..], content, "{path}");
        }

        for path in ["/media/..%2FCargo.toml", "/media/%2E%2E", "/media/%FF.mid"] {
            let resp = route(RequestContext::new(Method::GET, path), Arc::clone(&state)).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{path}");
        }
    }

    #[tokio::test]
    async fn test_catalog_urls_are_fetchable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("rainy day.mid"), b"MThd").unwrap();
        let state = state_with_script(dir.path(), "echo None", 1_000);

        let resp = route(RequestContext::new(Method::GET, "/catalog"), Arc::clone(&state)).await;
        let catalog = body_json(resp).await;
        let url = catalog[0]["url"].as_str().unwrap().to_string();
        assert_eq!(url, "/media/rainy%20day.mid");

        let resp = route(RequestContext::new(Method::GET, &url), state).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_request_deadline_still_answers() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = test_config(dir.path());
        cfg.performance.write_timeout = 1;
        cfg.matcher.args = vec!["-c".to_string(), "exec sleep 5".to_string(), "matcher".to_string()];
        cfg.matcher.timeout_ms = 3_000;
        let state = Arc::new(AppState::new(&cfg));

        let started = Instant::now();
        let resp = dispatch(match_request(r#"{"selectedStickers":["x"]}"#), state).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(
            body_json(resp).await,
            json!({"error": "Request processing timed out"})
        );
    }

    #[tokio::test]
    async fn test_dispatch_within_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_script(dir.path(), "echo kb1.mid", 1_000);

        let resp = dispatch(match_request(r#"{"selectedStickers":["x"]}"#), state).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["matchedFile"], "kb1.mid");
    }

    #[tokio::test]
    async fn test_media_missing_or_traversal_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_script(dir.path(), "echo None", 1_000);

        for path in ["/media/nope.mid", "/media/../Cargo.toml", "/media/"] {
            let resp = route(RequestContext::new(Method::GET, path), Arc::clone(&state)).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{path}");
        }
    }

    #[tokio::test]
    async fn test_methods_and_unknown_routes() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_script(dir.path(), "echo None", 1_000);

        let resp = route(RequestContext::new(Method::GET, "/match"), Arc::clone(&state)).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

        let resp = route(RequestContext::new(Method::GET, "/nope"), Arc::clone(&state)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = route(RequestContext::new(Method::OPTIONS, "/match"), state).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(resp.headers()["Access-Control-Allow-Origin"], "*");
    }
}
