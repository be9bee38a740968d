//! Static media serving
//!
//! Serves files of the media directory by bare file name with long-lived
//! cache headers, `ETag` revalidation and `HEAD` support.

use crate::config::AppState;
use crate::error::ApiError;
use crate::handler::router::RequestContext;
use crate::http::{self, cache, mime, CachePolicy};
use crate::logger;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::HeaderValue;
use hyper::Response;
use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Serve the file named by the percent-encoded path segment `raw_name`
pub async fn serve_media(
    ctx: &RequestContext,
    raw_name: &str,
    state: &AppState,
) -> Response<Full<Bytes>> {
    let media = &state.config.media;
    let enable_cors = state.config.http.enable_cors;

    let Some(path) = decode_media_name(raw_name)
        .and_then(|name| resolve_media_path(&media.dir, &name))
    else {
        return ApiError::NotFound.into_response(enable_cors);
    };

    let content = match fs::read(&path).await {
        Ok(c) => c,
        Err(e) => {
            logger::log_error(&format!("Failed to read file '{}': {e}", path.display()));
            return ApiError::NotFound.into_response(enable_cors);
        }
    };
    let last_modified = fs::metadata(&path)
        .await
        .and_then(|m| m.modified())
        .ok()
        .map(cache::http_date);

    let policy = CachePolicy::Public(media.cache_max_age);
    let etag = cache::generate_etag(&content);
    if cache::check_etag_match(ctx.if_none_match.as_deref(), &etag) {
        return http::build_304_response(&etag, policy);
    }

    let content_type = mime::get_content_type(path.extension().and_then(|e| e.to_str()));
    let mut response = http::build_media_response(
        Bytes::from(content),
        content_type,
        &etag,
        last_modified.as_deref(),
        policy,
        ctx.is_head,
    );
    if enable_cors {
        response
            .headers_mut()
            .insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    }
    response
}

/// Percent-decode a URL path segment; `None` if it is not valid UTF-8
pub fn decode_media_name(raw_name: &str) -> Option<String> {
    percent_decode_str(raw_name)
        .decode_utf8()
        .ok()
        .map(Cow::into_owned)
}

/// Resolve a bare file name inside `media_dir`.
///
/// Rejects separators, dot-files and anything that canonicalizes outside
/// the directory; a missing file also yields `None`.
pub fn resolve_media_path(media_dir: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return None;
    }

    let dir_canonical = match media_dir.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            logger::log_warning(&format!(
                "Media directory not found or inaccessible '{}': {e}",
                media_dir.display()
            ));
            return None;
        }
    };

    let file_canonical = media_dir.join(name).canonicalize().ok()?;
    if !file_canonical.starts_with(&dir_canonical) || !file_canonical.is_file() {
        logger::log_warning(&format!(
            "Blocked media path: {name} -> {}",
            file_canonical.display()
        ));
        return None;
    }
    Some(file_canonical)
}
