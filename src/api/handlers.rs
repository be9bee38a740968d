// Endpoint handlers: health, catalog, sticker matching

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde_json::Value;
use std::time::Instant;

use super::types::{HealthResponse, MatchRequest, MatchResponse};
use crate::catalog;
use crate::config::AppState;
use crate::error::{ApiError, ApiResult};
use crate::http::json_response;
use crate::logger;
use crate::matcher::MatchOutcome;

pub const MATCHED_MESSAGE: &str = "Found a matching media file";
pub const NO_MATCH_MESSAGE: &str = "No matching media file found";

pub fn handle_health(state: &AppState) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &HealthResponse {
            status: "ok",
            message: "Sticker match server is running",
        },
        state.config.http.enable_cors,
    )
}

/// List the media directory
pub async fn handle_catalog(state: &AppState) -> ApiResult<Response<Full<Bytes>>> {
    let media = &state.config.media;
    let files = catalog::list_media(&media.dir, &media.url_prefix, &media.extensions).await?;
    Ok(json_response(
        StatusCode::OK,
        &files,
        state.config.http.enable_cors,
    ))
}

/// Validate the body shape: `selectedStickers` must be present and an array.
///
/// An empty array is accepted and handed to the matcher as-is.
pub fn parse_match_request(body: &[u8]) -> ApiResult<MatchRequest> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::Validation(format!("malformed JSON body: {e}")))?;

    let selected = value
        .get("selectedStickers")
        .ok_or_else(|| ApiError::Validation("selectedStickers is required".to_string()))?;
    let items = selected
        .as_array()
        .ok_or_else(|| ApiError::Validation("selectedStickers must be an array".to_string()))?;

    Ok(MatchRequest {
        stickers: items.iter().map(sticker_token).collect(),
        echo: selected.clone(),
    })
}

fn sticker_token(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Run the matcher for the request body and render its single outcome
pub async fn handle_match(body: &[u8], state: &AppState) -> ApiResult<Response<Full<Bytes>>> {
    let request = parse_match_request(body)?;

    let started = Instant::now();
    let outcome = state.matcher.run(&request.stickers).await.ok_or_else(|| {
        ApiError::Internal("matcher run ended without delivering an outcome".to_string())
    })?;
    logger::log_match(
        &request.stickers,
        outcome.label(),
        started.elapsed().as_millis(),
    );

    let (matched_file, message) = match outcome {
        MatchOutcome::Matched { file } => (Some(file), MATCHED_MESSAGE),
        MatchOutcome::NoMatch => (None, NO_MATCH_MESSAGE),
        MatchOutcome::ProcessFailed { diagnostic } => {
            return Err(ApiError::ProcessFailed {
                details: diagnostic,
            })
        }
        MatchOutcome::Unparseable { reason } => return Err(ApiError::Parse(reason)),
        MatchOutcome::TimedOut => return Err(ApiError::Timeout),
    };

    Ok(json_response(
        StatusCode::OK,
        &MatchResponse {
            matched_file,
            selected_stickers: request.echo,
            message,
        },
        state.config.http.enable_cors,
    ))
}
