// JSON request/response bodies of the public endpoints

use serde::Serialize;

/// Validated `POST /match` body
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRequest {
    /// Tokens passed to the matcher, in request order
    pub stickers: Vec<String>,
    /// `selectedStickers` exactly as received, echoed back in the response
    pub echo: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResponse {
    /// `null` when the matcher found nothing
    pub matched_file: Option<String>,
    pub selected_stickers: serde_json::Value,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
}
