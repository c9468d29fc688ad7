use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitRoundResponse {
    pub round_id: String,
    pub server_seed_hash: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComputeOutcomeRequest {
    pub round_id: String,
    pub client_seed: String,
    pub nonce: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComputeOutcomeResponse {
    pub crash_point: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RevealSeedResponse {
    pub server_seed: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRoundRequest {
    pub round_id: String,
    pub server_seed: String,
    pub client_seed: String,
    pub nonce: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRoundResponse {
    pub crash_point: f64,
}

/// Body of a non-success response. The message is optional on the wire.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("{0}")]
    Rejected(String),
    #[error("service unavailable: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ApiError {
    /// Message to surface: the service's own text when it sent one, else `fallback`.
    pub fn surfaced(body: Option<ErrorBody>, fallback: &str) -> Self {
        match body.and_then(|b| b.error).filter(|m| !m.trim().is_empty()) {
            Some(message) => ApiError::Rejected(message),
            None => ApiError::Rejected(fallback.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
