use std::future::Future;

use crash_shared::{
    ApiError, ApiResult, ComputeOutcomeRequest, ComputeOutcomeResponse, ErrorBody,
    InitRoundResponse, RevealSeedResponse, VerifyRoundRequest, VerifyRoundResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::round::RoundOutcome;

const INIT_FALLBACK: &str = "Failed to start round";
const COMPUTE_FALLBACK: &str = "Failed to compute round outcome";
const REVEAL_FALLBACK: &str = "Failed to reveal server seed";
const VERIFY_FALLBACK: &str = "Failed to verify round";

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("{0}")]
    RoundInit(ApiError),
    #[error("{0}")]
    OutcomeComputation(ApiError),
    #[error("{0}")]
    Reveal(ApiError),
    #[error("{0}")]
    Verification(ApiError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundCommitment {
    pub round_id: String,
    pub commit_hash: String,
}

/// Boundary to the external service that commits to and decides outcomes.
pub trait OutcomeClient {
    fn init_round(&self) -> impl Future<Output = Result<RoundCommitment, ServiceError>> + Send;

    /// The service decides the crash point; the auto-cashout comparison is
    /// made against it on this side.
    fn compute_outcome(
        &self,
        round_id: &str,
        client_seed: &str,
        nonce: u64,
        auto_cashout: Option<f64>,
    ) -> impl Future<Output = Result<RoundOutcome, ServiceError>> + Send;

    fn reveal_seed(&self, round_id: &str)
        -> impl Future<Output = Result<String, ServiceError>> + Send;

    /// Crash point the service recomputes from the revealed material.
    fn verify_round(
        &self,
        round_id: &str,
        server_seed: &str,
        client_seed: &str,
        nonce: u64,
    ) -> impl Future<Output = Result<f64, ServiceError>> + Send;
}

/// JSON-over-HTTP client for the outcome service.
#[derive(Debug, Clone)]
pub struct HttpOutcomeClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpOutcomeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `{base}/round/{id}/reveal` with the id as a single escaped path segment.
    fn reveal_url(&self, round_id: &str) -> ApiResult<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ApiError::Transport(format!("invalid service url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| ApiError::Transport(format!("invalid service url: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["round", round_id, "reveal"]);
        Ok(url)
    }

    async fn post<Req, Resp>(&self, path: &str, body: Option<&Req>, fallback: &str) -> ApiResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        debug!(path, "outcome service request");
        let mut request = self.http.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        read_response(response, fallback).await
    }

    async fn get<Resp: DeserializeOwned>(&self, url: reqwest::Url, fallback: &str) -> ApiResult<Resp> {
        debug!(path = url.path(), "outcome service request");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        read_response(response, fallback).await
    }
}

async fn read_response<Resp: DeserializeOwned>(
    response: reqwest::Response,
    fallback: &str,
) -> ApiResult<Resp> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<Resp>()
            .await
            .map_err(|e| ApiError::Malformed(e.to_string()));
    }
    debug!(%status, "outcome service rejected request");
    let body = response.json::<ErrorBody>().await.ok();
    Err(ApiError::surfaced(body, fallback))
}

impl OutcomeClient for HttpOutcomeClient {
    async fn init_round(&self) -> Result<RoundCommitment, ServiceError> {
        let resp: InitRoundResponse = self
            .post::<(), _>("/round/init", None, INIT_FALLBACK)
            .await
            .map_err(ServiceError::RoundInit)?;
        Ok(RoundCommitment {
            round_id: resp.round_id,
            commit_hash: resp.server_seed_hash,
        })
    }

    async fn compute_outcome(
        &self,
        round_id: &str,
        client_seed: &str,
        nonce: u64,
        auto_cashout: Option<f64>,
    ) -> Result<RoundOutcome, ServiceError> {
        let req = ComputeOutcomeRequest {
            round_id: round_id.to_string(),
            client_seed: client_seed.to_string(),
            nonce,
        };
        let resp: ComputeOutcomeResponse = self
            .post("/round/compute", Some(&req), COMPUTE_FALLBACK)
            .await
            .map_err(ServiceError::OutcomeComputation)?;
        Ok(RoundOutcome::resolve(resp.crash_point, auto_cashout))
    }

    async fn reveal_seed(&self, round_id: &str) -> Result<String, ServiceError> {
        let url = self.reveal_url(round_id).map_err(ServiceError::Reveal)?;
        let resp: RevealSeedResponse = self
            .get(url, REVEAL_FALLBACK)
            .await
            .map_err(ServiceError::Reveal)?;
        Ok(resp.server_seed)
    }

    async fn verify_round(
        &self,
        round_id: &str,
        server_seed: &str,
        client_seed: &str,
        nonce: u64,
    ) -> Result<f64, ServiceError> {
        let req = VerifyRoundRequest {
            round_id: round_id.to_string(),
            server_seed: server_seed.to_string(),
            client_seed: client_seed.to_string(),
            nonce,
        };
        let resp: VerifyRoundResponse = self
            .post("/round/verify", Some(&req), VERIFY_FALLBACK)
            .await
            .map_err(ServiceError::Verification)?;
        Ok(resp.crash_point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = HttpOutcomeClient::new("http://localhost:8080/api/");
        assert_eq!(client.base_url(), "http://localhost:8080/api");
        assert_eq!(client.url("/round/init"), "http://localhost:8080/api/round/init");
    }

    #[test]
    fn test_reveal_url_escapes_round_id() {
        let client = HttpOutcomeClient::new("http://localhost:8080/api");
        let url = client.reveal_url("r-17").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/round/r-17/reveal");

        let url = client.reveal_url("a/b?c#d").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/round/a%2Fb%3Fc%23d/reveal");
        assert_eq!(url.query(), None);

        let root = HttpOutcomeClient::new("http://localhost:8080");
        let url = root.reveal_url("r-17").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/round/r-17/reveal");
    }

    #[test]
    fn test_service_error_is_verbatim() {
        let err = ServiceError::RoundInit(ApiError::Rejected("table closed".into()));
        assert_eq!(err.to_string(), "table closed");
    }
}
