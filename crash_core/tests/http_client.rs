use axum::{
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use crash_core::{
    derive_hash_hex, ApiError, BetRequest, EngineParams, HttpOutcomeClient, OutcomeClient,
    OutcomeKind, RoundController, ServiceError, VerificationStatus,
};
use crash_shared::{
    ComputeOutcomeRequest, ComputeOutcomeResponse, ErrorBody, InitRoundResponse,
    RevealSeedResponse, VerifyRoundRequest, VerifyRoundResponse,
};

const ROUND_ID: &str = "5f1c2a9e-round";
const RESERVED_ROUND_ID: &str = "5f1c/2a9e?round#1";
const SERVER_SEED: &str = "d4c1f0e2b7a94c55";
const CRASH_POINT: f64 = 3.5;

async fn init_round() -> Json<InitRoundResponse> {
    Json(InitRoundResponse {
        round_id: ROUND_ID.to_string(),
        server_seed_hash: derive_hash_hex(SERVER_SEED.as_bytes()),
    })
}

async fn compute(Json(req): Json<ComputeOutcomeRequest>) -> Response {
    if req.client_seed.is_empty() {
        let body = ErrorBody {
            error: Some("client seed required".to_string()),
        };
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }
    Json(ComputeOutcomeResponse {
        crash_point: CRASH_POINT,
    })
    .into_response()
}

async fn reveal(Path(round_id): Path<String>) -> Response {
    if round_id != ROUND_ID && round_id != RESERVED_ROUND_ID {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(RevealSeedResponse {
        server_seed: SERVER_SEED.to_string(),
    })
    .into_response()
}

async fn verify(Json(req): Json<VerifyRoundRequest>) -> Response {
    if req.server_seed != SERVER_SEED {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(ErrorBody::default())).into_response();
    }
    Json(VerifyRoundResponse {
        crash_point: CRASH_POINT,
    })
    .into_response()
}

async fn spawn_service() -> String {
    let app = Router::new()
        .route("/round/init", post(init_round))
        .route("/round/compute", post(compute))
        .route("/round/:id/reveal", get(reveal))
        .route("/round/verify", post(verify));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn commit_compute_reveal_verify() {
    let client = HttpOutcomeClient::new(spawn_service().await);

    let commitment = client.init_round().await.unwrap();
    assert_eq!(commitment.round_id, ROUND_ID);

    let outcome = client
        .compute_outcome(ROUND_ID, "client", 0, Some(2.0))
        .await
        .unwrap();
    assert!(outcome.will_auto_cashout);
    assert_eq!(outcome.final_multiplier, 2.0);
    assert_eq!(outcome.crash_point, CRASH_POINT);

    let seed = client.reveal_seed(ROUND_ID).await.unwrap();
    assert_eq!(derive_hash_hex(seed.as_bytes()), commitment.commit_hash);

    let crash = client.verify_round(ROUND_ID, &seed, "client", 0).await.unwrap();
    assert_eq!(crash, CRASH_POINT);
}

#[tokio::test]
async fn reveal_keeps_reserved_characters_in_round_id() {
    let client = HttpOutcomeClient::new(spawn_service().await);
    let seed = client.reveal_seed(RESERVED_ROUND_ID).await.unwrap();
    assert_eq!(seed, SERVER_SEED);
}

#[tokio::test]
async fn service_message_is_surfaced() {
    let client = HttpOutcomeClient::new(spawn_service().await);
    let err = client
        .compute_outcome(ROUND_ID, "", 0, None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ServiceError::OutcomeComputation(ApiError::Rejected("client seed required".into()))
    );
    assert_eq!(err.to_string(), "client seed required");
}

#[tokio::test]
async fn missing_message_falls_back() {
    let client = HttpOutcomeClient::new(spawn_service().await);
    let err = client.reveal_seed("unknown").await.unwrap_err();
    assert_eq!(err.to_string(), "Failed to reveal server seed");

    let err = client
        .verify_round(ROUND_ID, "wrong", "client", 0)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Verification(_)));
    assert_eq!(err.to_string(), "Failed to verify round");
}

#[tokio::test]
async fn unreachable_service_is_a_round_init_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpOutcomeClient::new(format!("http://{addr}"));
    let err = client.init_round().await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::RoundInit(ApiError::Transport(_))
    ));
}

#[tokio::test]
async fn controller_plays_and_verifies_over_http() {
    let client = HttpOutcomeClient::new(spawn_service().await);
    let mut ctl = RoundController::new(client, 100.0, EngineParams::default());

    ctl.place_bet(BetRequest::with_auto_cashout(10.0, 1.01))
        .await
        .unwrap();
    let settlement = ctl.wait_for_settlement().await.unwrap();
    assert_eq!(settlement.kind, OutcomeKind::CashedOut);
    assert!(settlement.auto_cashout_fired);
    assert_eq!(settlement.payout, 10.0 * 1.01);
    assert_eq!(ctl.balance(), 90.0 + 10.0 * 1.01);

    let record = ctl.verify_last_round().await.unwrap();
    assert_eq!(record.status, VerificationStatus::Verified);
}
