//! Axum route handlers.
//!
//! # Routes
//!
//! - `GET  /health`                         — `{"status": "ok", "version": ...}`
//! - `POST /v1/process`                     — `ProcessRequest` → `ProcessResponse`
//! - `GET  /v1/users/:user_id/mental-model` — `UserMentalModel`, or 404
//! - `GET  /metrics`                        — `MetricsSnapshot`

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::brain::{Brain, ProcessRequest, ProcessResponse};
use crate::mental::UserMentalModel;
use crate::metrics::MetricsSnapshot;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub brain: Arc<Brain>,
}

impl AppState {
    /// State around a shared brain.
    pub fn new(brain: Arc<Brain>) -> Self {
        Self { brain }
    }
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/process", post(process_handler))
        .route("/v1/users/:user_id/mental-model", get(mental_model_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health — liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "brainchain",
    }))
}

/// POST /v1/process — run one message through the chain.
///
/// The chain future is dropped if the client disconnects, which cancels the
/// request at its current stage.
async fn process_handler(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "'message' must not be empty"));
    }
    if request.user_id.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "'userId' must not be empty"));
    }
    Ok(Json(state.brain.process(request).await))
}

/// GET /v1/users/:user_id/mental-model
async fn mental_model_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserMentalModel>, ApiError> {
    state.brain.mental_model(&user_id).map(Json).ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            format!("No mental model for user '{}'", user_id),
        )
    })
}

/// GET /metrics — JSON counter snapshot.
async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.brain.metrics().snapshot())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::NullSink;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> AppState {
        let brain = Brain::builder()
            .trace_sink(Arc::new(NullSink))
            .build()
            .unwrap();
        AppState::new(Arc::new(brain))
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn process_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/process")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = app_router(state());

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], crate::VERSION);
        assert_eq!(json["service"], "brainchain");
    }

    #[tokio::test]
    async fn test_process_returns_answer_and_explanation() {
        let app = app_router(state());
        let response = app
            .oneshot(process_request(serde_json::json!({
                "userId": "u-1",
                "conversationId": "c-1",
                "message": "I'm stuck, the build is not working",
                "traceId": "http-1",
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["traceId"], "http-1");
        assert!(json["text"].as_str().unwrap().contains("frustrating"));
        assert_eq!(json["explain"]["strategy"], "troubleshoot");
        assert_eq!(json["explain"]["outcome"]["state"], "done");
        assert_eq!(json["explain"]["emotionalState"], "FRUSTRATED");
    }

    #[tokio::test]
    async fn test_process_rejects_empty_message() {
        let app = app_router(state());
        let response = app
            .oneshot(process_request(serde_json::json!({
                "userId": "u-1",
                "conversationId": "c-1",
                "message": "   ",
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert!(json["error"].as_str().unwrap().contains("message"));
    }

    #[tokio::test]
    async fn test_process_rejects_malformed_body() {
        let app = app_router(state());
        let response = app
            .oneshot(process_request(serde_json::json!({ "message": "hi" })))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_mental_model_lifecycle() {
        let state = state();

        let missing = app_router(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/v1/users/u-2/mental-model")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        app_router(state.clone())
            .oneshot(process_request(serde_json::json!({
                "userId": "u-2",
                "conversationId": "c-2",
                "message": "I'm confused about lifetimes",
            })))
            .await
            .unwrap();

        let found = app_router(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/v1/users/u-2/mental-model")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(found.status(), StatusCode::OK);
        let json = json_body(found).await;
        assert_eq!(json["userId"], "u-2");
        assert!(json["confusionLevel"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_metrics_counts_requests() {
        let state = state();
        app_router(state.clone())
            .oneshot(process_request(serde_json::json!({
                "userId": "u-3",
                "conversationId": "c-3",
                "message": "rename the parser variable",
            })))
            .await
            .unwrap();

        let response = app_router(state)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["requests"], 1);
        assert_eq!(json["stages"]["responder"]["runs"], 1);
    }
}
