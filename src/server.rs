//! HTTP boundary for the chat pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/v1/chat` | Answer `{ "question": "..." }` for an authenticated caller |
//!
//! `/api/v1/chat` requires `Authorization: Bearer <token>`, verified by
//! [`TokenVerifier`]. Each request gets a UUID request id, echoed in the
//! `x-request-id` response header and carried in the answer log record.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "validation_error", "message": "question must be 1-500 characters (got 0)" } }
//! ```
//!
//! Error codes: `validation_error` (422), `unauthorized` (401),
//! `service_unavailable` (503).
//!
//! # CORS
//!
//! Only the origins listed in `[server].cors_origins` are allowed.

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::Config;
use crate::error::ChatError;
use crate::identity::TokenVerifier;
use crate::models::ChatAnswer;
use crate::pipeline::{ChatPipeline, RequestContext};
use crate::services;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ChatPipeline>,
    pub verifier: Arc<TokenVerifier>,
}

/// Start the server and block until it shuts down.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let verifier = TokenVerifier::from_env(&config.server.token_secret_env)?;
    let pipeline = services::build_pipeline(config).await?;

    let state = AppState {
        pipeline: Arc::new(pipeline),
        verifier: Arc::new(verifier),
    };
    let app = router(state, &config.server.cors_origins)?;

    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    println!("Policy assistant listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the router with CORS restricted to `cors_origins`.
pub fn router(state: AppState, cors_origins: &[String]) -> anyhow::Result<Router> {
    let origins = cors_origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o).with_context(|| format!("Invalid CORS origin: {}", o))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Ok(Router::new()
        .route("/health", get(handle_health))
        .route("/api/v1/chat", post(handle_chat))
        .layer(cors)
        .with_state(state))
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn validation_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNPROCESSABLE_ENTITY,
        code: "validation_error",
        message: message.into(),
    }
}

fn unauthorized() -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized",
        message: "missing or invalid bearer token".to_string(),
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Validation(message) => validation_error(message),
            ChatError::ServiceUnavailable { stage, .. } => AppError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "service_unavailable",
                // Backend details stay in the server log.
                message: format!("{} temporarily unavailable", stage),
            },
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/v1/chat ============

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let caller = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| state.verifier.verify_bearer(v))
        .ok_or_else(unauthorized)?;

    let Json(request) = body.map_err(|e| validation_error(e.body_text()))?;

    let ctx = RequestContext::new(caller);
    let result = state.pipeline.answer(&ctx, &request.question).await;
    if let Err(err) = &result {
        tracing::warn!(request_id = %ctx.request_id, error = %err, "chat request failed");
    }
    let answer: ChatAnswer = result?;

    let mut response = Json(answer).into_response();
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    Ok(response)
}
