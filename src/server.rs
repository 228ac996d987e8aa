//! HTTP surface: the flow is served at `POST /entryFlow` using the
//! `{"data": ...}` / `{"result": ...}` envelope, with CORS open to any origin.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::error::{ChatError, GenerationError};
use crate::flow::{ChatFlow, ChatRequest};

pub const FLOW_PATH: &str = "/entryFlow";

/// Read the request from a body: the `data` member when the body is an
/// envelope, otherwise the body itself.
/// A present `data` member is never reread as a bare request.
fn parse_request(body: Value) -> Result<ChatRequest, ChatError> {
    let inner = match body {
        Value::Object(mut fields) if fields.contains_key("data") => {
            fields.remove("data").unwrap_or_default()
        }
        other => other,
    };
    serde_json::from_value(inner).map_err(|e| ChatError::Validation(e.to_string()))
}

#[derive(Debug, Serialize)]
struct FlowResult<T> {
    result: T,
}

#[derive(Debug, Serialize)]
struct FlowError {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

/// HTTP status and canonical code for a flow error
fn classify(err: &ChatError) -> (StatusCode, &'static str) {
    match err {
        ChatError::Validation(_) => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
        ChatError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        ChatError::SessionUnreadable { .. } => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
        ChatError::Generation(GenerationError::Timeout { .. }) => {
            (StatusCode::GATEWAY_TIMEOUT, "DEADLINE_EXCEEDED")
        }
        ChatError::Generation(_) => (StatusCode::BAD_GATEWAY, "INTERNAL"),
        ChatError::Config(_) | ChatError::Internal(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
        }
    }
}

fn error_response(err: ChatError) -> Response {
    let (status, code) = classify(&err);
    if status.is_server_error() {
        error!(status = code, error = %err, "flow request failed");
    } else {
        warn!(status = code, error = %err, "flow request rejected");
    }

    let body = FlowError {
        error: ErrorBody {
            status: code,
            message: err.to_string(),
        },
    };
    (status, Json(body)).into_response()
}

async fn entry_flow(
    State(flow): State<Arc<ChatFlow>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let parsed = match payload {
        Ok(Json(body)) => parse_request(body),
        Err(rejection) => Err(ChatError::Validation(rejection.body_text())),
    };
    let request = match parsed {
        Ok(request) => request,
        Err(e) => return error_response(e),
    };

    match flow.handle(request).await {
        Ok(reply) => (StatusCode::OK, Json(FlowResult { result: reply })).into_response(),
        Err(e) => error_response(e),
    }
}

/// Build the router serving the flow
pub fn router(flow: Arc<ChatFlow>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(FLOW_PATH, post(entry_flow))
        .layer(cors)
        .with_state(flow)
}

/// Serve the flow on `0.0.0.0:port` until Ctrl-C
pub async fn serve(flow: ChatFlow, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!(addr = %addr, path = FLOW_PATH, "flow server listening");

    axum::serve(listener, router(Arc::new(flow)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("flow server failed")
}
