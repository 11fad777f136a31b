//! HTTP tool server.
//!
//! Exposes the retrieval tools as a JSON HTTP API for agents and editor
//! integrations. Every tool in the [`ToolRegistry`] is dispatched through
//! the same `POST /tools/{name}` handler.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call a registered tool by name |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "invalid_argument", "message": "`top_k` must be a positive integer" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `invalid_argument` | 400 |
//! | `not_found` | 404 |
//! | `cancelled` | 408 |
//! | `query_rejected` | 502 |
//! | `backend_unavailable` | 503 |
//! | `internal` | 500 |

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use chunkseek_core::{ErrorKind, RetrievalError};

use crate::services::Services;
use crate::tools::{ToolContext, ToolInfo, ToolRegistry};

#[derive(Clone)]
struct AppState {
    services: Arc<Services>,
    tools: Arc<ToolRegistry>,
}

/// Build the router without binding. Used by [`run_server`] and by tests
/// that serve on an ephemeral port.
pub fn router(services: Arc<Services>, tools: Arc<ToolRegistry>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { services, tools })
}

/// Serve on `[server].bind` until the process is terminated.
pub async fn run_server(services: Arc<Services>, tools: Arc<ToolRegistry>) -> anyhow::Result<()> {
    let bind_addr = services.config().server.bind.clone();
    for t in tools.tools() {
        tracing::debug!(tool = t.name(), builtin = t.is_builtin(), "registered tool");
    }

    let app = router(services, tools);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("chunkseek listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
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
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Map a tool failure to a status. Retrieval errors carry their own
/// category; anything else is internal.
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    let message = format!("{}: {}", tool_name, err);
    let Some(retrieval) = err.downcast_ref::<RetrievalError>() else {
        tracing::error!(tool = tool_name, error = %err, "tool failed");
        return AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message,
        };
    };

    let (status, code) = match retrieval {
        RetrievalError::QueryRejected { .. } => (StatusCode::BAD_GATEWAY, "query_rejected"),
        other => match other.kind() {
            ErrorKind::InvalidArgument => (StatusCode::BAD_REQUEST, "invalid_argument"),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            ErrorKind::Cancelled => (StatusCode::REQUEST_TIMEOUT, "cancelled"),
            ErrorKind::BackendUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "backend_unavailable")
            }
        },
    };
    if status.is_server_error() {
        tracing::warn!(tool = tool_name, error = %retrieval, "backend failure");
    }
    AppError {
        status,
        code,
        message,
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo::of(t.as_ref()))
        .collect();
    Json(ToolListResponse { tools })
}

// ============ POST /tools/{name} ============

async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let tool = state.tools.find(&name).ok_or_else(|| AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: format!("no tool registered with name: {}", name),
    })?;

    let ctx = ToolContext::new(state.services.clone());
    let result = tool
        .execute(params, &ctx)
        .await
        .map_err(|e| classify_tool_error(&name, e))?;

    Ok(Json(serde_json::json!({ "result": result })))
}
