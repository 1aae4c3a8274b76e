//! REST API handlers.
//!
//! Each handler turns its request into a [`Command`], runs it on the
//! blocking pool and wraps the outcome in the JSON envelope.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use brain_state::{ErrorKind, StateResult};
use serde::Serialize;
use tracing::{debug, error};

use crate::ApiState;
use crate::commands::*;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ApiError>,
}

/// Structured failure: machine-readable kind plus message.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
        ErrorKind::TransactionFailed => StatusCode::CONFLICT,
        ErrorKind::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn error_response(kind: ErrorKind, message: String) -> Response {
    (
        status_for(kind),
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(ApiError { kind, message }),
        }),
    )
        .into_response()
}

/// Execute a command off the async runtime; store calls block on disk I/O.
async fn run(state: ApiState, command: Command) -> Response {
    let name = command.name();
    let result =
        tokio::task::spawn_blocking(move || execute(&state.store, &state.limits, command)).await;
    respond(name, result)
}

fn respond<T: Serialize>(
    name: &str,
    result: Result<StateResult<T>, tokio::task::JoinError>,
) -> Response {
    match result {
        Ok(Ok(output)) => {
            debug!(command = name, "command succeeded");
            ApiResponse::ok(output).into_response()
        }
        Ok(Err(e)) => {
            debug!(command = name, error = %e, "command failed");
            error_response(e.kind(), e.to_string())
        }
        Err(e) => {
            error!(command = name, error = %e, "command task panicked");
            error_response(
                ErrorKind::StorageUnavailable,
                "command task failed".to_string(),
            )
        }
    }
}

/// Malformed requests get the same envelope as any other invalid argument.
fn rejected(message: String) -> Response {
    debug!(error = %message, "request rejected");
    error_response(ErrorKind::InvalidArgument, message)
}

async fn run_json<T>(
    state: ApiState,
    body: Result<Json<T>, JsonRejection>,
    command: fn(T) -> Command,
) -> Response {
    match body {
        Ok(Json(args)) => run(state, command(args)).await,
        Err(rejection) => rejected(rejection.body_text()),
    }
}

async fn run_query<T>(
    state: ApiState,
    query: Result<Query<T>, QueryRejection>,
    command: fn(T) -> Command,
) -> Response {
    match query {
        Ok(Query(args)) => run(state, command(args)).await,
        Err(rejection) => rejected(rejection.body_text()),
    }
}

// ── Envelope ───────────────────────────────────────────────────

/// POST /api/v1/commands
pub async fn command(
    State(state): State<ApiState>,
    body: Result<Json<Command>, JsonRejection>,
) -> Response {
    run_json(state, body, std::convert::identity).await
}

// ── State ──────────────────────────────────────────────────────

/// POST /api/v1/state/set
pub async fn set(State(state): State<ApiState>, body: Result<Json<SetArgs>, JsonRejection>) -> Response {
    run_json(state, body, Command::Set).await
}

/// GET /api/v1/state/get
pub async fn get(State(state): State<ApiState>, query: Result<Query<GetArgs>, QueryRejection>) -> Response {
    run_query(state, query, Command::Get).await
}

/// GET /api/v1/state/list
pub async fn list(State(state): State<ApiState>, query: Result<Query<ListArgs>, QueryRejection>) -> Response {
    run_query(state, query, Command::List).await
}

/// POST /api/v1/state/delete
pub async fn delete(
    State(state): State<ApiState>,
    body: Result<Json<DeleteArgs>, JsonRejection>,
) -> Response {
    run_json(state, body, Command::Delete).await
}

/// POST /api/v1/state/clear
pub async fn clear(State(state): State<ApiState>, body: Result<Json<ClearArgs>, JsonRejection>) -> Response {
    run_json(state, body, Command::Clear).await
}

/// POST /api/v1/state/transaction
pub async fn transaction(
    State(state): State<ApiState>,
    body: Result<Json<TransactionArgs>, JsonRejection>,
) -> Response {
    run_json(state, body, Command::Transaction).await
}

/// POST /api/v1/state/migrate
pub async fn migrate(
    State(state): State<ApiState>,
    body: Result<Json<MigrateArgs>, JsonRejection>,
) -> Response {
    run_json(state, body, Command::Migrate).await
}

/// GET /api/v1/state/stats
pub async fn stats(State(state): State<ApiState>) -> Response {
    run(state, Command::Stats).await
}

// ── Legacy memories ────────────────────────────────────────────

/// POST /api/v1/memories
pub async fn remember(
    State(state): State<ApiState>,
    body: Result<Json<RememberArgs>, JsonRejection>,
) -> Response {
    run_json(state, body, Command::Remember).await
}
