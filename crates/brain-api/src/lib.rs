//! brain-api: command surface and REST API for the Brain state store.
//!
//! [`commands`] defines the typed commands and the synchronous dispatcher;
//! [`handlers`] exposes them over HTTP with axum.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/commands` | Run any command from a `{command, args}` envelope |
//! | POST | `/api/v1/state/set` | Create or update an entry |
//! | GET | `/api/v1/state/get?key=&category=` | Fetch an entry |
//! | GET | `/api/v1/state/list?category=&limit=` | List entries, newest first |
//! | POST | `/api/v1/state/delete` | Delete an entry |
//! | POST | `/api/v1/state/clear` | Clear a volatile category |
//! | POST | `/api/v1/state/transaction` | Apply a batch atomically |
//! | POST | `/api/v1/state/migrate` | Migrate legacy memories |
//! | GET | `/api/v1/state/stats` | Entry counts |
//! | POST | `/api/v1/memories` | Store a legacy memory |

pub mod commands;
pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use brain_core::StateConfig;
use brain_state::StateStore;

pub use commands::{Command, CommandOutput, execute};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub limits: StateConfig,
}

/// Build the complete API router.
pub fn build_router(store: StateStore, limits: StateConfig) -> Router {
    let api_state = ApiState { store, limits };

    let state_routes = Router::new()
        .route("/set", post(handlers::set))
        .route("/get", get(handlers::get))
        .route("/list", get(handlers::list))
        .route("/delete", post(handlers::delete))
        .route("/clear", post(handlers::clear))
        .route("/transaction", post(handlers::transaction))
        .route("/migrate", post(handlers::migrate))
        .route("/stats", get(handlers::stats));

    let api_routes = Router::new()
        .route("/commands", post(handlers::command))
        .route("/memories", post(handlers::remember))
        .nest("/state", state_routes)
        .with_state(api_state);

    Router::new().nest("/api/v1", api_routes)
}
