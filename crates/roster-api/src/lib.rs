pub mod error;
pub mod users;

use axum::{
    Router,
    routing::{get, post},
};

pub use users::{AppState, AppStateInner};

/// Routes for registration, activation and lookup.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/users", post(users::register))
        .route("/users/activate", get(users::activate))
        .route("/users/{email}", get(users::get_user))
        .route("/health", get(users::health))
        .with_state(state)
}
