pub mod handlers;
pub mod repo;

use crate::state::AppState;
use axum::Router;

pub fn admin_router() -> Router<AppState> {
    handlers::admin_routes()
}
