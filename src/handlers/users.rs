// handlers/users.rs - /api/users route group
//
// Every route here sits behind `require_auth`.

use axum::{middleware::from_fn, routing::get, Extension, Json, Router};

use crate::auth::Identity;
use crate::middleware::require_auth;

pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/me", get(me))
        .route_layer(from_fn(require_auth))
}

/// GET /api/users/me - the caller's own identity
pub async fn me(Extension(identity): Extension<Identity>) -> Json<Identity> {
    Json(identity)
}
