use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::{AuthError, Identity, IdentityResolver};
use crate::error::{ApiError, UNAUTHORIZED_MESSAGE};

/// Outcome of identity resolution, attached to every request by [`attach_auth_context`]
#[derive(Clone, Debug)]
pub struct AuthContext {
    outcome: Result<Option<Identity>, AuthError>,
}

impl AuthContext {
    pub fn signed_in(identity: Identity) -> Self {
        Self { outcome: Ok(Some(identity)) }
    }

    pub fn signed_out() -> Self {
        Self { outcome: Ok(None) }
    }

    pub fn failed(error: AuthError) -> Self {
        Self { outcome: Err(error) }
    }

    /// Read the context a request carries. Errors if the session middleware never ran.
    pub fn from_request(request: &Request) -> Result<Option<Identity>, AuthError> {
        let context = request
            .extensions()
            .get::<AuthContext>()
            .ok_or(AuthError::ContextMissing)?;
        context.outcome.clone()
    }
}

/// Session middleware: resolve the caller once and attach the result.
///
/// Never rejects a request. Anonymous requests continue to routes that are not gated.
pub async fn attach_auth_context(
    State(resolver): State<Arc<dyn IdentityResolver>>,
    mut request: Request,
    next: Next,
) -> Response {
    let context = match resolver.resolve(request.headers()).await {
        Ok(Some(identity)) => AuthContext::signed_in(identity),
        Ok(None) => AuthContext::signed_out(),
        Err(e) => AuthContext::failed(e),
    };
    request.extensions_mut().insert(context);
    next.run(request).await
}

/// Authorization gate: downstream handlers only run for signed-in callers.
///
/// The resolved [`Identity`] is inserted into request extensions for handlers
/// to extract with `Extension<Identity>`.
pub async fn require_auth(mut request: Request, next: Next) -> Response {
    match AuthContext::from_request(&request) {
        Ok(Some(identity)) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Ok(None) => ApiError::unauthorized(UNAUTHORIZED_MESSAGE).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}
