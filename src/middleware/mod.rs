pub mod auth;

pub use auth::{attach_auth_context, require_auth, AuthContext};
