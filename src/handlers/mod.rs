// handlers/mod.rs - route handlers
//
// Public (no auth): /, /health
// Protected (session required): /api/users/*

pub mod public;
pub mod users;

pub use public::{health, not_found, root};
