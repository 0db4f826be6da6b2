//! HTTP API handlers for tasex-panel

pub mod auth;
pub mod health;
pub mod owner;
pub mod session;
pub mod tasting;

pub use auth::owner_auth_middleware;
pub use health::health_routes;
pub use session::AnonymousSession;
