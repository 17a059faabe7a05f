//! The HTTP+SSE surface over the docs orchestrator (§6): one axum route
//! per `Orchestrator` operation, plus a per-connection SSE subscription
//! onto the `EventBus`.

pub mod error;
pub mod model;
pub mod routes;
pub mod server;
pub mod state;

pub use error::WebError;
pub use routes::router;
pub use server::run_web_server;
pub use state::WebState;
