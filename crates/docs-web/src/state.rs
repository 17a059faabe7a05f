use std::sync::Arc;

use docs_core::orchestrator::Orchestrator;

/// Shared axum state: a single `Orchestrator` behind an `Arc`, matching
/// the Orchestrator's own internal synchronization (it is cheaply clonable
/// by reference, never cloned by value).
#[derive(Clone)]
pub struct WebState {
    pub orchestrator: Arc<Orchestrator>,
}

impl WebState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}
