//! HTTP interface: notes and chat.

mod handlers;
pub mod types;

pub use handlers::create_router;

use axum::http::HeaderValue;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::notes::NoteStore;
use crate::workflow::Workflow;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The chat workflow, built once at startup.
    pub workflow: Arc<Workflow>,
    /// Note storage.
    pub notes: Arc<dyn NoteStore>,
}

impl AppState {
    /// Bundle the workflow and note store for the router.
    pub fn new(workflow: Arc<Workflow>, notes: Arc<dyn NoteStore>) -> Self {
        Self { workflow, notes }
    }
}

/// CORS layer allowing `origins` with any method and header.
///
/// Origins that are not valid header values are skipped with a warning.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}
