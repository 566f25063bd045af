//! HTTP ingestor server.
//!
//! This crate provides a server to ingest events over HTTP.
//!
//! The server is built using axum and provides
//! a `/v1/events` endpoint for event ingestion.

pub mod error;
pub mod push;
pub mod types;

pub use error::{HttpIngestorError, Result};
pub use types::{ErrorResponse, EventPayload, PushRequest, PushResponse};

use axum::{Router, routing::post};
use saver_ingestor_core::BatchIngestorClient;

use crate::push::push_handler;

/// HTTP ingestor server that receives events via HTTP POST requests.
pub struct HttpIngestor {
    state: HttpIngestorState,
}

#[derive(Clone)]
pub struct HttpIngestorState {
    batch_ingestion: BatchIngestorClient,
}

impl HttpIngestor {
    pub fn new(batch_ingestion: BatchIngestorClient) -> Self {
        let state = HttpIngestorState { batch_ingestion };
        Self { state }
    }

    pub fn into_router(self) -> Router {
        Router::new()
            .route("/v1/events", post(push_handler))
            .with_state(self.state)
    }
}
