//! Request and response types for the HTTP ingestor events endpoint.

use base64::{DecodeError, Engine, prelude::BASE64_STANDARD};
use serde::{Deserialize, Serialize};

/// Request payload for the /v1/events endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    /// Events to ingest, in order.
    pub events: Vec<EventPayload>,
}

/// A single event on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventPayload {
    pub id: String,
    pub group_id: String,
    /// Base64 encoded payload.
    pub data: String,
}

/// Response payload for the /v1/events endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushResponse {
    /// Number of events handed to the ingestor.
    pub accepted: usize,
}

/// Response payload for errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub message: String,
}

impl EventPayload {
    /// Creates a payload, encoding `data` as base64.
    pub fn new(id: impl Into<String>, group_id: impl Into<String>, data: &[u8]) -> Self {
        Self {
            id: id.into(),
            group_id: group_id.into(),
            data: BASE64_STANDARD.encode(data),
        }
    }

    pub fn decode_data(&self) -> Result<Vec<u8>, DecodeError> {
        BASE64_STANDARD.decode(&self.data)
    }
}
