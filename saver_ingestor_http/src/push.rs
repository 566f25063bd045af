use axum::response::{IntoResponse, Response};
use axum::{Json as JsonExtractor, extract::State, http::StatusCode, response::Json};
use saver_ingestor_core::Event;
use tracing::debug;

use crate::HttpIngestorState;
use crate::error::{HttpIngestorError, Result};
use crate::types::{ErrorResponse, EventPayload, PushRequest, PushResponse};

/// Handler for the /v1/events endpoint.
pub async fn push_handler(
    State(state): State<HttpIngestorState>,
    JsonExtractor(request): JsonExtractor<PushRequest>,
) -> impl IntoResponse {
    match process_push_request(&state, request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => map_error_to_response(err),
    }
}

/// Validates every event, then hands them to the ingestor in request order.
///
/// A request with a single invalid event is rejected as a whole.
async fn process_push_request(
    state: &HttpIngestorState,
    request: PushRequest,
) -> Result<PushResponse> {
    let events = request
        .events
        .into_iter()
        .enumerate()
        .map(|(index, payload)| parse_event(index, payload))
        .collect::<Result<Vec<_>>>()?;

    if state.batch_ingestion.is_closed() {
        return Err(HttpIngestorError::Unavailable {
            message: "ingestor is shutting down".to_string(),
        });
    }

    let accepted = events.len();
    for event in events {
        state.batch_ingestion.save(event).await;
    }

    debug!(accepted, "accepted events");

    Ok(PushResponse { accepted })
}

fn parse_event(index: usize, payload: EventPayload) -> Result<Event> {
    let data = payload
        .decode_data()
        .map_err(|err| HttpIngestorError::BadRequest {
            message: format!("event {index}: invalid base64 data: {err}"),
        })?;

    Event::new(payload.id, payload.group_id, data).map_err(|err| HttpIngestorError::BadRequest {
        message: format!("event {index}: {err}"),
    })
}

fn map_error_to_response(error: HttpIngestorError) -> Response {
    let status_code = match error {
        HttpIngestorError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        HttpIngestorError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    };

    let response = Json(ErrorResponse {
        message: error.to_string(),
    });

    (status_code, response).into_response()
}
