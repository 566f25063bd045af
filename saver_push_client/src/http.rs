//! HTTP client for pushing events to the ingestor.

use reqwest::StatusCode;
use saver_ingestor_http::types::{ErrorResponse, EventPayload, PushRequest, PushResponse};
use snafu::{ResultExt, Snafu};

/// A client for pushing events over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPushClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Snafu)]
pub enum HttpPushClientError {
    #[snafu(display("Request error"))]
    Request { source: reqwest::Error },
    #[snafu(display("Response error: status={status}, message={message}"))]
    Response { status: StatusCode, message: String },
}

pub type Result<T, E = HttpPushClientError> = std::result::Result<T, E>;

impl HttpPushClient {
    /// Create a new HTTP push client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Start building a push request.
    pub fn push(&self) -> PushRequestBuilder {
        PushRequestBuilder::new(self.client.clone(), self.base_url.clone())
    }
}

/// Builder for constructing push requests.
#[derive(Debug)]
pub struct PushRequestBuilder {
    client: reqwest::Client,
    base_url: String,
    events: Vec<EventPayload>,
}

impl PushRequestBuilder {
    fn new(client: reqwest::Client, base_url: String) -> Self {
        Self {
            client,
            base_url,
            events: Vec::new(),
        }
    }

    /// Add an event to the request. Events are ingested in the order they are added.
    pub fn event(
        mut self,
        id: impl Into<String>,
        group_id: impl Into<String>,
        data: impl AsRef<[u8]>,
    ) -> Self {
        self.events.push(EventPayload::new(id, group_id, data.as_ref()));
        self
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Send the push request to the server.
    pub async fn send(self) -> Result<PushResponse> {
        let request = PushRequest {
            events: self.events,
        };

        let url = format!("{}/v1/events", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context(RequestSnafu {})?;

        if response.status().is_success() {
            return response
                .json::<PushResponse>()
                .await
                .context(RequestSnafu {});
        }

        let status = response.status();
        let body = response
            .json::<ErrorResponse>()
            .await
            .context(RequestSnafu {})?;

        Err(HttpPushClientError::Response {
            status,
            message: body.message,
        })
    }
}
