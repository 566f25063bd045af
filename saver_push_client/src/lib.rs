mod http;

pub use self::http::{HttpPushClient, HttpPushClientError, PushRequestBuilder, Result};
