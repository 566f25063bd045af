use clap::Parser;
use saver_push_client::HttpPushClient;
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

use crate::error::{CliError, IoSnafu, PushClientSnafu, Result};

/// Push events to a running service
#[derive(Parser)]
pub struct PushArgs {
    /// Events to push in the format: <group_id> <payload>
    ///
    /// - group_id: required, the batching key of the event
    /// - payload: required, the event data or @file_path for a file containing it
    ///
    /// Every event gets a new ULID as its id.
    events: Vec<String>,

    /// Push each event this many times, each time with a new id.
    #[arg(long, default_value = "1")]
    repeat: usize,

    /// The address of the HTTP ingestor server.
    #[arg(long, env = "APP_PUSH_ADDRESS", default_value = "http://127.0.0.1:3000")]
    http_address: String,
}

impl PushArgs {
    pub async fn run(self, _ct: CancellationToken) -> Result<()> {
        let events = self.parse_events()?;
        let client = HttpPushClient::new(self.http_address.clone());

        let mut request = client.push();
        for _ in 0..self.repeat {
            for (group_id, data) in &events {
                request = request.event(Ulid::new().to_string(), group_id, data);
            }
        }

        if request.is_empty() {
            println!("Nothing to push");
            return Ok(());
        }

        let response = request.send().await.context(PushClientSnafu {})?;
        println!("Accepted {} events", response.accepted);

        Ok(())
    }

    fn parse_events(&self) -> Result<Vec<(String, Vec<u8>)>> {
        if self.events.len() % 2 != 0 {
            return Err(CliError::InvalidArgument {
                name: "event",
                message: "Each event requires a group_id and a payload".to_string(),
            });
        }

        self.events
            .chunks(2)
            .map(|pair| {
                let group_id = pair[0].clone();
                let data = parse_payload(&pair[1])?;
                Ok((group_id, data))
            })
            .collect()
    }
}

fn parse_payload(payload_str: &str) -> Result<Vec<u8>> {
    if let Some(file_path) = payload_str.strip_prefix('@') {
        std::fs::read(file_path).context(IoSnafu {})
    } else {
        Ok(payload_str.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_args(args: &[&str]) -> PushArgs {
        PushArgs::try_parse_from(std::iter::once("push").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_events() {
        let args = push_args(&["1", "hello", "2", "world"]);

        let events = args.parse_events().unwrap();
        assert_eq!(
            events,
            vec![
                ("1".to_string(), b"hello".to_vec()),
                ("2".to_string(), b"world".to_vec()),
            ]
        );
    }

    #[test]
    fn test_reject_missing_payload() {
        let args = push_args(&["1", "hello", "2"]);

        let err = args.parse_events().unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument { .. }));
    }
}
