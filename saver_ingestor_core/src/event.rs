use bytes::Bytes;

use crate::error::{Result, ValidationSnafu};

/// A single event, the unit clients push into the ingestor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Caller-assigned identifier. Storage deduplicates on it.
    pub id: String,
    /// The batching key.
    pub group_id: String,
    /// Opaque payload.
    pub data: Bytes,
}

impl Event {
    /// Creates a new event, rejecting empty ids and group ids.
    pub fn new(
        id: impl Into<String>,
        group_id: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Result<Self> {
        let event = Self {
            id: id.into(),
            group_id: group_id.into(),
            data: data.into(),
        };

        event.validate()?;

        Ok(event)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return ValidationSnafu {
                message: "event id must not be empty",
            }
            .fail();
        }

        if self.group_id.is_empty() {
            return ValidationSnafu {
                message: format!("event {} has an empty group id", self.id),
            }
            .fail();
        }

        Ok(())
    }
}
