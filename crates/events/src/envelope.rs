use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::event::Event;

/// Envelope for a published event.
///
/// Carries the metadata a consumer needs to route and deduplicate the event
/// (`event_id`, `event_type`, the id of the record it describes) next to the
/// payload itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,

    subject_id: Uuid,
    subject_type: String,

    event_type: String,
    event_version: u32,
    occurred_at: DateTime<Utc>,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        subject_id: Uuid,
        subject_type: impl Into<String>,
        event_type: impl Into<String>,
        event_version: u32,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            subject_id,
            subject_type: subject_type.into(),
            event_type: event_type.into(),
            event_version,
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    /// Id of the sale/batch/product the event is about.
    pub fn subject_id(&self) -> Uuid {
        self.subject_id
    }

    pub fn subject_type(&self) -> &str {
        &self.subject_type
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl EventEnvelope<JsonValue> {
    /// Wrap a typed event with a JSON payload, capturing its metadata.
    pub fn from_typed<T>(
        subject_id: Uuid,
        subject_type: impl Into<String>,
        event: &T,
    ) -> Result<Self, serde_json::Error>
    where
        T: Event + Serialize,
    {
        let payload = serde_json::to_value(event)?;
        Ok(Self::new(
            Uuid::now_v7(),
            subject_id,
            subject_type,
            event.event_type(),
            event.version(),
            event.occurred_at(),
            payload,
        ))
    }
}
