//! Event envelope parsing and normalization.
//!
//! Every broker message is a JSON envelope:
//!
//! ```json
//! { "eventType": "ImageUploadedEvent", "data": { ... }, "timestamp": "2026-08-23T10:15:00Z" }
//! ```
//!
//! Legacy producers spell the type field `type` or `status` and the data field
//! `payload`; [`EventEnvelope::parse`] accepts all of them. The optional
//! `deliveryCount` field is written by this service when it requeues a message
//! by republishing, so redelivery state survives the round trip through the
//! broker.
//!
//! Normalization happens once, here. Downstream code deals only in
//! [`EventEnvelope`] and [`DomainEvent`].

use crate::event::{DomainEvent, EventKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Errors produced while turning raw bytes into a [`DomainEvent`].
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The message is not a well-formed envelope (bad JSON, wrong shape,
    /// missing type field). Not retryable.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// The envelope is well-formed but names an event type this service does
    /// not know. Policy for these is drop-and-ack, decided by the consumer.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// The event type is known but the payload is missing required fields or
    /// has the wrong shape. Not retryable.
    #[error("invalid {kind} payload: {source}")]
    Payload {
        /// The kind whose payload failed to decode.
        kind: EventKind,
        /// Underlying serde error.
        source: serde_json::Error,
    },
}

/// A parsed, normalized broker message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Raw event-type string as sent by the producer.
    #[serde(rename = "eventType", alias = "type", alias = "status")]
    pub event_type: String,

    /// Event payload, decoded lazily via [`EventEnvelope::decode`].
    #[serde(default, alias = "payload")]
    pub data: serde_json::Value,

    /// Producer-side timestamp; drives the read-model lag histogram.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// How many times this message has been requeued by the consumer.
    #[serde(default, rename = "deliveryCount", alias = "delivery_count")]
    pub delivery_count: u32,
}

impl EventEnvelope {
    /// Wrap a domain event in a fresh envelope with the canonical type name.
    ///
    /// Used by tests and by producers embedded in this workspace.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Malformed`] if the payload cannot be
    /// serialized, which does not happen for well-formed events.
    pub fn new(event: &DomainEvent) -> Result<Self, EnvelopeError> {
        let data = event
            .to_data()
            .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        Ok(Self {
            event_type: event.kind().as_str().to_string(),
            data,
            timestamp: Some(Utc::now()),
            delivery_count: 0,
        })
    }

    /// Parse a raw broker message.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Malformed`] when the bytes are not a JSON
    /// envelope carrying an event-type field.
    pub fn parse(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }

    /// Resolve the event-type string to a kind.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::UnknownEventType`] for unrecognized types.
    pub fn kind(&self) -> Result<EventKind, EnvelopeError> {
        EventKind::parse(&self.event_type)
            .ok_or_else(|| EnvelopeError::UnknownEventType(self.event_type.clone()))
    }

    /// Decode the payload into a canonical [`DomainEvent`].
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::UnknownEventType`] for unrecognized types and
    /// [`EnvelopeError::Payload`] when required fields are missing.
    pub fn decode(&self) -> Result<DomainEvent, EnvelopeError> {
        let kind = self.kind()?;
        DomainEvent::from_kind_and_data(kind, self.data.clone())
            .map_err(|source| EnvelopeError::Payload { kind, source })
    }

    /// Copy of this envelope with the delivery count bumped, for requeueing.
    #[must_use]
    pub fn for_redelivery(&self) -> Self {
        Self {
            delivery_count: self.delivery_count + 1,
            ..self.clone()
        }
    }

    /// Serialize back to wire bytes with canonical field names.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Malformed`] if serialization fails, which does
    /// not happen for envelopes built by this crate.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::event::Style;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn parses_canonical_envelope() {
        let bytes = serde_json::to_vec(&json!({
            "eventType": "UserRegisteredEvent",
            "data": {
                "userId": "user-1",
                "email": "a@example.com",
                "fullName": "Ada Example",
                "firebaseUid": "fb-1",
            },
            "timestamp": "2026-08-23T10:15:00Z",
        }))
        .unwrap();

        let envelope = EventEnvelope::parse(&bytes).unwrap();
        assert_eq!(envelope.kind().unwrap(), EventKind::UserRegistered);
        assert_eq!(envelope.delivery_count, 0);
        assert!(envelope.timestamp.is_some());

        let DomainEvent::UserRegistered(event) = envelope.decode().unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(event.user_id, "user-1");
    }

    #[test]
    fn parses_legacy_type_and_payload_fields() {
        let bytes = serde_json::to_vec(&json!({
            "type": "image.uploaded",
            "payload": {
                "imageId": "img-1",
                "userId": "user-1",
                "originalUrl": "https://cdn.example.com/raw.jpg",
                "style": "anime",
                "size": 2048,
                "userEmail": "a@example.com",
            },
        }))
        .unwrap();

        let envelope = EventEnvelope::parse(&bytes).unwrap();
        let DomainEvent::ImageUploaded(event) = envelope.decode().unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(event.style, Style::Anime);
        assert_eq!(event.image_id, "img-1");
    }

    #[test]
    fn unknown_event_type_is_distinct_from_malformed() {
        let bytes = serde_json::to_vec(&json!({
            "eventType": "SomethingNew",
            "data": {},
        }))
        .unwrap();

        let envelope = EventEnvelope::parse(&bytes).unwrap();
        assert!(matches!(
            envelope.decode(),
            Err(EnvelopeError::UnknownEventType(t)) if t == "SomethingNew"
        ));
    }

    #[test]
    fn missing_required_payload_field_is_a_payload_error() {
        let bytes = serde_json::to_vec(&json!({
            "eventType": "ImageProcessedEvent",
            "data": { "imageId": "img-1" },
        }))
        .unwrap();

        let envelope = EventEnvelope::parse(&bytes).unwrap();
        assert!(matches!(
            envelope.decode(),
            Err(EnvelopeError::Payload { kind: EventKind::ImageProcessed, .. })
        ));
    }

    #[test]
    fn garbage_bytes_are_malformed() {
        assert!(matches!(
            EventEnvelope::parse(b"not json at all"),
            Err(EnvelopeError::Malformed(_))
        ));
    }

    #[test]
    fn redelivery_bumps_count_and_survives_roundtrip() {
        let event = DomainEvent::ProcessingFailed(crate::event::ProcessingFailed {
            image_id: "img-1".to_string(),
            user_id: "user-1".to_string(),
            error: "model timeout".to_string(),
        });
        let envelope = EventEnvelope::new(&event).unwrap();
        let requeued = envelope.for_redelivery();
        assert_eq!(requeued.delivery_count, 1);

        let reparsed = EventEnvelope::parse(&requeued.to_bytes().unwrap()).unwrap();
        assert_eq!(reparsed.delivery_count, 1);
        assert_eq!(reparsed.decode().unwrap(), event);
    }

    proptest! {
        // Arbitrary type strings must never panic and only resolve to a kind
        // when they are in the alias table.
        #[test]
        fn arbitrary_event_types_never_panic(event_type in ".{0,64}") {
            let bytes = serde_json::to_vec(&json!({
                "eventType": event_type,
                "data": {},
            })).unwrap();
            let envelope = EventEnvelope::parse(&bytes).unwrap();
            let known = EventKind::parse(&event_type).is_some();
            prop_assert_eq!(envelope.kind().is_ok(), known);
        }
    }
}
