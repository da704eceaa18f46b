//! # Atelier Core
//!
//! Core traits and types for the Atelier query service: the read-model side
//! of an image-processing platform split into command/query services that
//! communicate over a message broker.
//!
//! This crate defines the contracts; implementations live elsewhere:
//!
//! - [`event`]: canonical domain events and the event-type alias registry
//! - [`envelope`]: JSON envelope parsing and field-name normalization
//! - [`event_bus`]: broker abstraction ([`event_bus::EventBus`])
//! - [`read_model`]: collection models and repository traits
//! - [`handler`]: per-kind handler trait and the handler error taxonomy
//! - [`dead_letter`]: storage for messages that exhausted delivery
//!
//! ```text
//! broker message ──▶ envelope::parse ──▶ DomainEvent ──▶ EventHandler
//!                                                           │
//!                                   read_model repositories ◀┘
//! ```

pub mod dead_letter;
pub mod envelope;
pub mod event;
pub mod event_bus;
pub mod handler;
pub mod read_model;

pub use chrono::{DateTime, Utc};
