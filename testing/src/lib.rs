//! In-memory fakes for the Atelier query service.
//!
//! Everything here implements the same traits as the production Postgres and
//! Redpanda backends, with the same edge semantics (upsert stomping, `None`
//! on missing documents, set-on-insert statistics initialization), so handler
//! and consumer tests run deterministically without infrastructure.

pub mod bus;
pub mod dead_letter;
pub mod read_model;

pub use bus::{InMemoryEventBus, PublishedMessage};
pub use dead_letter::InMemoryDeadLetters;
pub use read_model::{InMemoryImageStatistics, InMemoryProcessedImages, InMemoryUserProfiles};
