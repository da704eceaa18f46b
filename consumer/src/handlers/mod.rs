//! One event handler per [`EventKind`](atelier_core::event::EventKind).
//!
//! Handlers are constructor-injected with the repositories they write to and
//! are generic over the repository traits, so the same handler code runs
//! against Postgres in production and the in-memory fakes in tests.
//!
//! A shared discipline across all four:
//!
//! - Steps run strictly in sequence; there is no internal retry and no
//!   transaction spanning collections. A failure partway leaves earlier writes
//!   in place, and redelivery re-runs the handler from the top; every step is
//!   idempotent to make that safe.
//! - A missing prerequisite document is surfaced as
//!   [`HandlerError::SyncFault`](atelier_core::handler::HandlerError), never
//!   papered over by creating the document from partial event data.

pub mod image_processed;
pub mod image_uploaded;
pub mod processing_failed;
pub mod user_registered;

pub use image_processed::ImageProcessedHandler;
pub use image_uploaded::ImageUploadedHandler;
pub use processing_failed::ProcessingFailedHandler;
pub use user_registered::UserRegisteredHandler;
