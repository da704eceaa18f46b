//! Consumer side of the Atelier query service.
//!
//! Ties the pieces together: one [`handlers`] module per event kind, a
//! [`registry::HandlerRegistry`] for dispatch, and the [`consumer`] state
//! machine that decides per message between ack, requeue, and dead-letter.
//! The `atelier-query` binary in `main.rs` is the composition root.

pub mod config;
pub mod consumer;
pub mod handlers;
pub mod instrument;
pub mod registry;

pub use config::Config;
pub use consumer::{Disposition, EventConsumer};
pub use registry::HandlerRegistry;
