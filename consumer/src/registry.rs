//! Event-kind to handler routing table.

use atelier_core::event::EventKind;
use atelier_core::handler::EventHandler;
use std::collections::HashMap;
use std::sync::Arc;

/// Routes decoded events to the handler registered for their kind.
///
/// Registration happens once at startup in the composition root; the registry
/// is immutable afterwards and shared behind the consumer.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own [`EventHandler::kind`].
    ///
    /// Registering a second handler for the same kind replaces the first.
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        let kind = handler.kind();
        if self.handlers.insert(kind, handler).is_some() {
            tracing::warn!(kind = %kind, "Replaced existing handler registration");
        }
    }

    /// Look up the handler for a kind.
    #[must_use]
    pub fn get(&self, kind: EventKind) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(&kind)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::event::DomainEvent;
    use atelier_core::handler::HandlerError;
    use std::future::Future;
    use std::pin::Pin;

    struct Accepting(EventKind);

    impl EventHandler for Accepting {
        fn kind(&self) -> EventKind {
            self.0
        }

        fn handle(
            &self,
            _event: DomainEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn routes_by_kind() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(Accepting(EventKind::ImageUploaded)));
        registry.register(Arc::new(Accepting(EventKind::ImageProcessed)));

        assert_eq!(registry.len(), 2);
        assert!(registry.get(EventKind::ImageUploaded).is_some());
        assert!(registry.get(EventKind::UserRegistered).is_none());
    }

    #[test]
    fn re_registration_replaces() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(Accepting(EventKind::UserRegistered)));
        registry.register(Arc::new(Accepting(EventKind::UserRegistered)));
        assert_eq!(registry.len(), 1);
    }
}
