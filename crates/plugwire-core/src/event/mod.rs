//! # Plugwire Event System
//!
//! Synchronous notifications about discovery and loading. Handlers are
//! registered on an [`EventDispatcher`] either by event name or by concrete
//! event type, and run in registration order on the thread that triggered the
//! event.
pub mod dispatcher;
pub mod types;

use std::any::Any;
use std::fmt;

/// Type for event identifiers
pub type EventId = u64;

/// Result of event processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResult {
    /// Event was processed successfully and propagation should continue
    Continue,
    /// Event was processed and propagation should stop
    Stop,
}

/// Core event trait
pub trait Event: Any + fmt::Debug + Send + Sync {
    /// Get the name of this event
    fn name(&self) -> &'static str;

    /// Cast to Any for downcasting
    fn as_any(&self) -> &dyn Any;
}

/// Handler invoked with every event it was registered for
pub type EventHandler = Box<dyn Fn(&dyn Event) -> EventResult + Send + Sync>;

pub use dispatcher::EventDispatcher;
pub use types::PluginEvent;
