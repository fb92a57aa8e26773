use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use crate::event::{Event, EventHandler, EventId, EventResult};

/// Event dispatcher for registering handlers and dispatching events
pub struct EventDispatcher {
    handlers: HashMap<&'static str, Vec<(EventId, EventHandler)>>,
    type_handlers: HashMap<TypeId, Vec<(EventId, EventHandler)>>,
    next_handler_id: EventId,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name_handler_count: usize = self.handlers.values().map(|v| v.len()).sum();
        let type_handler_count: usize = self.type_handlers.values().map(|v| v.len()).sum();
        f.debug_struct("EventDispatcher")
            .field("name_handlers_count", &name_handler_count)
            .field("type_handlers_count", &type_handler_count)
            .field("next_handler_id", &self.next_handler_id)
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            type_handlers: HashMap::new(),
            next_handler_id: 1,
        }
    }

    fn next_id(&mut self) -> EventId {
        let id = self.next_handler_id;
        self.next_handler_id += 1;
        id
    }

    /// Register a handler for every event whose [`Event::name`] is `event_name`
    pub fn register_handler<F>(&mut self, event_name: &'static str, handler: F) -> EventId
    where
        F: Fn(&dyn Event) -> EventResult + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.handlers
            .entry(event_name)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Register a handler for every event of concrete type `E`
    pub fn register_type_handler<E, F>(&mut self, handler: F) -> EventId
    where
        E: Event + 'static,
        F: Fn(&E) -> EventResult + Send + Sync + 'static,
    {
        let id = self.next_id();
        let handler: EventHandler = Box::new(move |event: &dyn Event| {
            match event.as_any().downcast_ref::<E>() {
                Some(e) => handler(e),
                None => EventResult::Continue,
            }
        });
        self.type_handlers
            .entry(TypeId::of::<E>())
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove a handler. Returns false if no handler had that id.
    pub fn unregister_handler(&mut self, id: EventId) -> bool {
        let mut found = false;
        for handlers in self.handlers.values_mut().chain(self.type_handlers.values_mut()) {
            let len_before = handlers.len();
            handlers.retain(|(h_id, _)| *h_id != id);
            if handlers.len() < len_before {
                found = true;
            }
        }
        found
    }

    /// Run name handlers, then type handlers, until one returns
    /// [`EventResult::Stop`].
    pub fn dispatch(&self, event: &dyn Event) -> EventResult {
        log::trace!("Dispatching event '{}'", event.name());
        let by_name = self.handlers.get(event.name()).into_iter().flatten();
        let by_type = self
            .type_handlers
            .get(&event.as_any().type_id())
            .into_iter()
            .flatten();

        for (_, handler) in by_name.chain(by_type) {
            if handler(event) == EventResult::Stop {
                return EventResult::Stop;
            }
        }
        EventResult::Continue
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.values().chain(self.type_handlers.values()).map(Vec::len).sum()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
