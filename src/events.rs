use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::dom::NodeId;
use crate::{Document, Result};

/// Event passed to listeners while it travels from the target up to the document.
#[derive(Clone)]
pub struct Event {
    pub event_type: String,
    pub target: NodeId,
    pub current_target: NodeId,
    pub bubbles: bool,
    pub cancelable: bool,
    detail: Option<Rc<dyn Any>>,
    pub(crate) default_prevented: bool,
    pub(crate) propagation_stopped: bool,
}

impl Event {
    pub(crate) fn new(event_type: &str, target: NodeId) -> Self {
        Self {
            event_type: event_type.to_string(),
            target,
            current_target: target,
            bubbles: true,
            cancelable: true,
            detail: None,
            default_prevented: false,
            propagation_stopped: false,
        }
    }

    pub(crate) fn with_detail(mut self, detail: Option<Rc<dyn Any>>) -> Self {
        self.detail = detail;
        self
    }

    pub(crate) fn non_bubbling(mut self) -> Self {
        self.bubbles = false;
        self.cancelable = false;
        self
    }

    /// Payload attached by `trigger`, if it has type `T`.
    pub fn detail<T: Any>(&self) -> Option<&T> {
        self.detail.as_deref().and_then(|detail| detail.downcast_ref())
    }

    pub fn prevent_default(&mut self) {
        if self.cancelable {
            self.default_prevented = true;
        }
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("event_type", &self.event_type)
            .field("target", &self.target)
            .field("current_target", &self.current_target)
            .field("bubbles", &self.bubbles)
            .field("has_detail", &self.detail.is_some())
            .field("default_prevented", &self.default_prevented)
            .field("propagation_stopped", &self.propagation_stopped)
            .finish()
    }
}

type HandlerFn = dyn Fn(&Document, &mut Event) -> Result<()>;

/// Listener callback. Clones share identity, so the handle passed to `on` is the one
/// `off` removes.
#[derive(Clone)]
pub struct EventHandler(Rc<HandlerFn>);

impl EventHandler {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Document, &mut Event) -> Result<()> + 'static,
    {
        Self(Rc::new(handler))
    }

    pub(crate) fn call(&self, doc: &Document, event: &mut Event) -> Result<()> {
        (self.0)(doc, event)
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for EventHandler {}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler({:p})", Rc::as_ptr(&self.0))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Listener {
    pub(crate) handler: EventHandler,
    pub(crate) once: bool,
}

#[derive(Debug, Default)]
pub(crate) struct ListenerStore {
    map: HashMap<NodeId, HashMap<String, Vec<Listener>>>,
}

impl ListenerStore {
    pub(crate) fn add(&mut self, node_id: NodeId, event: String, listener: Listener) {
        let listeners = self
            .map
            .entry(node_id)
            .or_default()
            .entry(event)
            .or_default();

        // Re-registering the same handler for the same type is a no-op.
        if listeners
            .iter()
            .any(|existing| existing.handler == listener.handler)
        {
            return;
        }
        listeners.push(listener);
    }

    pub(crate) fn remove(&mut self, node_id: NodeId, event: &str, handler: &EventHandler) -> bool {
        let Some(events) = self.map.get_mut(&node_id) else {
            return false;
        };
        let Some(listeners) = events.get_mut(event) else {
            return false;
        };

        let Some(pos) = listeners
            .iter()
            .position(|listener| listener.handler == *handler)
        else {
            return false;
        };
        listeners.remove(pos);
        if listeners.is_empty() {
            events.remove(event);
        }
        if events.is_empty() {
            self.map.remove(&node_id);
        }
        true
    }

    /// Snapshot of the listeners registered at dispatch time.
    pub(crate) fn get(&self, node_id: NodeId, event: &str) -> Vec<Listener> {
        self.map
            .get(&node_id)
            .and_then(|events| events.get(event))
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, node_id: NodeId, event: &str) -> usize {
        self.map
            .get(&node_id)
            .and_then(|events| events.get(event))
            .map_or(0, Vec::len)
    }
}
