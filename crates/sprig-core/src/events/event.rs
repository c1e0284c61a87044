use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use crate::dom::NodeId;

/// An event travelling through the node tree or delivered to component
/// callbacks. Flags use interior mutability so listeners get `&Event`.
pub struct Event {
    kind: String,
    detail: Option<Rc<dyn Any>>,
    bubbles: bool,
    cancelable: bool,
    trusted: bool,
    target: Cell<Option<NodeId>>,
    current_target: Cell<Option<NodeId>>,
    default_prevented: Cell<bool>,
    propagation_stopped: Cell<bool>,
    immediate_stopped: Cell<bool>,
    in_passive: Cell<bool>,
}

impl Event {
    /// A bubbling, cancelable, trusted event, as user input produces.
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            detail: None,
            bubbles: true,
            cancelable: true,
            trusted: true,
            target: Cell::new(None),
            current_target: Cell::new(None),
            default_prevented: Cell::new(false),
            propagation_stopped: Cell::new(false),
            immediate_stopped: Cell::new(false),
            in_passive: Cell::new(false),
        }
    }

    /// A non-bubbling, untrusted event carrying `detail`.
    pub fn custom(kind: &str, detail: Option<Rc<dyn Any>>, cancelable: bool) -> Self {
        Self {
            detail,
            bubbles: false,
            cancelable,
            trusted: false,
            ..Self::new(kind)
        }
    }

    /// Marks the event as script-generated.
    pub fn untrusted(mut self) -> Self {
        self.trusted = false;
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn detail<T: 'static>(&self) -> Option<&T> {
        self.detail.as_deref().and_then(|d| d.downcast_ref::<T>())
    }

    pub fn bubbles(&self) -> bool {
        self.bubbles
    }

    pub fn cancelable(&self) -> bool {
        self.cancelable
    }

    pub fn is_trusted(&self) -> bool {
        self.trusted
    }

    pub fn target(&self) -> Option<NodeId> {
        self.target.get()
    }

    pub fn current_target(&self) -> Option<NodeId> {
        self.current_target.get()
    }

    pub(crate) fn set_target(&self, node: Option<NodeId>) {
        self.target.set(node);
    }

    pub(crate) fn set_current_target(&self, node: Option<NodeId>) {
        self.current_target.set(node);
    }

    /// Ignored for non-cancelable events and inside passive listeners.
    pub fn prevent_default(&self) {
        if self.in_passive.get() {
            log::debug!("prevent_default ignored inside a passive '{}' listener", self.kind);
            return;
        }
        if self.cancelable {
            self.default_prevented.set(true);
        }
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }

    pub fn stop_immediate_propagation(&self) {
        self.propagation_stopped.set(true);
        self.immediate_stopped.set(true);
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }

    pub fn immediate_propagation_stopped(&self) -> bool {
        self.immediate_stopped.get()
    }

    pub(crate) fn enter_listener(&self, passive: bool) {
        self.in_passive.set(passive);
    }

    pub(crate) fn leave_listener(&self) {
        self.in_passive.set(false);
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind)
            .field("bubbles", &self.bubbles)
            .field("cancelable", &self.cancelable)
            .field("trusted", &self.trusted)
            .field("default_prevented", &self.default_prevented.get())
            .finish()
    }
}
