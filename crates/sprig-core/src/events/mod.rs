//! Events: the event object, modifiers, listener attachment and the
//! per-component bubble registry.

mod event;
mod listen;
mod modifiers;
mod pattern;
mod registry;

use std::rc::Rc;

use thiserror::Error;

pub use event::Event;
pub use listen::{
    ElementTarget, EventDispatcher, EventTarget, create_event_dispatcher, listen, listen_component,
};
pub use modifiers::{Guard, ListenerFlag, ListenerPlan, Modifier, ModifierEffect};
pub use pattern::{EventPattern, is_valid_wildcard_alias};
pub use registry::{
    BubbleFactory, CallbackId, EventRegistry, bubble, on_event_listener, register,
    restart_all_callbacks,
};

pub type Handler = Rc<dyn Fn(&Event)>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ListenerOptions {
    pub capture: bool,
    pub once: bool,
    /// `None` leaves the platform default.
    pub passive: Option<bool>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error(
        "invalid event pattern {pattern:?}: `*` must appear once, at the start or end of the name, or be the whole name"
    )]
    InvalidPattern { pattern: String },
    #[error("cannot forward {event:?} as {alias:?}: a wildcard alias requires forwarding `*`, and forwarding `*` requires a wildcard alias")]
    InvalidAlias { event: String, alias: String },
    #[error("unknown event modifier {0:?}")]
    UnknownModifier(String),
}
