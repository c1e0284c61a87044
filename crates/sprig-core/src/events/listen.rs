use std::any::Any;
use std::rc::Rc;

use super::{Event, Handler, ListenerOptions, ListenerPlan};
use crate::component::Component;
use crate::dom::{Dom, NodeId};
use crate::effects::Dispose;

/// Anything a listener can be attached to: a DOM element or a component.
pub trait EventTarget {
    fn listen(&self, event: &str, handler: Handler, options: ListenerOptions) -> Dispose;
}

/// An element of a [`Dom`] as an event target.
#[derive(Clone, Debug)]
pub struct ElementTarget {
    dom: Dom,
    node: NodeId,
}

impl ElementTarget {
    pub fn new(dom: &Dom, node: NodeId) -> Self {
        Self {
            dom: dom.clone(),
            node,
        }
    }
}

impl EventTarget for ElementTarget {
    fn listen(&self, event: &str, handler: Handler, options: ListenerOptions) -> Dispose {
        let id = self.dom.add_listener(self.node, event, handler, options);
        let dom = self.dom.clone();
        let node = self.node;
        Dispose::new(move || dom.remove_listener(node, id))
    }
}

impl EventTarget for Component {
    fn listen(&self, event: &str, handler: Handler, options: ListenerOptions) -> Dispose {
        self.on(event, handler, options)
    }
}

/// Attaches `handler` to a DOM element with the guards and options of `plan`.
pub fn listen(dom: &Dom, node: NodeId, event: &str, handler: Handler, plan: &ListenerPlan) -> Dispose {
    ElementTarget::new(dom, node).listen(event, plan.wrap(handler), plan.options)
}

/// Attaches `handler` to a component's callbacks. A missing handler attaches
/// nothing.
pub fn listen_component(
    component: &Component,
    event: &str,
    handler: Option<Handler>,
    plan: &ListenerPlan,
) -> Dispose {
    match handler {
        Some(handler) => component.on(event, plan.wrap(handler), plan.options),
        None => Dispose::noop(),
    }
}

/// Dispatches component events to the callbacks registered with
/// [`Component::on`].
#[derive(Clone)]
pub struct EventDispatcher {
    component: Component,
}

impl EventDispatcher {
    /// Sends a non-bubbling custom event. Returns `false` only when a
    /// callback cancelled a cancelable event.
    pub fn dispatch(&self, kind: &str, detail: Option<Rc<dyn Any>>, cancelable: bool) -> bool {
        if self.component.registry().callback_count(kind) == 0 {
            return true;
        }
        let event = Event::custom(kind, detail, cancelable);
        self.component.registry().emit(&event);
        !event.default_prevented()
    }
}

pub fn create_event_dispatcher(component: &Component) -> EventDispatcher {
    EventDispatcher {
        component: component.clone(),
    }
}
