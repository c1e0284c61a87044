//! Compatibility shims for components written against the v4 API: the
//! class-style instance methods, `on:` directives on components, named
//! slots and imports that act as reactive state.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::rc::Rc;

use thiserror::Error;

use crate::component::Component;
use crate::config::options;
use crate::dev::{Advisory, report};
use crate::effects::Dispose;
use crate::events::{Event, Handler, ListenerOptions};
use crate::hydration::Anchor;
use crate::signal::Signal;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LegacyError {
    #[error("{parent} called `{method}` on an instance of {component}, which is no longer valid")]
    ComponentApiChanged {
        parent: String,
        method: &'static str,
        component: String,
    },
    #[error(
        "attempted to instantiate {component} with `new {name}`, which is no longer valid; enable `component_api_v4` to keep the class-style API"
    )]
    ComponentApiInvalidNew { component: String, name: String },
    #[error("Cannot use on:{event} on this component.")]
    EventsDisabled { event: String },
    #[error("Cannot use both on:{event} and on{event}.")]
    DirectiveAndProp { event: String },
    #[error("Illegal slot \"{name}\"")]
    IllegalSlot { name: String },
    #[error("Illegal directive \"on:{name}\"")]
    IllegalDirective { name: String },
    #[error("Invalid slot=\"{name}\"")]
    InvalidSlot { name: String },
    #[error("Conflict between slot=\"{name}\" and prop '{prop}'")]
    SlotPropConflict { name: String, prop: String },
    #[error("Invalid directive \"on:{name}\"")]
    InvalidDirective { name: String },
    #[error("Conflict between directive \"on:{name}\" and prop '{prop}'")]
    DirectivePropConflict { name: String, prop: String },
}

pub type SlotGetter = Rc<dyn Fn() -> Rc<dyn Any>>;
pub type Slot = Rc<dyn Fn(&Anchor, &SlotProps)>;
/// A render function taking positional getters, the shape slots are
/// translated into.
pub type Snippet = Rc<dyn Fn(&Anchor, &[SlotGetter])>;

/// Named values a slot receives (`let:` bindings).
#[derive(Clone, Default)]
pub struct SlotProps {
    getters: Vec<(String, SlotGetter)>,
}

impl SlotProps {
    pub fn get<T: 'static>(&self, name: &str) -> Option<Rc<T>> {
        let (_, getter) = self.getters.iter().find(|(n, _)| n == name)?;
        getter().downcast::<T>().ok()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.getters.iter().map(|(n, _)| n.as_str())
    }
}

#[derive(Clone)]
pub enum Prop {
    Value(Rc<dyn Any>),
    Handler(Handler),
    Snippet(Snippet),
}

impl std::fmt::Debug for Prop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Prop::Value(_) => f.write_str("Value(..)"),
            Prop::Handler(_) => f.write_str("Handler(..)"),
            Prop::Snippet(_) => f.write_str("Snippet(..)"),
        }
    }
}

/// Props as handed to a component, plus the `on:` directives and slots a
/// v4-style parent attached.
#[derive(Clone, Default)]
pub struct Props {
    values: BTreeMap<String, Prop>,
    /// `None` marks a default slot rendered through `children`.
    slots: Option<BTreeMap<String, Option<Slot>>>,
    events: Option<BTreeMap<String, Vec<Handler>>>,
    event_names: Option<BTreeMap<String, EventMeta>>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, prop: Prop) -> Self {
        self.insert(name, prop);
        self
    }

    pub fn with_slot(mut self, name: &str, slot: Option<Slot>) -> Self {
        self.slots
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), slot);
        self
    }

    pub fn with_event(mut self, name: &str, handler: Handler) -> Self {
        add_legacy_event_listener(&mut self, name, handler);
        self
    }

    pub fn insert(&mut self, name: &str, prop: Prop) {
        self.values.insert(name.to_string(), prop);
    }

    pub fn get(&self, name: &str) -> Option<&Prop> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn handler(&self, name: &str) -> Option<Handler> {
        match self.values.get(name)? {
            Prop::Handler(h) => Some(h.clone()),
            _ => None,
        }
    }

    pub fn snippet(&self, name: &str) -> Option<Snippet> {
        match self.values.get(name)? {
            Prop::Snippet(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn value<T: 'static>(&self, name: &str) -> Option<Rc<T>> {
        match self.values.get(name)? {
            Prop::Value(v) => v.clone().downcast::<T>().ok(),
            _ => None,
        }
    }

    pub fn event_names(&self) -> Option<&BTreeMap<String, EventMeta>> {
        self.event_names.as_ref()
    }

    /// Names of the `on:` directives attached by the parent.
    pub fn directive_names(&self) -> Vec<String> {
        self.events
            .as_ref()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for Props {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Props")
            .field("values", &self.values)
            .field("slots", &self.slots.as_ref().map(|s| s.keys().collect::<Vec<_>>()))
            .field("events", &self.directive_names())
            .finish()
    }
}

/// The v4 instance API. Every method fails unless
/// [`RuntimeOptions::component_api_v4`](crate::config::RuntimeOptions) is set.
pub struct LegacyApi {
    component: Component,
}

/// Builds the instance API for `component`.
pub fn legacy_api(component: &Component) -> LegacyApi {
    LegacyApi {
        component: component.clone(),
    }
}

impl LegacyApi {
    fn check(&self, method: &'static str) -> Result<(), LegacyError> {
        if options().component_api_v4 {
            return Ok(());
        }
        let parent = self
            .component
            .parent()
            .map_or_else(|| "Something".to_string(), |p| p.name().to_string());
        Err(LegacyError::ComponentApiChanged {
            parent,
            method,
            component: self.component.name().to_string(),
        })
    }

    /// `$destroy()`
    pub fn destroy(&self) -> Result<(), LegacyError> {
        self.check("$destroy()")?;
        self.component.destroy();
        Ok(())
    }

    /// `$on(...)`
    pub fn on(&self, event: &str, handler: Handler) -> Result<Dispose, LegacyError> {
        self.check("$on(...)")?;
        Ok(self.component.on(event, handler, ListenerOptions::default()))
    }

    /// `$set(...)`: updates only props the component already has. Returns
    /// how many were applied.
    pub fn set(
        &self,
        props: &mut Props,
        new_props: impl IntoIterator<Item = (String, Prop)>,
    ) -> Result<usize, LegacyError> {
        self.check("$set(...)")?;
        Ok(update_legacy_props(props, new_props))
    }
}

/// Rejects class-style construction (`new Component(...)`).
pub fn check_target(target: Option<&Component>) -> Result<(), LegacyError> {
    match target {
        Some(c) if !options().component_api_v4 => Err(LegacyError::ComponentApiInvalidNew {
            component: c.name().to_string(),
            name: c.name().to_string(),
        }),
        _ => Ok(()),
    }
}

/// Reports each `on:` directive passed to a component that takes callback
/// props instead.
pub fn check_events(props: &Props, component: &str) {
    for event in props.directive_names() {
        report(Advisory::OnDirectiveOnCallbackComponent {
            event,
            component: component.to_string(),
        });
    }
}

/// Calls `list` in order as a single handler. Stops early when a handler
/// stops immediate propagation. A panicking handler does not prevent the
/// rest from running; the first panic is re-raised afterwards and later
/// ones are logged.
pub fn handlers(list: Vec<Handler>) -> Handler {
    Rc::new(move |event: &Event| {
        let already_stopped = event.immediate_propagation_stopped();
        let mut first = None;
        for h in &list {
            if let Err(p) = catch_unwind(AssertUnwindSafe(|| h(event))) {
                if first.is_none() {
                    first = Some(p);
                } else {
                    log::error!("event handler for {:?} panicked", event.kind());
                }
            }
            if !already_stopped && event.immediate_propagation_stopped() {
                break;
            }
        }
        if let Some(p) = first {
            resume_unwind(p);
        }
    })
}

fn merge(list: &[Handler]) -> Handler {
    match list {
        [only] => only.clone(),
        _ => handlers(list.to_vec()),
    }
}

/// Moves `on:` directives into `on<name>` callback props.
pub fn legacy_events(props: &mut Props, enabled: bool) -> Result<(), LegacyError> {
    let Some(events) = props.events.clone() else {
        return Ok(());
    };
    for (event, list) in events {
        let prop = format!("on{event}");
        if !enabled {
            return Err(LegacyError::EventsDisabled { event });
        }
        if props.contains(&prop) {
            return Err(LegacyError::DirectiveAndProp { event });
        }
        props.insert(&prop, Prop::Handler(merge(&list)));
    }
    Ok(())
}

/// Re-dispatches `event` to the `on:` directive handlers of the same name.
pub fn bubble_event(props: &Props, event: &Event) {
    let callbacks: Vec<Handler> = props
        .events
        .as_ref()
        .and_then(|e| e.get(event.kind()))
        .cloned()
        .unwrap_or_default();
    for h in callbacks {
        h(event);
    }
}

/// The `$on` simulation: appends a directive handler.
pub fn add_legacy_event_listener(props: &mut Props, event: &str, handler: Handler) {
    props
        .events
        .get_or_insert_with(BTreeMap::new)
        .entry(event.to_string())
        .or_default()
        .push(handler);
}

pub fn update_legacy_props(
    props: &mut Props,
    new_props: impl IntoIterator<Item = (String, Prop)>,
) -> usize {
    let mut applied = 0;
    for (key, value) in new_props {
        if let Some(slot) = props.values.get_mut(&key) {
            *slot = value;
            applied += 1;
        }
    }
    applied
}

/// The default slot as a snippet: `children` when the parent rendered it
/// that way, otherwise the slot function itself.
pub fn default_slot(props: &Props) -> Option<Snippet> {
    match props.slots.as_ref()?.get("default")? {
        None => props.snippet("children"),
        Some(slot) => {
            let slot = slot.clone();
            Some(Rc::new(move |anchor: &Anchor, _: &[SlotGetter]| {
                slot(anchor, &SlotProps::default())
            }))
        }
    }
}

/// How a custom element translates one slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotMeta {
    Invalid,
    /// Same name, no arguments.
    Plain,
    Rename(String),
    /// Positional arguments exposed to the slot under these names; `None`
    /// skips a position.
    Args(Vec<Option<String>>),
    Named {
        prop: String,
        args: Vec<Option<String>>,
    },
}

/// How a custom element translates one `on:` directive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventMeta {
    Invalid,
    /// `on<name>`
    Default,
    Rename(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Translation<M> {
    Disabled,
    Map(BTreeMap<String, M>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LegacyMetadata {
    /// Neither slots nor directives are accepted.
    Disabled,
    Enabled {
        slots: Option<Translation<SlotMeta>>,
        events: Option<Translation<EventMeta>>,
    },
}

fn reject_slots(props: &Props) -> Result<(), LegacyError> {
    let named = props
        .slots
        .iter()
        .flat_map(|s| s.keys())
        .find(|name| name.as_str() != "default");
    match named {
        Some(name) => Err(LegacyError::IllegalSlot { name: name.clone() }),
        None => Ok(()),
    }
}

fn reject_events(props: &Props) -> Result<(), LegacyError> {
    match props.directive_names().into_iter().next() {
        Some(name) => Err(LegacyError::IllegalDirective { name }),
        None => Ok(()),
    }
}

fn translate_slots(props: &mut Props, meta: &BTreeMap<String, SlotMeta>) -> Result<(), LegacyError> {
    let slots = props.slots.clone().unwrap_or_default();
    for (name, slot) in slots {
        let is_default = name == "default";
        let Some(slot) = slot else {
            continue;
        };
        let default_prop = if is_default { "children".to_string() } else { name.clone() };
        let (prop, args) = match meta.get(&name).unwrap_or(&SlotMeta::Invalid) {
            SlotMeta::Invalid => return Err(LegacyError::InvalidSlot { name }),
            SlotMeta::Plain => (default_prop, Vec::new()),
            SlotMeta::Rename(p) => (p.clone(), Vec::new()),
            SlotMeta::Args(a) => (default_prop, a.clone()),
            SlotMeta::Named { prop, args } => (prop.clone(), args.clone()),
        };
        if !is_default && props.contains(&prop) {
            return Err(LegacyError::SlotPropConflict { name, prop });
        }
        let snippet: Snippet = Rc::new(move |anchor: &Anchor, params: &[SlotGetter]| {
            let getters = args
                .iter()
                .zip(params)
                .filter_map(|(n, g)| n.as_ref().map(|n| (n.clone(), g.clone())))
                .collect();
            slot(anchor, &SlotProps { getters })
        });
        props.insert(&prop, Prop::Snippet(snippet));
    }
    Ok(())
}

fn translate_events(props: &mut Props, meta: &BTreeMap<String, EventMeta>) -> Result<(), LegacyError> {
    let events = props.events.clone().unwrap_or_default();
    for (name, list) in events {
        let prop = match meta.get(&name).unwrap_or(&EventMeta::Invalid) {
            EventMeta::Invalid => return Err(LegacyError::InvalidDirective { name }),
            EventMeta::Default => format!("on{name}"),
            EventMeta::Rename(p) => p.clone(),
        };
        if props.contains(&prop) {
            return Err(LegacyError::DirectivePropConflict { name, prop });
        }
        props.insert(&prop, Prop::Handler(merge(&list)));
    }
    Ok(())
}

/// Translates slots and `on:` directives of a custom element into props
/// according to `metadata`, and records the declared event names.
pub fn legacy(props: &mut Props, metadata: &LegacyMetadata) -> Result<(), LegacyError> {
    match metadata {
        LegacyMetadata::Disabled => {
            reject_slots(props)?;
            reject_events(props)?;
            props.event_names = Some(BTreeMap::new());
        }
        LegacyMetadata::Enabled { slots, events } => {
            if props.slots.is_some() {
                match slots {
                    Some(Translation::Disabled) => reject_slots(props)?,
                    Some(Translation::Map(m)) => translate_slots(props, m)?,
                    None => {}
                }
            }
            if props.events.is_some() {
                match events {
                    Some(Translation::Disabled) => reject_events(props)?,
                    Some(Translation::Map(m)) => translate_events(props, m)?,
                    None => {}
                }
            }
            match events {
                Some(Translation::Disabled) => props.event_names = Some(BTreeMap::new()),
                Some(Translation::Map(m)) => props.event_names = Some(m.clone()),
                None => {}
            }
        }
    }
    Ok(())
}

/// An import the template treats as state: reads are tracked, and
/// assigning through it notifies readers.
pub struct ReactiveImport<T> {
    read: Box<dyn Fn() -> T>,
    version: Signal<u64>,
}

pub fn reactive_import<T: 'static>(read: impl Fn() -> T + 'static) -> ReactiveImport<T> {
    ReactiveImport {
        read: Box::new(read),
        version: Signal::new(0),
    }
}

impl<T: 'static> ReactiveImport<T> {
    pub fn get(&self) -> T {
        self.version.with(|_| ());
        (self.read)()
    }

    /// Records an assignment and passes `value` through.
    pub fn assign(&self, value: T) -> T {
        self.version.update(|v| *v += 1);
        value
    }
}
