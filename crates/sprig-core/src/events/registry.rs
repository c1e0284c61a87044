//! Per-component event bubble registry.
//!
//! Two tables live side by side. *Callbacks* are the listeners consumers
//! attached to the component (`component.on("click", ..)`). *Bubble
//! entries* describe where the component forwards events from. Whenever
//! one side gains an item it is matched against the other: a callback for
//! `click` is wired through every entry whose pattern resolves `click`, and
//! nothing is attached for names nobody listens to.
//!
//! Entries are looked up in two tiers: the exact-name table, then the
//! wildcard list in registration order. Both tiers fire.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::{Event, EventError, EventPattern, EventTarget, Handler, ListenerOptions};
use crate::component::Component;
use crate::effects::Dispose;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// Attaches one callback through a bubble entry. Receives the consumer's
/// handler, its options and the resolved underlying event name; returns
/// the disposer of whatever it attached, if anything.
pub type BubbleFactory = Rc<dyn Fn(&Handler, ListenerOptions, &str) -> Option<Dispose>>;

struct Callback {
    id: CallbackId,
    kind: String,
    handler: Handler,
    options: ListenerOptions,
}

struct BubbleEntry {
    pattern: EventPattern,
    factory: BubbleFactory,
    attached: RefCell<HashMap<CallbackId, Dispose>>,
}

#[derive(Default)]
struct Tables {
    callbacks: Vec<Rc<Callback>>,
    exact: HashMap<String, Vec<Rc<BubbleEntry>>>,
    wildcard: Vec<Rc<BubbleEntry>>,
    next_id: u64,
}

#[derive(Default)]
pub struct EventRegistry {
    tables: RefCell<Tables>,
}

impl EventRegistry {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn entries_for(&self, kind: &str) -> Vec<Rc<BubbleEntry>> {
        let t = self.tables.borrow();
        t.exact
            .get(kind)
            .into_iter()
            .flatten()
            .chain(t.wildcard.iter())
            .cloned()
            .collect()
    }

    fn callbacks(&self) -> Vec<Rc<Callback>> {
        self.tables.borrow().callbacks.clone()
    }

    fn start_bubble(entry: &BubbleEntry, cb: &Callback) {
        let Some(resolved) = entry.pattern.resolve(&cb.kind) else {
            return;
        };
        if let Some(dispose) = (entry.factory)(&cb.handler, cb.options, resolved) {
            let previous = entry.attached.borrow_mut().insert(cb.id, dispose);
            if let Some(previous) = previous {
                previous.run();
            }
        }
    }

    fn start_callback(&self, cb: &Callback) {
        for entry in self.entries_for(&cb.kind) {
            Self::start_bubble(&entry, cb);
        }
    }

    fn stop_callback(&self, cb: &Callback) {
        for entry in self.entries_for(&cb.kind) {
            let dispose = entry.attached.borrow_mut().remove(&cb.id);
            if let Some(dispose) = dispose {
                dispose.run();
            }
        }
    }

    /// Adds a consumer callback and wires it through every matching entry.
    /// With `options.once` the callback removes itself after its first call.
    pub fn add_callback(
        self: &Rc<Self>,
        kind: &str,
        handler: Handler,
        options: ListenerOptions,
    ) -> Dispose {
        let id = {
            let mut t = self.tables.borrow_mut();
            t.next_id += 1;
            CallbackId(t.next_id)
        };
        let handler: Handler = if options.once {
            let weak = Rc::downgrade(self);
            Rc::new(move |e: &Event| {
                handler(e);
                if let Some(registry) = weak.upgrade() {
                    registry.remove_callback(id);
                }
            })
        } else {
            handler
        };
        let cb = Rc::new(Callback {
            id,
            kind: kind.to_string(),
            handler,
            options,
        });
        self.tables.borrow_mut().callbacks.push(cb.clone());
        self.start_callback(&cb);

        let weak = Rc::downgrade(self);
        Dispose::new(move || {
            if let Some(registry) = weak.upgrade() {
                registry.remove_callback(id);
            }
        })
    }

    /// Removes a callback and detaches everything attached for it. Unknown
    /// ids are ignored.
    pub fn remove_callback(&self, id: CallbackId) {
        let removed = {
            let mut t = self.tables.borrow_mut();
            t.callbacks
                .iter()
                .position(|c| c.id == id)
                .map(|at| t.callbacks.remove(at))
        };
        if let Some(cb) = removed {
            self.stop_callback(&cb);
        }
    }

    /// Adds a bubble entry and wires every existing callback it matches.
    pub fn add_bubble(self: &Rc<Self>, pattern: EventPattern, factory: BubbleFactory) -> Dispose {
        let entry = Rc::new(BubbleEntry {
            pattern,
            factory,
            attached: RefCell::new(HashMap::new()),
        });
        {
            let mut t = self.tables.borrow_mut();
            match &entry.pattern {
                EventPattern::Exact(name) => {
                    t.exact.entry(name.clone()).or_default().push(entry.clone())
                }
                _ => t.wildcard.push(entry.clone()),
            }
        }
        log::debug!("bubble entry added for '{}'", entry.pattern);
        for cb in self.callbacks() {
            Self::start_bubble(&entry, &cb);
        }

        let weak = Rc::downgrade(self);
        Dispose::new(move || {
            if let Some(registry) = weak.upgrade() {
                let mut t = registry.tables.borrow_mut();
                let list = match &entry.pattern {
                    EventPattern::Exact(name) => t.exact.get_mut(name),
                    _ => Some(&mut t.wildcard),
                };
                if let Some(list) = list {
                    list.retain(|e| !Rc::ptr_eq(e, &entry));
                }
            }
            let attached: Vec<Dispose> = entry.attached.borrow_mut().drain().map(|(_, d)| d).collect();
            for dispose in attached {
                dispose.run();
            }
        })
    }

    /// Re-runs attachment of every callback through every matching entry,
    /// replacing what was attached before.
    pub fn restart_all(&self) {
        for cb in self.callbacks() {
            self.start_callback(&cb);
        }
    }

    /// Calls every callback registered for `event.kind()`, in order.
    /// Returns whether there were any.
    pub fn emit(&self, event: &Event) -> bool {
        let matching: Vec<Rc<Callback>> = self
            .callbacks()
            .into_iter()
            .filter(|c| c.kind == event.kind())
            .collect();
        for cb in &matching {
            (cb.handler)(event);
        }
        !matching.is_empty()
    }

    pub fn callback_count(&self, kind: &str) -> usize {
        self.tables
            .borrow()
            .callbacks
            .iter()
            .filter(|c| c.kind == kind)
            .count()
    }

    /// Number of live attachments across all entries.
    pub fn attachment_count(&self) -> usize {
        let t = self.tables.borrow();
        t.exact
            .values()
            .flatten()
            .chain(t.wildcard.iter())
            .map(|e| e.attached.borrow().len())
            .sum()
    }
}

/// Registers a bubble entry on `component` under `pattern` (an exact name,
/// `*`, `prefix*` or `*suffix`).
pub fn register(
    component: &Component,
    pattern: &str,
    factory: impl Fn(&Handler, ListenerOptions, &str) -> Option<Dispose> + 'static,
) -> Result<Dispose, EventError> {
    let pattern = EventPattern::parse(pattern)?;
    Ok(component.registry().add_bubble(pattern, Rc::new(factory)))
}

/// Schedules `factory` to run whenever a handler matching `pattern` is
/// added to the component.
pub fn on_event_listener(
    component: &Component,
    pattern: &str,
    factory: impl Fn(&Handler, ListenerOptions, &str) -> Option<Dispose> + 'static,
) -> Result<Dispose, EventError> {
    register(component, pattern, factory)
}

/// Forwards `event` from `target` as an event of `component`.
///
/// With `event == "*"`, `alias` is the exposed wildcard pattern (default
/// `*`): a consumer listening for `name` gets `target`'s event named by
/// what the pattern resolves from `name`. Otherwise the event is exposed
/// under `alias` (default: the same name).
pub fn bubble(
    component: &Component,
    target: Rc<dyn EventTarget>,
    event: &str,
    alias: Option<&str>,
) -> Result<Dispose, EventError> {
    if event == "*" {
        let exposed = alias.unwrap_or("*");
        let pattern = EventPattern::parse(exposed)?;
        if !pattern.is_wildcard() {
            return Err(EventError::InvalidAlias {
                event: event.to_string(),
                alias: exposed.to_string(),
            });
        }
        let factory: BubbleFactory = Rc::new(move |handler: &Handler, options: ListenerOptions, resolved: &str| {
            Some(target.listen(resolved, handler.clone(), options))
        });
        return Ok(component.registry().add_bubble(pattern, factory));
    }

    if event.is_empty() || event.contains('*') {
        return Err(EventError::InvalidPattern {
            pattern: event.to_string(),
        });
    }
    let exposed = alias.unwrap_or(event);
    if exposed.contains('*') {
        return Err(EventError::InvalidAlias {
            event: event.to_string(),
            alias: exposed.to_string(),
        });
    }
    let pattern = EventPattern::parse(exposed)?;
    let underlying = event.to_string();
    let factory: BubbleFactory = Rc::new(move |handler: &Handler, options: ListenerOptions, _resolved: &str| {
        Some(target.listen(&underlying, handler.clone(), options))
    });
    Ok(component.registry().add_bubble(pattern, factory))
}

pub fn restart_all_callbacks(component: &Component) {
    component.registry().restart_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Dom;
    use crate::events::ElementTarget;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, Handler) {
        let n = Rc::new(Cell::new(0));
        let h: Handler = {
            let n = n.clone();
            Rc::new(move |_e: &Event| n.set(n.get() + 1))
        };
        (n, h)
    }

    #[test]
    fn attaches_lazily_on_first_listen() {
        let dom = Dom::new();
        let button = dom.create_element("button");
        let comp = Component::new("Button");
        let target: Rc<dyn EventTarget> = Rc::new(ElementTarget::new(&dom, button));
        let _fwd = bubble(&comp, target, "click", None).unwrap();
        assert_eq!(dom.listener_count(button), 0);

        let (n, h) = counter();
        let off = comp.on("click", h, ListenerOptions::default());
        assert_eq!(dom.listener_count(button), 1);
        dom.dispatch(button, &Event::new("click"));
        assert_eq!(n.get(), 1);

        off.run();
        assert_eq!(dom.listener_count(button), 0);
    }

    #[test]
    fn wildcard_alias_strips_the_fixed_part() {
        let dom = Dom::new();
        let input = dom.create_element("input");
        let comp = Component::new("Field");
        let target: Rc<dyn EventTarget> = Rc::new(ElementTarget::new(&dom, input));
        let _fwd = bubble(&comp, target, "*", Some("input-*")).unwrap();

        let (n, h) = counter();
        let _off = comp.on("input-focus", h, ListenerOptions::default());
        let (other, h2) = counter();
        let _off2 = comp.on("focus", h2, ListenerOptions::default());

        dom.dispatch(input, &Event::new("focus"));
        assert_eq!(n.get(), 1);
        assert_eq!(other.get(), 0);
        assert_eq!(dom.listener_count(input), 1);
    }

    #[test]
    fn exact_and_wildcard_entries_both_fire() {
        let dom = Dom::new();
        let el = dom.create_element("div");
        let comp = Component::new("Box");
        let target: Rc<dyn EventTarget> = Rc::new(ElementTarget::new(&dom, el));
        let _a = bubble(&comp, target.clone(), "click", None).unwrap();
        let _b = bubble(&comp, target, "*", None).unwrap();

        let (n, h) = counter();
        let _off = comp.on("click", h, ListenerOptions::default());
        dom.dispatch(el, &Event::new("click"));
        assert_eq!(n.get(), 2);
    }

    #[test]
    fn exact_entries_only_see_their_own_name() {
        let comp = Component::new("Probe");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let _d = register(&comp, "close", {
            let seen = seen.clone();
            move |_h, _o, name| {
                seen.borrow_mut().push(name.to_string());
                None
            }
        })
        .unwrap();
        let (_, h) = counter();
        let _x = comp.on("open", h.clone(), ListenerOptions::default());
        let _y = comp.on("close", h, ListenerOptions::default());
        assert_eq!(*seen.borrow(), vec!["close".to_string()]);
    }

    #[test]
    fn rejects_invalid_registrations() {
        let comp = Component::new("C");
        let dom = Dom::new();
        let el = dom.create_element("div");
        let target: Rc<dyn EventTarget> = Rc::new(ElementTarget::new(&dom, el));
        assert!(matches!(
            register(&comp, "a*b", |_, _, _| None),
            Err(EventError::InvalidPattern { .. })
        ));
        assert!(matches!(
            bubble(&comp, target.clone(), "*", Some("plain")),
            Err(EventError::InvalidAlias { .. })
        ));
        assert!(matches!(
            bubble(&comp, target, "click", Some("x*")),
            Err(EventError::InvalidAlias { .. })
        ));
    }

    #[test]
    fn removing_an_entry_detaches_its_listeners() {
        let dom = Dom::new();
        let el = dom.create_element("div");
        let comp = Component::new("C");
        let target: Rc<dyn EventTarget> = Rc::new(ElementTarget::new(&dom, el));
        let fwd = bubble(&comp, target, "click", Some("press")).unwrap();
        let (n, h) = counter();
        let _off = comp.on("press", h, ListenerOptions::default());
        assert_eq!(comp.registry().attachment_count(), 1);
        fwd.run();
        assert_eq!(dom.listener_count(el), 0);
        dom.dispatch(el, &Event::new("click"));
        assert_eq!(n.get(), 0);
    }

    #[test]
    fn restart_replaces_attachments() {
        let dom = Dom::new();
        let el = dom.create_element("div");
        let comp = Component::new("C");
        let target: Rc<dyn EventTarget> = Rc::new(ElementTarget::new(&dom, el));
        let _fwd = bubble(&comp, target, "click", None).unwrap();
        let (n, h) = counter();
        let _off = comp.on("click", h, ListenerOptions::default());
        restart_all_callbacks(&comp);
        assert_eq!(dom.listener_count(el), 1);
        dom.dispatch(el, &Event::new("click"));
        assert_eq!(n.get(), 1);
    }

    #[test]
    fn once_callbacks_remove_themselves() {
        let comp = Component::new("C");
        let (n, h) = counter();
        let _off = comp.on(
            "ping",
            h,
            ListenerOptions {
                once: true,
                ..Default::default()
            },
        );
        comp.registry().emit(&Event::custom("ping", None, false));
        comp.registry().emit(&Event::custom("ping", None, false));
        assert_eq!(n.get(), 1);
        assert_eq!(comp.registry().callback_count("ping"), 0);
    }
}
