//! Component instances: context, lifecycle hooks and the event registry.
//!
//! Every API that needs "the current component" takes a `&Component`
//! explicitly.
//!
//! ```rust
//! use sprig_core::Component;
//!
//! let app = Component::new("App");
//! app.set_context("theme", String::from("dark"));
//! let child = app.child("Button");
//! assert_eq!(child.get_context::<String>("theme").as_deref().map(String::as_str), Some("dark"));
//! ```

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::effects::{self, Dispose, EffectId, on_cleanup};
use crate::events::{EventRegistry, Handler, ListenerOptions};
use crate::reactive::untrack;
use crate::signal::Signal;

type Context = HashMap<String, Rc<dyn Any>>;
type MountFn = Box<dyn FnOnce() -> Option<Box<dyn FnOnce()>>>;

#[derive(Default)]
struct Lifecycle {
    before_update: Vec<Rc<dyn Fn()>>,
    after_update: Vec<Rc<dyn Fn()>>,
    on_mount: Vec<MountFn>,
    on_destroy: Vec<Box<dyn FnOnce()>>,
}

struct ComponentInner {
    name: String,
    parent: Option<Weak<ComponentInner>>,
    context: RefCell<Context>,
    registry: Rc<EventRegistry>,
    lifecycle: RefCell<Lifecycle>,
    observed: RefCell<Vec<Rc<dyn Fn()>>>,
    effect: Cell<Option<EffectId>>,
    initialized: Cell<bool>,
}

#[derive(Clone)]
pub struct Component(Rc<ComponentInner>);

impl Component {
    pub fn new(name: &str) -> Self {
        Self::build(name, None, Context::new())
    }

    fn build(name: &str, parent: Option<Weak<ComponentInner>>, context: Context) -> Self {
        Self(Rc::new(ComponentInner {
            name: name.to_string(),
            parent,
            context: RefCell::new(context),
            registry: EventRegistry::new(),
            lifecycle: RefCell::new(Lifecycle::default()),
            observed: RefCell::new(Vec::new()),
            effect: Cell::new(None),
            initialized: Cell::new(false),
        }))
    }

    /// A child instance that starts with a copy of this component's context.
    pub fn child(&self, name: &str) -> Self {
        let context = self.0.context.borrow().clone();
        Self::build(name, Some(Rc::downgrade(&self.0)), context)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn parent(&self) -> Option<Component> {
        self.0.parent.as_ref().and_then(Weak::upgrade).map(Component)
    }

    pub fn registry(&self) -> &Rc<EventRegistry> {
        &self.0.registry
    }

    /// The branch effect this instance was mounted in.
    pub fn effect(&self) -> Option<EffectId> {
        self.0.effect.get()
    }

    pub fn ptr_eq(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn set_context<T: 'static>(&self, key: &str, value: T) -> Rc<T> {
        let value = Rc::new(value);
        self.0
            .context
            .borrow_mut()
            .insert(key.to_string(), value.clone());
        value
    }

    pub fn get_context<T: 'static>(&self, key: &str) -> Option<Rc<T>> {
        let value = self.0.context.borrow().get(key).cloned()?;
        value.downcast::<T>().ok()
    }

    pub fn has_context(&self, key: &str) -> bool {
        self.0.context.borrow().contains_key(key)
    }

    pub fn all_contexts(&self) -> HashMap<String, Rc<dyn Any>> {
        self.0.context.borrow().clone()
    }

    /// Listens for a component event (the `$on` API).
    pub fn on(&self, event: &str, handler: Handler, options: ListenerOptions) -> Dispose {
        self.0.registry.add_callback(event, handler, options)
    }

    /// Runs `f` after the component is first rendered. A returned cleanup
    /// runs when the component is destroyed.
    pub fn on_mount(&self, f: impl FnOnce() -> Option<Box<dyn FnOnce()>> + 'static) {
        self.0.lifecycle.borrow_mut().on_mount.push(Box::new(f));
    }

    pub fn on_destroy(&self, f: impl FnOnce() + 'static) {
        self.0.lifecycle.borrow_mut().on_destroy.push(Box::new(f));
    }

    /// Runs `f` before every update, and once before the first mount.
    pub fn before_update(&self, f: impl Fn() + 'static) {
        self.0.lifecycle.borrow_mut().before_update.push(Rc::new(f));
    }

    /// Runs `f` after every update, starting after the first mount.
    pub fn after_update(&self, f: impl Fn() + 'static) {
        self.0.lifecycle.borrow_mut().after_update.push(Rc::new(f));
    }

    /// Counts `signal` as component state: writes to it trigger the update
    /// hooks.
    pub fn observe<T: 'static>(&self, signal: &Signal<T>) {
        let signal = signal.clone();
        self.0
            .observed
            .borrow_mut()
            .push(Rc::new(move || signal.with(|_| ())));
    }

    fn observe_all(&self) {
        let readers: Vec<Rc<dyn Fn()>> = self.0.observed.borrow().clone();
        for read in readers {
            read();
        }
    }

    /// Wires the registered lifecycle hooks into effects owned by the
    /// current effect. Runs once; later calls are no-ops.
    pub fn init(&self) {
        if self.0.initialized.replace(true) {
            return;
        }
        let (before, after) = {
            let lc = self.0.lifecycle.borrow();
            (lc.before_update.clone(), lc.after_update.clone())
        };

        if !before.is_empty() {
            let comp = self.clone();
            effects::effect(move || {
                comp.observe_all();
                untrack(|| before.iter().for_each(|f| f()));
            });
        }

        let comp = self.clone();
        effects::effect(move || {
            let mounts = std::mem::take(&mut comp.0.lifecycle.borrow_mut().on_mount);
            let cleanups: Vec<Box<dyn FnOnce()>> =
                untrack(|| mounts.into_iter().filter_map(|m| m()).collect());
            if !cleanups.is_empty() {
                on_cleanup(move || cleanups.into_iter().for_each(|c| c()));
            }
        });

        if !after.is_empty() {
            let comp = self.clone();
            effects::effect(move || {
                comp.observe_all();
                untrack(|| after.iter().for_each(|f| f()));
            });
        }

        let comp = self.clone();
        on_cleanup(move || {
            let destroys = std::mem::take(&mut comp.0.lifecycle.borrow_mut().on_destroy);
            for f in destroys {
                f();
            }
        });
    }

    /// Mounts the instance in a new branch effect: `body` registers hooks
    /// and renders; hooks are wired by [`Component::init`] if `body` did not
    /// call it.
    pub fn mount(&self, body: impl FnOnce(&Component) + 'static) -> EffectId {
        let comp = self.clone();
        let id = effects::branch(move || {
            body(&comp);
            comp.init();
        });
        self.0.effect.set(Some(id));
        id
    }

    /// Destroys the mount effect: on_mount cleanups and on_destroy hooks run.
    pub fn destroy(&self) {
        if let Some(id) = self.0.effect.take() {
            effects::destroy(id);
        }
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.0.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::signal;

    #[test]
    fn context_is_inherited_as_a_snapshot() {
        let parent = Component::new("Parent");
        parent.set_context("n", 1u32);
        let child = parent.child("Child");
        parent.set_context("late", 2u32);
        assert_eq!(child.get_context::<u32>("n").as_deref(), Some(&1));
        assert!(!child.has_context("late"));
        assert!(child.get_context::<String>("n").is_none());
        assert!(child.parent().is_some_and(|p| p.ptr_eq(&parent)));
    }

    #[test]
    fn lifecycle_runs_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let count = signal(0);
        let comp = Component::new("Counter");
        comp.mount({
            let log = log.clone();
            let count = count.clone();
            move |c| {
                c.observe(&count);
                let l = log.clone();
                c.before_update(move || l.borrow_mut().push("before"));
                let l = log.clone();
                c.on_mount(move || {
                    l.borrow_mut().push("mount");
                    let l = l.clone();
                    Some(Box::new(move || l.borrow_mut().push("unmount")) as Box<dyn FnOnce()>)
                });
                let l = log.clone();
                c.after_update(move || l.borrow_mut().push("after"));
                let l = log.clone();
                c.on_destroy(move || l.borrow_mut().push("destroy"));
            }
        });
        assert_eq!(*log.borrow(), vec!["before", "mount", "after"]);

        count.set(1);
        assert_eq!(*log.borrow(), vec!["before", "mount", "after", "before", "after"]);

        comp.destroy();
        let tail: Vec<&str> = log.borrow()[5..].to_vec();
        assert!(tail.contains(&"unmount"));
        assert!(tail.contains(&"destroy"));
        comp.destroy();
        assert_eq!(log.borrow().len(), 7);
    }
}
