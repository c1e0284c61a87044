//! # Effect tree
//!
//! Every reactive computation is an [`EffectId`] in a thread-local arena.
//! An effect created while another one is executing becomes its last child;
//! the parent owns the child (destroying the parent destroys the child
//! first) and the child only keeps a plain id pointing back up.
//!
//! - [`run`] creates an effect and executes it once under tracking.
//! - [`pause`] makes a subtree inert, plays its exit transitions, then
//!   destroys it and calls back.
//! - [`resume`] cancels a pending pause and re-activates the subtree.
//! - [`destroy`] tears a subtree down depth-first. Calling it twice is a no-op.
//!
//! ```rust
//! use sprig_core::{EffectState, effect, effect_state, destroy, signal};
//!
//! let count = signal(0);
//! let seen = std::rc::Rc::new(std::cell::Cell::new(0));
//! let e = effect({
//!     let count = count.clone();
//!     let seen = seen.clone();
//!     move || seen.set(count.get())
//! });
//! count.set(3);
//! assert_eq!(seen.get(), 3);
//! destroy(e);
//! assert_eq!(effect_state(e), EffectState::Destroyed);
//! ```

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::rc::Rc;

use bitflags::bitflags;
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::dom::{Dom, NodeId};
use crate::reactive::{self, RunGuard};
use crate::scope::{OwnerGuard, current_effect};
use crate::transition::Transition;

new_key_type! {
    pub struct EffectId;
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct EffectFlags: u8 {
        /// Detached from the current owner.
        const ROOT = 1 << 0;
        /// Re-runs keep `BRANCH` children alive.
        const BLOCK = 1 << 1;
        /// Runs once, untracked; owns the nodes of one branch.
        const BRANCH = 1 << 2;
        /// Local transitions of this subtree play when an ancestor pauses.
        const TRANSPARENT = 1 << 3;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectState {
    Active,
    Paused,
    Destroyed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EffectStats {
    pub active: usize,
    pub paused: usize,
}

type Computation = Rc<RefCell<dyn FnMut()>>;
type Panic = Box<dyn Any + Send>;

struct EffectNode {
    state: EffectState,
    flags: EffectFlags,
    compute: Option<Computation>,
    parent: Option<EffectId>,
    children: SmallVec<[EffectId; 4]>,
    cleanups: Vec<Box<dyn FnOnce()>>,
    transitions: Vec<Rc<Transition>>,
    nodes: Vec<(Dom, NodeId)>,
    dirty: bool,
    depth: usize,
    seq: u64,
    // paused as part of an ancestor's pause rather than its own
    inherited_pause: bool,
    pause_epoch: u64,
    on_paused: Vec<Box<dyn FnOnce()>>,
}

thread_local! {
    static EFFECTS: RefCell<SlotMap<EffectId, EffectNode>> = RefCell::new(SlotMap::with_key());
    static NEXT_SEQ: Cell<u64> = const { Cell::new(0) };
}

fn with_node<R>(id: EffectId, f: impl FnOnce(&mut EffectNode) -> R) -> Option<R> {
    EFFECTS.with(|e| e.borrow_mut().get_mut(id).map(f))
}

fn guarded(first_panic: &mut Option<Panic>, f: impl FnOnce()) {
    if let Err(p) = catch_unwind(AssertUnwindSafe(f)) {
        if first_panic.is_none() {
            *first_panic = Some(p);
        } else {
            log::error!("cleanup panicked while another panic was pending; dropping it");
        }
    }
}

fn create(flags: EffectFlags, compute: Option<Computation>) -> EffectId {
    let owner = if flags.contains(EffectFlags::ROOT) {
        None
    } else {
        current_effect()
    };
    let seq = NEXT_SEQ.with(|n| {
        n.set(n.get() + 1);
        n.get()
    });
    EFFECTS.with(|e| {
        let mut e = e.borrow_mut();
        let parent = owner.filter(|p| e.contains_key(*p));
        let depth = parent.and_then(|p| e.get(p)).map_or(0, |p| p.depth + 1);
        let id = e.insert(EffectNode {
            state: EffectState::Active,
            flags,
            compute,
            parent,
            children: SmallVec::new(),
            cleanups: Vec::new(),
            transitions: Vec::new(),
            nodes: Vec::new(),
            dirty: false,
            depth,
            seq,
            inherited_pause: false,
            pause_epoch: 0,
            on_paused: Vec::new(),
        });
        if let Some(p) = parent.and_then(|p| e.get_mut(p)) {
            p.children.push(id);
        }
        id
    })
}

/// Creates an effect owned by the current effect and runs it once.
pub fn run(computation: impl FnMut() + 'static, flags: EffectFlags) -> EffectId {
    let compute: Computation = Rc::new(RefCell::new(computation));
    let id = create(flags, Some(compute));
    execute(id);
    reactive::flush_if_idle();
    id
}

/// A plain tracked effect.
pub fn effect(f: impl FnMut() + 'static) -> EffectId {
    run(f, EffectFlags::empty())
}

/// A tracked effect whose re-runs keep its branch children.
pub fn block(f: impl FnMut() + 'static, flags: EffectFlags) -> EffectId {
    run(f, flags | EffectFlags::BLOCK)
}

/// Runs `f` once, untracked, inside a new branch effect.
pub fn branch(f: impl FnOnce() + 'static) -> EffectId {
    let mut f = Some(f);
    run(
        move || {
            if let Some(f) = f.take() {
                f()
            }
        },
        EffectFlags::BRANCH,
    )
}

/// Like [`branch`], but detached from the current owner.
pub fn root(f: impl FnOnce() + 'static) -> EffectId {
    let mut f = Some(f);
    run(
        move || {
            if let Some(f) = f.take() {
                f()
            }
        },
        EffectFlags::ROOT | EffectFlags::BRANCH,
    )
}

fn execute(id: EffectId) {
    let Some((compute, flags)) = with_node(id, |n| {
        if n.state != EffectState::Active {
            return None;
        }
        n.dirty = false;
        Some((n.compute.clone(), n.flags))
    })
    .flatten() else {
        return;
    };

    teardown(id, flags.contains(EffectFlags::BLOCK));

    let Some(compute) = compute else { return };
    let _run = RunGuard::enter();
    let _owner = OwnerGuard::enter(Some(id));
    let Ok(mut f) = compute.try_borrow_mut() else {
        // Still on the stack further up; run again on the next pass.
        with_node(id, |n| n.dirty = true);
        reactive::schedule(id);
        return;
    };
    if flags.contains(EffectFlags::BRANCH) {
        reactive::untrack(|| (&mut *f)())
    } else {
        reactive::track(id, || (&mut *f)())
    }
}

/// Destroys the children of `id` (except branches when `keep_branches`) and
/// runs its cleanups. Every item runs even if an earlier one panics; the
/// first panic is re-raised at the end.
fn teardown(id: EffectId, keep_branches: bool) {
    let mut first_panic = None;
    let children: Vec<EffectId> =
        with_node(id, |n| n.children.iter().copied().collect()).unwrap_or_default();
    for child in children {
        if keep_branches && flags_of(child).contains(EffectFlags::BRANCH) {
            continue;
        }
        guarded(&mut first_panic, || destroy(child));
    }
    let cleanups = with_node(id, |n| std::mem::take(&mut n.cleanups)).unwrap_or_default();
    for cleanup in cleanups {
        guarded(&mut first_panic, cleanup);
    }
    if let Some(p) = first_panic {
        resume_unwind(p);
    }
}

/// Destroys every child of `id` and runs its cleanups, leaving `id` alive.
pub fn reset(id: EffectId) {
    teardown(id, false);
}

pub(crate) fn mark_dirty(id: EffectId) -> bool {
    with_node(id, |n| {
        n.dirty = true;
        n.state == EffectState::Active
    })
    .unwrap_or(false)
}

/// Returns whether the effect ran.
pub(crate) fn rerun_if_dirty(id: EffectId) -> bool {
    let go = with_node(id, |n| n.state == EffectState::Active && n.dirty).unwrap_or(false);
    if go {
        execute(id);
    }
    go
}

/// Flush order: shallower first, then creation order.
pub(crate) fn schedule_key(id: EffectId) -> Option<(usize, u64)> {
    with_node(id, |n| (n.depth, n.seq))
}

/// Makes `id` and its active descendants inert and plays their exit
/// transitions. Once every transition has finished, the subtree is destroyed
/// and `on_complete` runs; with no transitions that happens before `pause`
/// returns. A [`resume`] in between cancels both.
pub fn pause(id: EffectId, on_complete: impl FnOnce() + 'static) {
    match effect_state(id) {
        EffectState::Destroyed => {
            on_complete();
            return;
        }
        EffectState::Paused => {
            with_node(id, |n| n.on_paused.push(Box::new(on_complete)));
            return;
        }
        EffectState::Active => {}
    }

    let mut transitions = Vec::new();
    pause_children(id, &mut transitions, true, false);
    let epoch = with_node(id, |n| {
        n.pause_epoch += 1;
        n.on_paused.push(Box::new(on_complete));
        n.pause_epoch
    })
    .unwrap_or_default();

    if transitions.is_empty() {
        finish_pause(id, epoch);
        return;
    }

    log::debug!("pause: waiting on {} exit transitions", transitions.len());
    let remaining = Rc::new(Cell::new(transitions.len()));
    for t in transitions {
        let remaining = remaining.clone();
        t.outro(Box::new(move || {
            remaining.set(remaining.get() - 1);
            if remaining.get() == 0 {
                finish_pause(id, epoch);
            }
        }));
    }
}

fn pause_children(
    id: EffectId,
    transitions: &mut Vec<Rc<Transition>>,
    local: bool,
    inherited: bool,
) {
    let Some(children) = with_node(id, |n| {
        if n.state != EffectState::Active {
            return None;
        }
        n.state = EffectState::Paused;
        n.inherited_pause = inherited;
        transitions.extend(
            n.transitions
                .iter()
                .filter(|t| local || t.is_global())
                .cloned(),
        );
        Some(n.children.clone())
    })
    .flatten() else {
        return;
    };

    for child in children {
        let transparent = flags_of(child).intersects(EffectFlags::TRANSPARENT | EffectFlags::BRANCH);
        pause_children(child, transitions, transparent && local, true);
    }
}

fn finish_pause(id: EffectId, epoch: u64) {
    let callbacks = with_node(id, |n| {
        (n.state == EffectState::Paused && n.pause_epoch == epoch)
            .then(|| std::mem::take(&mut n.on_paused))
    })
    .flatten();
    let Some(callbacks) = callbacks else { return };
    destroy(id);
    for cb in callbacks {
        cb();
    }
}

/// Re-activates a paused subtree, aborting its exit transitions and the
/// pending destroy. No-op unless `id` is paused.
pub fn resume(id: EffectId) {
    if effect_state(id) != EffectState::Paused {
        return;
    }
    resume_children(id, true, true);
    reactive::flush_if_idle();
}

fn resume_children(id: EffectId, local: bool, is_root: bool) {
    let Some((dirty, children, transitions, dropped)) = with_node(id, |n| {
        if n.state != EffectState::Paused || (!is_root && !n.inherited_pause) {
            return None;
        }
        n.state = EffectState::Active;
        n.inherited_pause = false;
        n.pause_epoch += 1;
        let transitions: Vec<Rc<Transition>> = n
            .transitions
            .iter()
            .filter(|t| local || t.is_global())
            .cloned()
            .collect();
        Some((
            n.dirty,
            n.children.clone(),
            transitions,
            std::mem::take(&mut n.on_paused),
        ))
    })
    .flatten() else {
        return;
    };
    drop(dropped);

    if dirty {
        reactive::schedule(id);
    }
    for child in children {
        let transparent = flags_of(child).intersects(EffectFlags::TRANSPARENT | EffectFlags::BRANCH);
        resume_children(child, transparent && local, false);
    }
    for t in transitions {
        t.intro();
    }
}

/// Tears down `id` and everything below it: children first, then owned
/// nodes, cleanups and transitions. Destroying twice is a no-op.
pub fn destroy(id: EffectId) {
    let first = with_node(id, |n| {
        if n.state == EffectState::Destroyed {
            false
        } else {
            n.state = EffectState::Destroyed;
            true
        }
    })
    .unwrap_or(false);
    if !first {
        return;
    }

    let mut first_panic = None;
    let children = with_node(id, |n| std::mem::take(&mut n.children)).unwrap_or_default();
    for child in children {
        guarded(&mut first_panic, || destroy(child));
    }

    let (cleanups, nodes, transitions, parent) = with_node(id, |n| {
        (
            std::mem::take(&mut n.cleanups),
            std::mem::take(&mut n.nodes),
            std::mem::take(&mut n.transitions),
            n.parent,
        )
    })
    .unwrap_or_default();

    for (dom, node) in nodes {
        dom.remove(node);
    }
    for cleanup in cleanups {
        guarded(&mut first_panic, cleanup);
    }
    for t in transitions {
        t.stop();
    }

    reactive::clear_dependencies(id);
    let removed = EFFECTS.with(|e| {
        let mut e = e.borrow_mut();
        if let Some(p) = parent.and_then(|p| e.get_mut(p)) {
            p.children.retain(|c| *c != id);
        }
        e.remove(id)
    });
    drop(removed);

    if let Some(p) = first_panic {
        resume_unwind(p);
    }
}

/// Registers `f` to run before the current effect re-runs and when it is
/// destroyed.
pub fn on_cleanup(f: impl FnOnce() + 'static) {
    match current_effect() {
        Some(id) => {
            let rejected = with_node(id, |n| n.cleanups.push(Box::new(f)));
            if rejected.is_none() {
                log::debug!("on_cleanup: owner already destroyed");
            }
        }
        None => log::debug!("on_cleanup called outside of an effect; it will never run"),
    }
}

/// Hands `node` to the current effect: it is detached when the effect is
/// destroyed.
pub fn own_node(dom: &Dom, node: NodeId) {
    if let Some(id) = current_effect() {
        with_node(id, |n| n.nodes.push((dom.clone(), node)));
    }
}

/// Attaches an exit/entry transition to the current effect.
pub fn register_transition(t: Rc<Transition>) {
    if let Some(id) = current_effect() {
        with_node(id, |n| n.transitions.push(t));
    }
}

pub fn effect_state(id: EffectId) -> EffectState {
    with_node(id, |n| n.state).unwrap_or(EffectState::Destroyed)
}

pub fn flags_of(id: EffectId) -> EffectFlags {
    with_node(id, |n| n.flags).unwrap_or_default()
}

pub fn children_of(id: EffectId) -> Vec<EffectId> {
    with_node(id, |n| n.children.to_vec()).unwrap_or_default()
}

pub fn parent_of(id: EffectId) -> Option<EffectId> {
    with_node(id, |n| n.parent).flatten()
}

pub fn effect_stats() -> EffectStats {
    EFFECTS.with(|e| {
        let mut stats = EffectStats::default();
        for (_, n) in e.borrow().iter() {
            match n.state {
                EffectState::Active => stats.active += 1,
                EffectState::Paused => stats.paused += 1,
                EffectState::Destroyed => {}
            }
        }
        stats
    })
}

/// One line per live effect, indented by depth.
#[cfg(feature = "inspector")]
pub fn dump_tree() -> Vec<String> {
    fn walk(id: EffectId, out: &mut Vec<String>) {
        let Some((line, children)) = with_node(id, |n| {
            let line = format!(
                "{}{:?} {:?} nodes={} cleanups={}",
                "  ".repeat(n.depth),
                n.flags,
                n.state,
                n.nodes.len(),
                n.cleanups.len()
            );
            (line, n.children.clone())
        }) else {
            return;
        };
        out.push(line);
        for child in children {
            walk(child, out);
        }
    }

    let roots: Vec<EffectId> = EFFECTS.with(|e| {
        e.borrow()
            .iter()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(id, _)| id)
            .collect()
    });
    let mut out = Vec::new();
    for r in roots {
        walk(r, &mut out);
    }
    out
}

/// A disposer that runs at most once.
#[derive(Clone)]
pub struct Dispose(Rc<RefCell<Option<Box<dyn FnOnce()>>>>);

impl Dispose {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Rc::new(RefCell::new(Some(Box::new(f)))))
    }

    pub fn noop() -> Self {
        Self(Rc::new(RefCell::new(None)))
    }

    /// Runs at most once (safe to call multiple times).
    pub fn run(&self) {
        let f = self.0.borrow_mut().take();
        if let Some(f) = f {
            f()
        }
    }

    pub fn is_spent(&self) -> bool {
        self.0.borrow().is_none()
    }
}

impl std::fmt::Debug for Dispose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispose")
            .field("spent", &self.is_spent())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::signal;
    use crate::transition::{AnimationSpec, Easing, now, tick_at};
    use std::time::Duration;

    fn fade() -> Rc<Transition> {
        Transition::local(AnimationSpec::tween(Duration::from_millis(40), Easing::Linear))
    }

    #[test]
    fn destroy_runs_children_cleanups_before_the_parent() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let parent = effect({
            let log = log.clone();
            move || {
                for name in ["child1", "child2"] {
                    let log = log.clone();
                    effect(move || {
                        let log = log.clone();
                        on_cleanup(move || log.borrow_mut().push(name));
                    });
                }
                let log = log.clone();
                on_cleanup(move || log.borrow_mut().push("parent"));
            }
        });
        assert_eq!(children_of(parent).len(), 2);

        destroy(parent);
        assert_eq!(*log.borrow(), vec!["child1", "child2", "parent"]);
        assert_eq!(effect_stats(), EffectStats::default());
    }

    #[test]
    fn destroying_twice_is_a_no_op() {
        let cleaned = Rc::new(Cell::new(0));
        let e = effect({
            let cleaned = cleaned.clone();
            move || {
                let cleaned = cleaned.clone();
                on_cleanup(move || cleaned.set(cleaned.get() + 1));
            }
        });
        destroy(e);
        destroy(e);
        assert_eq!(cleaned.get(), 1);
        assert_eq!(effect_state(e), EffectState::Destroyed);
    }

    #[test]
    fn a_panicking_cleanup_does_not_stop_the_rest() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let parent = effect({
            let log = log.clone();
            move || {
                effect(|| on_cleanup(|| panic!("child1 cleanup")));
                let child_log = log.clone();
                effect(move || {
                    let log = child_log.clone();
                    on_cleanup(move || log.borrow_mut().push("child2"));
                });
                let log = log.clone();
                on_cleanup(move || log.borrow_mut().push("parent"));
            }
        });

        let result = catch_unwind(AssertUnwindSafe(|| destroy(parent)));
        let payload = result.expect_err("the cleanup panic is re-raised");
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"child1 cleanup"));
        assert_eq!(*log.borrow(), vec!["child2", "parent"]);
        assert_eq!(effect_state(parent), EffectState::Destroyed);
        assert_eq!(effect_stats(), EffectStats::default());
    }

    #[test]
    fn cleanups_run_before_each_rerun() {
        let count = signal(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let e = effect({
            let count = count.clone();
            let log = log.clone();
            move || {
                let n = count.get();
                log.borrow_mut().push(format!("run {n}"));
                let log = log.clone();
                on_cleanup(move || log.borrow_mut().push(format!("clean {n}")));
            }
        });
        count.set(1);
        destroy(e);
        assert_eq!(*log.borrow(), vec!["run 0", "clean 0", "run 1", "clean 1"]);
    }

    #[test]
    fn pause_without_transitions_completes_synchronously() {
        let done = Rc::new(Cell::new(false));
        let e = effect(|| {});
        pause(e, {
            let done = done.clone();
            move || done.set(true)
        });
        assert!(done.get());
        assert_eq!(effect_state(e), EffectState::Destroyed);

        // already gone: the callback still runs
        let again = Rc::new(Cell::new(false));
        pause(e, {
            let again = again.clone();
            move || again.set(true)
        });
        assert!(again.get());
    }

    #[test]
    fn resume_on_an_active_effect_changes_nothing() {
        let runs = Rc::new(Cell::new(0));
        let e = effect({
            let runs = runs.clone();
            move || runs.set(runs.get() + 1)
        });
        resume(e);
        resume(e);
        assert_eq!(runs.get(), 1);
        assert_eq!(effect_state(e), EffectState::Active);
        destroy(e);
    }

    #[test]
    fn paused_effect_defers_reruns_until_resumed() {
        let count = signal(0);
        let seen = Rc::new(Cell::new(-1));
        let cleaned = Rc::new(Cell::new(0));
        let e = branch({
            let count = count.clone();
            let seen = seen.clone();
            let cleaned = cleaned.clone();
            move || {
                register_transition(fade());
                effect(move || {
                    seen.set(count.get());
                    let cleaned = cleaned.clone();
                    on_cleanup(move || cleaned.set(cleaned.get() + 1));
                });
            }
        });
        let completed = Rc::new(Cell::new(false));
        pause(e, {
            let completed = completed.clone();
            move || completed.set(true)
        });
        assert_eq!(effect_state(e), EffectState::Paused);
        assert_eq!(cleaned.get(), 0);

        count.set(7);
        assert_eq!(seen.get(), 0);

        resume(e);
        assert_eq!(seen.get(), 7);
        assert_eq!(cleaned.get(), 1);

        // the cancelled pause never completes
        tick_at(now() + Duration::from_secs(1));
        assert!(!completed.get());
        assert_eq!(effect_state(e), EffectState::Active);

        pause(e, || {});
        tick_at(now() + Duration::from_secs(2));
        assert_eq!(effect_state(e), EffectState::Destroyed);
        assert_eq!(cleaned.get(), 2);
    }

    #[test]
    fn block_reruns_keep_branch_children() {
        let count = signal(0);
        let made = Rc::new(Cell::new(None));
        let b = block(
            {
                let count = count.clone();
                let made = made.clone();
                move || {
                    count.get();
                    if made.get().is_none() {
                        made.set(Some(branch(|| {})));
                    }
                }
            },
            EffectFlags::empty(),
        );
        count.set(1);
        let kept = made.get().expect("branch created on the first run");
        assert_eq!(effect_state(kept), EffectState::Active);
        assert_eq!(children_of(b), vec![kept]);
        assert_eq!(parent_of(kept), Some(b));
        destroy(b);
        assert_eq!(effect_state(kept), EffectState::Destroyed);
    }

    #[test]
    fn dispose_runs_once() {
        let hits = Rc::new(Cell::new(0));
        let d = Dispose::new({
            let hits = hits.clone();
            move || hits.set(hits.get() + 1)
        });
        d.clone().run();
        d.run();
        assert_eq!(hits.get(), 1);
        assert!(d.is_spent());
        assert!(Dispose::noop().is_spent());
    }
}
