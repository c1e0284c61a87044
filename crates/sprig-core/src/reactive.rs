//! Dependency tracking and the flush loop.
//!
//! Reads inside a running effect record an edge `signal -> effect`. A write
//! marks every dependent dirty and queues it; the queue is flushed once no
//! effect is executing and no batch is open, so a write made from inside an
//! effect is never re-entered in that effect's own frame.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use slotmap::{SlotMap, new_key_type};

use crate::config::options;
use crate::dev::{Advisory, report};
use crate::effects::{self, EffectId};

new_key_type! {
    pub struct SignalId;
}

thread_local! {
    static CURRENT_OBSERVER: Cell<Option<EffectId>> = const { Cell::new(None) };
    static GRAPH: RefCell<DepGraph> = RefCell::new(DepGraph::default());
    static SCHEDULER: RefCell<Scheduler> = RefCell::new(Scheduler::default());
}

#[derive(Default)]
struct DepGraph {
    signals: SlotMap<SignalId, ()>,
    // signal_id -> effects that read it during their last run
    edges: HashMap<SignalId, HashSet<EffectId>>,
    // effect_id -> signals it read
    back: HashMap<EffectId, HashSet<SignalId>>,
}

impl DepGraph {
    fn remove_all_edges_for(&mut self, obs: EffectId) {
        if let Some(signals) = self.back.remove(&obs) {
            for s in signals {
                if let Some(set) = self.edges.get_mut(&s) {
                    set.remove(&obs);
                }
            }
        }
    }

    fn remove_signal(&mut self, sig: SignalId) {
        self.signals.remove(sig);
        if let Some(observers) = self.edges.remove(&sig) {
            for obs in observers {
                if let Some(set) = self.back.get_mut(&obs) {
                    set.remove(&sig);
                }
            }
        }
    }
}

#[derive(Default)]
struct Scheduler {
    pending: Vec<EffectId>,
    queued: HashSet<EffectId>,
    batch_depth: usize,
    running: usize,
    flushing: bool,
    stats: FlushStats,
}

/// Running scheduler totals for the current thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Flushes that ran at least one pass.
    pub flushes: u64,
    pub passes: u64,
    /// Effects actually re-executed.
    pub reruns: u64,
}

impl FlushStats {
    /// Work done between `earlier` and `self`.
    pub fn since(&self, earlier: FlushStats) -> FlushStats {
        FlushStats {
            flushes: self.flushes.saturating_sub(earlier.flushes),
            passes: self.passes.saturating_sub(earlier.passes),
            reruns: self.reruns.saturating_sub(earlier.reruns),
        }
    }
}

pub fn flush_stats() -> FlushStats {
    SCHEDULER.with(|s| s.borrow().stats)
}

fn record(f: impl FnOnce(&mut FlushStats)) {
    SCHEDULER.with(|s| f(&mut s.borrow_mut().stats));
}

pub fn new_signal() -> SignalId {
    GRAPH.with(|g| g.borrow_mut().signals.insert(()))
}

/// Forgets a signal and its edges. Safe to call during thread teardown.
pub fn release_signal(sig: SignalId) {
    let _ = GRAPH.try_with(|g| {
        if let Ok(mut g) = g.try_borrow_mut() {
            g.remove_signal(sig);
        }
    });
}

/// Records that the current observer (if any) read `sig`.
pub fn read_tracked(sig: SignalId) {
    if let Some(obs) = CURRENT_OBSERVER.with(|co| co.get()) {
        GRAPH.with(|g| {
            let mut g = g.borrow_mut();
            g.edges.entry(sig).or_default().insert(obs);
            g.back.entry(obs).or_default().insert(sig);
        });
    }
}

/// Marks every effect that read `sig` dirty and schedules the active ones.
pub fn notify_dependents(sig: SignalId) {
    let dependents: Vec<EffectId> = GRAPH.with(|g| {
        g.borrow()
            .edges
            .get(&sig)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    });
    for obs in dependents {
        if effects::mark_dirty(obs) {
            schedule(obs);
        }
    }
    flush_if_idle();
}

pub fn current_observer() -> Option<EffectId> {
    CURRENT_OBSERVER.with(|co| co.get())
}

/// Drops every edge recorded for `obs`.
pub fn clear_dependencies(obs: EffectId) {
    let _ = GRAPH.try_with(|g| {
        if let Ok(mut g) = g.try_borrow_mut() {
            g.remove_all_edges_for(obs);
        }
    });
}

pub fn dependency_count(obs: EffectId) -> usize {
    GRAPH.with(|g| g.borrow().back.get(&obs).map_or(0, |s| s.len()))
}

struct ObserverGuard(Option<EffectId>);

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        CURRENT_OBSERVER.with(|co| co.set(self.0));
    }
}

/// Runs `f` with `obs` as the current observer, after clearing the edges of
/// its previous run.
pub fn track<R>(obs: EffectId, f: impl FnOnce() -> R) -> R {
    GRAPH.with(|g| g.borrow_mut().remove_all_edges_for(obs));
    let _guard = ObserverGuard(CURRENT_OBSERVER.with(|co| co.replace(Some(obs))));
    f()
}

/// Runs `f` without recording any reads.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _guard = ObserverGuard(CURRENT_OBSERVER.with(|co| co.replace(None)));
    f()
}

pub(crate) fn schedule(obs: EffectId) {
    SCHEDULER.with(|s| {
        let mut s = s.borrow_mut();
        if s.queued.insert(obs) {
            s.pending.push(obs);
        }
    });
}

/// Marks the span of an effect execution; flushing waits until the outermost
/// execution has returned.
pub(crate) struct RunGuard;

impl RunGuard {
    pub(crate) fn enter() -> Self {
        SCHEDULER.with(|s| s.borrow_mut().running += 1);
        RunGuard
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let _ = SCHEDULER.try_with(|s| s.borrow_mut().running -= 1);
    }
}

/// Defers flushing until `f` returns. Nested batches flush once, at the
/// outermost exit.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    struct BatchGuard;
    impl Drop for BatchGuard {
        fn drop(&mut self) {
            let _ = SCHEDULER.try_with(|s| s.borrow_mut().batch_depth -= 1);
        }
    }
    SCHEDULER.with(|s| s.borrow_mut().batch_depth += 1);
    let result = {
        let _guard = BatchGuard;
        f()
    };
    flush_if_idle();
    result
}

pub(crate) fn flush_if_idle() {
    let idle = SCHEDULER.with(|s| {
        let s = s.borrow();
        s.batch_depth == 0 && s.running == 0 && !s.flushing
    });
    if idle {
        flush();
    }
}

pub fn is_flushing() -> bool {
    SCHEDULER.with(|s| s.borrow().flushing)
}

/// Re-runs every queued dirty effect. Each pass runs shallower effects
/// first, so a parent decides its branches before any child re-runs; writes
/// made during a pass are picked up by the next one.
pub fn flush() {
    struct FlushGuard;
    impl Drop for FlushGuard {
        fn drop(&mut self) {
            let _ = SCHEDULER.try_with(|s| s.borrow_mut().flushing = false);
        }
    }

    let already = SCHEDULER.with(|s| std::mem::replace(&mut s.borrow_mut().flushing, true));
    if already {
        return;
    }
    let _guard = FlushGuard;
    let max_passes = options().max_flush_passes;
    let mut passes = 0usize;

    loop {
        let batch: Vec<EffectId> = SCHEDULER.with(|s| {
            let mut s = s.borrow_mut();
            s.queued.clear();
            std::mem::take(&mut s.pending)
        });
        if batch.is_empty() {
            break;
        }
        passes += 1;
        if passes == 1 {
            record(|st| st.flushes += 1);
        }
        if passes > max_passes {
            log::error!("flush: giving up after {max_passes} passes");
            report(Advisory::FlushOverrun {
                passes: max_passes,
                dropped: batch.len(),
            });
            break;
        }

        let mut ordered: Vec<((usize, u64), EffectId)> = batch
            .into_iter()
            .filter_map(|id| effects::schedule_key(id).map(|k| (k, id)))
            .collect();
        ordered.sort_by_key(|(key, _)| *key);
        log::trace!("flush: pass {passes}, {} effects", ordered.len());
        record(|st| st.passes += 1);

        for (_, id) in ordered {
            if effects::rerun_if_dirty(id) {
                record(|st| st.reruns += 1);
            }
        }
    }
}
