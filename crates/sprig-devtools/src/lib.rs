use std::cell::RefCell;
use std::rc::Rc;

use web_time::Instant;

use sprig_core::dev::{Advisory, add_sink};
use sprig_core::{
    Dispose, Dom, FlushStats, NodeId, dump_tree, effect_stats, flush_stats, running_transitions,
};

pub struct Hud {
    pub inspector_enabled: bool,
    pub show_tree: bool,
    samples: u64,
    last_sample: Option<Instant>,
    last_flush: FlushStats,
    pub metrics: Option<Metrics>,
}

impl Default for Hud {
    fn default() -> Self {
        Self::new()
    }
}

impl Hud {
    pub fn new() -> Self {
        Self {
            inspector_enabled: false,
            show_tree: false,
            samples: 0,
            last_sample: None,
            last_flush: flush_stats(),
            metrics: None,
        }
    }

    pub fn toggle_inspector(&mut self) {
        self.inspector_enabled = !self.inspector_enabled;
    }

    pub fn toggle_tree(&mut self) {
        self.show_tree = !self.show_tree;
    }

    /// Samples the runtime and returns the overlay text. Scheduler counts
    /// cover the work done since the previous sample.
    pub fn overlay(&mut self, advisories: &[Advisory]) -> String {
        self.samples += 1;
        let now = Instant::now();
        let window = self.last_sample.replace(now).map(|prev| now - prev);
        let totals = flush_stats();
        let flushed = totals.since(self.last_flush);
        self.last_flush = totals;

        let stats = effect_stats();
        let metrics = Metrics {
            active_effects: stats.active,
            paused_effects: stats.paused,
            running_transitions: running_transitions(),
            advisories: advisories.len(),
            flush_passes: flushed.passes,
            reruns: flushed.reruns,
        };
        let mut scheduler = format!("flush: {} passes, {} re-runs", metrics.flush_passes, metrics.reruns);
        if let Some(window) = window {
            scheduler.push_str(&format!(" in {}ms", window.as_millis()));
        }
        let mut lines = vec![[
            format!("sample: {}", self.samples),
            scheduler,
            format!("effects: {} active, {} paused", metrics.active_effects, metrics.paused_effects),
            format!("transitions: {}", metrics.running_transitions),
            format!("advisories: {}", metrics.advisories),
        ]
        .join("  |  ")];
        if let Some(last) = advisories.last() {
            lines.push(format!("last: {last}"));
        }
        if self.show_tree {
            lines.extend(dump_tree());
        }
        self.metrics = Some(metrics);
        lines.join("\n")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metrics {
    pub active_effects: usize,
    pub paused_effects: usize,
    pub running_transitions: usize,
    pub advisories: usize,
    /// Scheduler passes since the previous sample.
    pub flush_passes: u64,
    pub reruns: u64,
}

/// Collects runtime advisories (hydration mismatches, deprecated
/// directives, flush overruns) while attached. Advisories only reach it
/// when `RuntimeOptions::dev` is set.
pub struct Inspector {
    pub hud: Hud,
    advisories: Rc<RefCell<Vec<Advisory>>>,
    sink: Option<Dispose>,
}

impl Default for Inspector {
    fn default() -> Self {
        Self::new()
    }
}

impl Inspector {
    pub fn new() -> Self {
        Self {
            hud: Hud::new(),
            advisories: Rc::new(RefCell::new(Vec::new())),
            sink: None,
        }
    }

    pub fn attach(&mut self) {
        if self.sink.is_some() {
            return;
        }
        let log = self.advisories.clone();
        self.sink = Some(add_sink(move |a| log.borrow_mut().push(a.clone())));
        log::debug!("inspector attached");
    }

    pub fn detach(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.run();
        }
    }

    pub fn advisories(&self) -> Vec<Advisory> {
        self.advisories.borrow().clone()
    }

    pub fn clear(&self) {
        self.advisories.borrow_mut().clear();
    }

    /// Writes the overlay into `node` as its text, when enabled.
    pub fn frame(&mut self, dom: &Dom, node: NodeId) {
        if self.hud.inspector_enabled {
            let text = self.hud.overlay(&self.advisories.borrow());
            dom.set_text(node, &text);
        }
    }
}

impl Drop for Inspector {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprig_core::config::{RuntimeOptions, with_options};
    use sprig_core::dev::report;
    use sprig_core::{destroy, effect, signal};

    #[test]
    fn collects_advisories_while_attached() {
        let opts = RuntimeOptions {
            dev: true,
            ..RuntimeOptions::default()
        };
        with_options(opts, || {
            let mut inspector = Inspector::new();
            inspector.attach();
            report(Advisory::HydrationNodeMismatch { expected: "text" });
            inspector.detach();
            report(Advisory::HydrationNodeMismatch { expected: "element" });
            assert_eq!(
                inspector.advisories(),
                vec![Advisory::HydrationNodeMismatch { expected: "text" }]
            );
        });
    }

    #[test]
    fn overlay_reports_effect_counts() {
        let count = signal(0);
        let e = effect({
            let count = count.clone();
            move || {
                count.get();
            }
        });
        let dom = Dom::new();
        let node = dom.create_text("");
        let mut inspector = Inspector::new();
        inspector.hud.toggle_inspector();
        inspector.hud.toggle_tree();
        inspector.frame(&dom, node);

        let text = dom.text(node).unwrap_or_default();
        assert!(text.starts_with("sample: 1"));
        assert!(text.contains("flush: 0 passes, 0 re-runs"));
        assert!(text.contains("effects: 1 active, 0 paused"));
        assert_eq!(inspector.hud.metrics.as_ref().map(|m| m.active_effects), Some(1));

        count.set(1);
        count.set(2);
        inspector.frame(&dom, node);
        let metrics = inspector.hud.metrics.clone().unwrap_or_default();
        assert_eq!((metrics.flush_passes, metrics.reruns), (2, 2));
        assert!(dom.text(node).unwrap_or_default().starts_with("sample: 2"));

        inspector.frame(&dom, node);
        assert_eq!(inspector.hud.metrics.as_ref().map(|m| m.reruns), Some(0));
        destroy(e);
    }
}
