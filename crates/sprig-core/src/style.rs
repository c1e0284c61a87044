use std::cell::Cell;
use std::rc::Rc;

use crate::dom::{Dom, NodeId};

/// Sets (or with `None` removes) one inline style property. Repeating the
/// last value written through this function is a no-op.
pub fn set_style(dom: &Dom, node: NodeId, key: &str, value: Option<&str>, important: bool) {
    let value = value.map(str::to_string);
    if dom.cached_style(node, key).as_ref() == Some(&value) {
        return;
    }
    dom.cache_style(node, key, value.clone());
    match value {
        Some(v) => dom.set_style_property(node, key, &v, important),
        None => dom.remove_style_property(node, key),
    }
}

/// Shows or hides an element (`style:display|if`). Hiding plays the
/// element's transitions out before `display: none !important` is applied;
/// showing removes `display` and plays them in.
pub fn set_display(dom: &Dom, node: NodeId, visible: bool) {
    if dom.replace_display_cache(node, visible) == Some(visible) {
        return;
    }
    let transitions = dom.transitions(node);
    if transitions.is_empty() {
        if visible {
            dom.remove_style_property(node, "display");
        } else {
            dom.set_style_property(node, "display", "none", true);
        }
        return;
    }

    dom.remove_style_property(node, "display");
    if visible {
        for t in &transitions {
            t.intro();
        }
        return;
    }

    let remaining = Rc::new(Cell::new(transitions.len()));
    for t in &transitions {
        let remaining = remaining.clone();
        let all = transitions.clone();
        let dom = dom.clone();
        t.outro(Box::new(move || {
            remaining.set(remaining.get() - 1);
            if remaining.get() == 0 {
                for t in &all {
                    t.stop();
                }
                dom.set_style_property(node, "display", "none", true);
            }
        }));
    }
}
