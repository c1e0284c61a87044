//! In-memory node tree the runtime renders into and hydrates from.
//!
//! `Dom` is a cheap handle (`Rc`) over a slotmap of nodes. Removing a node
//! only detaches it; its id stays valid so a caller can re-insert it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use slotmap::{SlotMap, new_key_type};

use crate::attributes::escape_html;
use crate::events::{Event, Handler, ListenerOptions};
use crate::transition::Transition;

new_key_type! {
    pub struct NodeId;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Element { tag: String },
    Text(String),
    Comment(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DomStats {
    pub created: usize,
    pub removed: usize,
}

#[derive(Clone)]
struct ListenerRecord {
    id: u64,
    event: String,
    handler: Handler,
    options: ListenerOptions,
}

struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: Vec<(String, String)>,
    // (property, value, important)
    style: Vec<(String, String, bool)>,
    style_cache: HashMap<String, Option<String>>,
    display_cache: Option<bool>,
    transitions: Vec<Rc<Transition>>,
    listeners: Vec<ListenerRecord>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            attributes: Vec::new(),
            style: Vec::new(),
            style_cache: HashMap::new(),
            display_cache: None,
            transitions: Vec::new(),
            listeners: Vec::new(),
        }
    }
}

#[derive(Default)]
struct Tree {
    nodes: SlotMap<NodeId, NodeData>,
    next_listener: u64,
    stats: DomStats,
}

#[derive(Clone, Default)]
pub struct Dom(Rc<RefCell<Tree>>);

impl Dom {
    pub fn new() -> Self {
        Self::default()
    }

    fn create(&self, kind: NodeKind) -> NodeId {
        let mut t = self.0.borrow_mut();
        t.stats.created += 1;
        t.nodes.insert(NodeData::new(kind))
    }

    pub fn create_element(&self, tag: &str) -> NodeId {
        self.create(NodeKind::Element {
            tag: tag.to_string(),
        })
    }

    pub fn create_text(&self, text: &str) -> NodeId {
        self.create(NodeKind::Text(text.to_string()))
    }

    pub fn create_comment(&self, data: &str) -> NodeId {
        self.create(NodeKind::Comment(data.to_string()))
    }

    pub fn same_tree(&self, other: &Dom) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn stats(&self) -> DomStats {
        self.0.borrow().stats
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.0.borrow().nodes.contains_key(node)
    }

    fn detach(t: &mut Tree, node: NodeId) -> bool {
        let Some(parent) = t.nodes.get_mut(node).and_then(|n| n.parent.take()) else {
            return false;
        };
        if let Some(p) = t.nodes.get_mut(parent) {
            p.children.retain(|c| *c != node);
        }
        true
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Inserts `child` under `parent` before `before`, or last when `before`
    /// is `None` or not a child of `parent`.
    pub fn insert_before(&self, parent: NodeId, child: NodeId, before: Option<NodeId>) {
        let mut t = self.0.borrow_mut();
        if !t.nodes.contains_key(parent) || !t.nodes.contains_key(child) || parent == child {
            return;
        }
        Self::detach(&mut t, child);
        if let Some(c) = t.nodes.get_mut(child) {
            c.parent = Some(parent);
        }
        if let Some(p) = t.nodes.get_mut(parent) {
            let at = before
                .and_then(|b| p.children.iter().position(|c| *c == b))
                .unwrap_or(p.children.len());
            p.children.insert(at, child);
        }
    }

    /// Detaches `node` from its parent. Removing a detached node is a no-op.
    pub fn remove(&self, node: NodeId) {
        let mut t = self.0.borrow_mut();
        if Self::detach(&mut t, node) {
            t.stats.removed += 1;
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.0.borrow().nodes.get(node).and_then(|n| n.parent)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.0
            .borrow()
            .nodes
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.0
            .borrow()
            .nodes
            .get(node)
            .and_then(|n| n.children.first().copied())
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let t = self.0.borrow();
        let parent = t.nodes.get(node)?.parent?;
        let siblings = &t.nodes.get(parent)?.children;
        let at = siblings.iter().position(|c| *c == node)?;
        siblings.get(at + 1).copied()
    }

    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.0.borrow().nodes.get(node).map(|n| n.kind.clone())
    }

    pub fn tag(&self, node: NodeId) -> Option<String> {
        match self.kind(node)? {
            NodeKind::Element { tag } => Some(tag),
            _ => None,
        }
    }

    pub fn text(&self, node: NodeId) -> Option<String> {
        match self.kind(node)? {
            NodeKind::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn comment_data(&self, node: NodeId) -> Option<String> {
        match self.kind(node)? {
            NodeKind::Comment(s) => Some(s),
            _ => None,
        }
    }

    pub fn set_text(&self, node: NodeId, text: &str) {
        if let Some(n) = self.0.borrow_mut().nodes.get_mut(node) {
            match &mut n.kind {
                NodeKind::Text(s) | NodeKind::Comment(s) => *s = text.to_string(),
                NodeKind::Element { .. } => log::debug!("set_text on an element ignored"),
            }
        }
    }

    /// Sets an attribute, or removes it when `value` is `None`.
    pub fn set_attribute(&self, node: NodeId, name: &str, value: Option<&str>) {
        if let Some(n) = self.0.borrow_mut().nodes.get_mut(node) {
            let existing = n.attributes.iter().position(|(k, _)| k == name);
            match (existing, value) {
                (Some(i), Some(v)) => n.attributes[i].1 = v.to_string(),
                (None, Some(v)) => n.attributes.push((name.to_string(), v.to_string())),
                (Some(i), None) => {
                    n.attributes.remove(i);
                }
                (None, None) => {}
            }
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.0.borrow().nodes.get(node).and_then(|n| {
            n.attributes
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        })
    }

    pub fn set_style_property(&self, node: NodeId, key: &str, value: &str, important: bool) {
        if let Some(n) = self.0.borrow_mut().nodes.get_mut(node) {
            match n.style.iter_mut().find(|(k, _, _)| k == key) {
                Some(entry) => {
                    entry.1 = value.to_string();
                    entry.2 = important;
                }
                None => n.style.push((key.to_string(), value.to_string(), important)),
            }
        }
    }

    pub fn remove_style_property(&self, node: NodeId, key: &str) {
        if let Some(n) = self.0.borrow_mut().nodes.get_mut(node) {
            n.style.retain(|(k, _, _)| k != key);
        }
    }

    /// Value and priority of an inline style property.
    pub fn style_property(&self, node: NodeId, key: &str) -> Option<(String, bool)> {
        self.0.borrow().nodes.get(node).and_then(|n| {
            n.style
                .iter()
                .find(|(k, _, _)| k == key)
                .map(|(_, v, imp)| (v.clone(), *imp))
        })
    }

    /// The inline style as `style` attribute text.
    pub fn style_text(&self, node: NodeId) -> String {
        let t = self.0.borrow();
        let Some(n) = t.nodes.get(node) else {
            return String::new();
        };
        n.style
            .iter()
            .map(|(k, v, imp)| {
                if *imp {
                    format!("{k}: {v} !important;")
                } else {
                    format!("{k}: {v};")
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub(crate) fn cached_style(&self, node: NodeId, key: &str) -> Option<Option<String>> {
        self.0
            .borrow()
            .nodes
            .get(node)
            .and_then(|n| n.style_cache.get(key).cloned())
    }

    pub(crate) fn cache_style(&self, node: NodeId, key: &str, value: Option<String>) {
        if let Some(n) = self.0.borrow_mut().nodes.get_mut(node) {
            n.style_cache.insert(key.to_string(), value);
        }
    }

    pub(crate) fn replace_display_cache(&self, node: NodeId, visible: bool) -> Option<bool> {
        self.0
            .borrow_mut()
            .nodes
            .get_mut(node)
            .and_then(|n| n.display_cache.replace(visible))
    }

    /// Attaches a transition that `set_display` plays on this element.
    pub fn add_transition(&self, node: NodeId, t: Rc<Transition>) {
        if let Some(n) = self.0.borrow_mut().nodes.get_mut(node) {
            n.transitions.push(t);
        }
    }

    pub fn transitions(&self, node: NodeId) -> Vec<Rc<Transition>> {
        self.0
            .borrow()
            .nodes
            .get(node)
            .map(|n| n.transitions.clone())
            .unwrap_or_default()
    }

    pub fn add_listener(
        &self,
        node: NodeId,
        event: &str,
        handler: Handler,
        options: ListenerOptions,
    ) -> u64 {
        let mut t = self.0.borrow_mut();
        t.next_listener += 1;
        let id = t.next_listener;
        if let Some(n) = t.nodes.get_mut(node) {
            n.listeners.push(ListenerRecord {
                id,
                event: event.to_string(),
                handler,
                options,
            });
        }
        id
    }

    pub fn remove_listener(&self, node: NodeId, id: u64) {
        if let Some(n) = self.0.borrow_mut().nodes.get_mut(node) {
            n.listeners.retain(|l| l.id != id);
        }
    }

    pub fn listener_count(&self, node: NodeId) -> usize {
        self.0
            .borrow()
            .nodes
            .get(node)
            .map_or(0, |n| n.listeners.len())
    }

    fn has_listener(&self, node: NodeId, id: u64) -> bool {
        self.0
            .borrow()
            .nodes
            .get(node)
            .is_some_and(|n| n.listeners.iter().any(|l| l.id == id))
    }

    fn listeners_for(&self, node: NodeId, event: &str, capture: bool, at_target: bool) -> Vec<ListenerRecord> {
        self.0
            .borrow()
            .nodes
            .get(node)
            .map(|n| {
                n.listeners
                    .iter()
                    .filter(|l| l.event == event && (at_target || l.options.capture == capture))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Dispatches `event` at `target`: capture listeners from the root down,
    /// then the target, then bubbling listeners back up (if the event
    /// bubbles). Returns `false` when a listener prevented the default.
    pub fn dispatch(&self, target: NodeId, event: &Event) -> bool {
        let mut path = vec![target];
        let mut cur = self.parent(target);
        while let Some(p) = cur {
            path.push(p);
            cur = self.parent(p);
        }
        event.set_target(Some(target));

        let mut phases: Vec<(NodeId, bool, bool)> = Vec::new();
        for node in path.iter().skip(1).rev() {
            phases.push((*node, true, false));
        }
        phases.push((target, false, true));
        if event.bubbles() {
            for node in path.iter().skip(1) {
                phases.push((*node, false, false));
            }
        }

        for (node, capture, at_target) in phases {
            if event.propagation_stopped() {
                break;
            }
            event.set_current_target(Some(node));
            for l in self.listeners_for(node, event.kind(), capture, at_target) {
                if event.immediate_propagation_stopped() {
                    break;
                }
                // Removed by an earlier listener in this same dispatch.
                if !self.has_listener(node, l.id) {
                    continue;
                }
                if l.options.once {
                    self.remove_listener(node, l.id);
                }
                event.enter_listener(l.options.passive.unwrap_or(false));
                (l.handler)(event);
                event.leave_listener();
            }
        }
        event.set_current_target(None);
        !event.default_prevented()
    }

    /// Serializes `node` and its subtree.
    pub fn to_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_html(node, &mut out);
        out
    }

    /// Serializes the children of `node`.
    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for c in self.children(node) {
            self.write_html(c, &mut out);
        }
        out
    }

    fn write_html(&self, node: NodeId, out: &mut String) {
        let Some(kind) = self.kind(node) else { return };
        match kind {
            NodeKind::Text(s) => out.push_str(&escape_html(&s, false)),
            NodeKind::Comment(s) => {
                out.push_str("<!--");
                out.push_str(&s);
                out.push_str("-->");
            }
            NodeKind::Element { tag } => {
                out.push('<');
                out.push_str(&tag);
                let (attrs, style) = {
                    let t = self.0.borrow();
                    let attrs = t.nodes.get(node).map(|n| n.attributes.clone()).unwrap_or_default();
                    (attrs, t.nodes.get(node).is_some_and(|n| !n.style.is_empty()))
                };
                for (k, v) in attrs {
                    out.push_str(&format!(" {k}=\"{}\"", escape_html(&v, true)));
                }
                if style {
                    out.push_str(&format!(" style=\"{}\"", escape_html(&self.style_text(node), true)));
                }
                out.push('>');
                for c in self.children(node) {
                    self.write_html(c, out);
                }
                out.push_str("</");
                out.push_str(&tag);
                out.push('>');
            }
        }
    }
}

impl std::fmt::Debug for Dom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = self.0.borrow();
        f.debug_struct("Dom")
            .field("nodes", &t.nodes.len())
            .field("stats", &t.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn insert_before_and_remove() {
        let dom = Dom::new();
        let root = dom.create_element("div");
        let a = dom.create_text("a");
        let b = dom.create_comment("b");
        dom.append_child(root, b);
        dom.insert_before(root, a, Some(b));
        assert_eq!(dom.to_html(root), "<div>a<!--b--></div>");
        assert_eq!(dom.next_sibling(a), Some(b));
        dom.remove(a);
        dom.remove(a);
        assert_eq!(dom.stats().removed, 1);
        assert_eq!(dom.inner_html(root), "<!--b-->");
    }

    #[test]
    fn dispatch_captures_then_bubbles() {
        let dom = Dom::new();
        let outer = dom.create_element("div");
        let inner = dom.create_element("button");
        dom.append_child(outer, inner);
        let log = Rc::new(RefCell::new(Vec::new()));
        let push = |tag: &'static str| -> Handler {
            let log = log.clone();
            Rc::new(move |_e: &Event| log.borrow_mut().push(tag))
        };
        dom.add_listener(outer, "click", push("outer-bubble"), ListenerOptions::default());
        dom.add_listener(
            outer,
            "click",
            push("outer-capture"),
            ListenerOptions {
                capture: true,
                ..Default::default()
            },
        );
        dom.add_listener(
            inner,
            "click",
            push("inner-once"),
            ListenerOptions {
                once: true,
                ..Default::default()
            },
        );
        dom.dispatch(inner, &Event::new("click"));
        dom.dispatch(inner, &Event::new("click"));
        assert_eq!(
            *log.borrow(),
            vec!["outer-capture", "inner-once", "outer-bubble", "outer-capture", "outer-bubble"]
        );
    }

    #[test]
    fn stop_propagation_halts_bubbling() {
        let dom = Dom::new();
        let outer = dom.create_element("div");
        let inner = dom.create_element("span");
        dom.append_child(outer, inner);
        let reached = Rc::new(RefCell::new(false));
        dom.add_listener(inner, "click", Rc::new(|e: &Event| e.stop_propagation()), ListenerOptions::default());
        {
            let reached = reached.clone();
            dom.add_listener(outer, "click", Rc::new(move |_e: &Event| *reached.borrow_mut() = true), ListenerOptions::default());
        }
        dom.dispatch(inner, &Event::new("click"));
        assert!(!*reached.borrow());
    }

    #[test]
    fn passive_listener_cannot_prevent_default() {
        let dom = Dom::new();
        let el = dom.create_element("div");
        dom.add_listener(
            el,
            "wheel",
            Rc::new(|e: &Event| e.prevent_default()),
            ListenerOptions {
                passive: Some(true),
                ..Default::default()
            },
        );
        assert!(dom.dispatch(el, &Event::new("wheel")));
    }
}
