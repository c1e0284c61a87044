//! Adopting server-rendered markup.
//!
//! While hydrating, a cursor walks the existing nodes in document order and
//! the creation helpers on [`Anchor`] claim the node under the cursor
//! instead of creating one. Conditional blocks are delimited by comment
//! markers:
//!
//! | marker | meaning                        |
//! |--------|--------------------------------|
//! | `[`    | branch taken at depth 0        |
//! | `[!`   | no branch taken (else)         |
//! | `[N`   | branch taken at chain depth N  |
//! | `]`    | end of the block               |

use std::cell::{Cell, RefCell};

use crate::dev::{Advisory, report};
use crate::dom::{Dom, NodeId, NodeKind};
use crate::effects::{self, EffectId, own_node};

pub const HYDRATION_START: &str = "[";
pub const HYDRATION_START_ELSE: &str = "[!";
pub const HYDRATION_END: &str = "]";

thread_local! {
    static HYDRATING: Cell<bool> = const { Cell::new(false) };
    static CURSOR: Cell<Option<NodeId>> = const { Cell::new(None) };
    static DOM: RefCell<Option<Dom>> = const { RefCell::new(None) };
}

pub fn hydrating() -> bool {
    HYDRATING.with(|h| h.get())
}

pub fn set_hydrating(value: bool) {
    HYDRATING.with(|h| h.set(value));
}

pub fn hydrate_node() -> Option<NodeId> {
    CURSOR.with(|c| c.get())
}

pub fn set_hydrate_node(node: Option<NodeId>) {
    CURSOR.with(|c| c.set(node));
}

fn hydrate_dom() -> Option<Dom> {
    DOM.with(|d| d.borrow().clone())
}

/// Moves the cursor to the next sibling and returns it.
pub fn hydrate_next() -> Option<NodeId> {
    let next = match (hydrate_dom(), hydrate_node()) {
        (Some(dom), Some(node)) => dom.next_sibling(node),
        _ => None,
    };
    set_hydrate_node(next);
    next
}

fn is_block_open(data: &str) -> bool {
    data.starts_with('[')
}

/// Removes nodes from the cursor up to the `]` closing the current block,
/// skipping over nested blocks. Returns that `]` node (left in place), or
/// `None` when the siblings ran out first.
pub fn remove_nodes() -> Option<NodeId> {
    let dom = hydrate_dom()?;
    let mut depth = 0usize;
    let mut node = hydrate_node();
    while let Some(n) = node {
        if let Some(data) = dom.comment_data(n) {
            if data == HYDRATION_END {
                if depth == 0 {
                    return Some(n);
                }
                depth -= 1;
            } else if is_block_open(&data) {
                depth += 1;
            }
        }
        node = dom.next_sibling(n);
        dom.remove(n);
    }
    None
}

/// Chain depth recovered from a block's opening marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HydrateIndex {
    /// Not read yet; the block reads its own marker.
    Unread,
    Depth(i64),
    /// `[!`: compares greater than every depth.
    Else,
    /// The marker could not be parsed; always a mismatch.
    Invalid,
    /// Hydration was abandoned further up the chain.
    Disabled,
}

impl HydrateIndex {
    pub fn parse(marker: &str) -> Self {
        match marker {
            HYDRATION_START => HydrateIndex::Depth(0),
            HYDRATION_START_ELSE => HydrateIndex::Else,
            _ => marker
                .strip_prefix('[')
                .and_then(parse_leading_int)
                .map_or(HydrateIndex::Invalid, HydrateIndex::Depth),
        }
    }

    /// Whether the server took a branch after the one at `root_index`.
    /// `None` when that cannot be known.
    pub fn is_else_for(self, root_index: usize) -> Option<bool> {
        match self {
            HydrateIndex::Depth(n) => Some(n > root_index as i64),
            HydrateIndex::Else => Some(true),
            HydrateIndex::Unread | HydrateIndex::Invalid | HydrateIndex::Disabled => None,
        }
    }
}

// Leading-integer parse: optional whitespace and sign, then at least one
// digit; anything after the digits is ignored.
fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

/// Insertion point for generated content: inside `parent`, before
/// `before` (or at the end).
#[derive(Clone, Debug)]
pub struct Anchor {
    pub dom: Dom,
    pub parent: NodeId,
    pub before: Option<NodeId>,
    // top-level content is owned by the current effect
    owning: bool,
}

impl Anchor {
    pub fn new(dom: &Dom, parent: NodeId, before: Option<NodeId>) -> Self {
        Self {
            dom: dom.clone(),
            parent,
            before,
            owning: true,
        }
    }

    fn insert(&self, node: NodeId) {
        // A fresh node created while hydrating goes where the cursor is.
        let before = if hydrating() {
            hydrate_node().filter(|c| self.dom.parent(*c) == Some(self.parent))
        } else {
            self.before
        };
        self.dom.insert_before(self.parent, node, before.or(self.before));
        if self.owning {
            own_node(&self.dom, node);
        }
    }

    fn claim(&self, expected: &'static str, matches: impl Fn(&NodeKind) -> bool) -> Option<NodeId> {
        if !hydrating() {
            return None;
        }
        let node = hydrate_node();
        match node.and_then(|n| self.dom.kind(n).map(|k| (n, k))) {
            Some((n, kind)) if matches(&kind) => {
                hydrate_next();
                if self.owning {
                    own_node(&self.dom, n);
                }
                Some(n)
            }
            _ => {
                report(Advisory::HydrationNodeMismatch { expected });
                None
            }
        }
    }

    pub fn text(&self, text: &str) -> NodeId {
        if let Some(n) = self.claim("text", |k| matches!(k, NodeKind::Text(_))) {
            if self.dom.text(n).as_deref() != Some(text) {
                self.dom.set_text(n, text);
            }
            return n;
        }
        let n = self.dom.create_text(text);
        self.insert(n);
        n
    }

    pub fn element(&self, tag: &str) -> NodeId {
        if let Some(n) = self.claim("element", |k| matches!(k, NodeKind::Element { tag: t } if t == tag)) {
            return n;
        }
        let n = self.dom.create_element(tag);
        self.insert(n);
        n
    }

    pub fn comment(&self, data: &str) -> NodeId {
        if let Some(n) = self.claim("comment", |k| matches!(k, NodeKind::Comment(_))) {
            return n;
        }
        let n = self.dom.create_comment(data);
        self.insert(n);
        n
    }

    /// Runs `f` with an anchor inside `element`. While hydrating, the cursor
    /// descends into the element and resumes after it when `f` returns.
    pub fn with_children<R>(&self, element: NodeId, f: impl FnOnce(&Anchor) -> R) -> R {
        let inner = Anchor {
            dom: self.dom.clone(),
            parent: element,
            before: None,
            owning: false,
        };
        if !hydrating() {
            return f(&inner);
        }
        let resume_at = hydrate_node();
        set_hydrate_node(self.dom.first_child(element));
        let out = f(&inner);
        set_hydrate_node(resume_at);
        out
    }
}

fn install(dom: &Dom, hydrate_from: Option<NodeId>, on: bool) -> (bool, Option<NodeId>, Option<Dom>) {
    let prev = (hydrating(), hydrate_node(), hydrate_dom());
    DOM.with(|d| *d.borrow_mut() = Some(dom.clone()));
    set_hydrate_node(hydrate_from);
    set_hydrating(on);
    prev
}

fn restore(prev: (bool, Option<NodeId>, Option<Dom>)) {
    set_hydrating(prev.0);
    set_hydrate_node(prev.1);
    DOM.with(|d| *d.borrow_mut() = prev.2);
}

/// Renders `app` into `target` from scratch.
pub fn mount(dom: &Dom, target: NodeId, app: impl FnOnce(&Anchor) + 'static) -> EffectId {
    let prev = install(dom, None, false);
    let anchor = Anchor::new(dom, target, None);
    let id = effects::root(move || app(&anchor));
    restore(prev);
    id
}

/// Runs `app` against the markup already inside `target`, claiming nodes
/// instead of creating them.
pub fn hydrate(dom: &Dom, target: NodeId, app: impl FnOnce(&Anchor) + 'static) -> EffectId {
    let prev = install(dom, dom.first_child(target), true);
    log::debug!("hydrate: starting at {:?}", hydrate_node());
    let anchor = Anchor::new(dom, target, None);
    let id = effects::root(move || app(&anchor));
    restore(prev);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_markers() {
        assert_eq!(HydrateIndex::parse("["), HydrateIndex::Depth(0));
        assert_eq!(HydrateIndex::parse("[!"), HydrateIndex::Else);
        assert_eq!(HydrateIndex::parse("[2"), HydrateIndex::Depth(2));
        assert_eq!(HydrateIndex::parse("[3x"), HydrateIndex::Depth(3));
        assert_eq!(HydrateIndex::parse("[x"), HydrateIndex::Invalid);
        assert_eq!(HydrateIndex::parse("]"), HydrateIndex::Invalid);
        assert_eq!(HydrateIndex::Else.is_else_for(7), Some(true));
        assert_eq!(HydrateIndex::Depth(1).is_else_for(1), Some(false));
        assert_eq!(HydrateIndex::Invalid.is_else_for(0), None);
    }

    #[test]
    fn remove_nodes_skips_nested_blocks() {
        let dom = Dom::new();
        let root = dom.create_element("div");
        let first = dom.create_text("a");
        let nested_open = dom.create_comment("[1");
        let nested_text = dom.create_text("b");
        let nested_close = dom.create_comment("]");
        let end = dom.create_comment("]");
        let after = dom.create_text("tail");
        for n in [first, nested_open, nested_text, nested_close, end, after] {
            dom.append_child(root, n);
        }

        let prev = install(&dom, Some(first), true);
        let found = remove_nodes();
        restore(prev);

        assert_eq!(found, Some(end));
        assert_eq!(dom.stats().removed, 4);
        assert_eq!(dom.inner_html(root), "<!--]-->tail");
    }

    #[test]
    fn hydrate_claims_matching_nodes() {
        let dom = Dom::new();
        let root = dom.create_element("main");
        let p = dom.create_element("p");
        let t = dom.create_text("hello");
        dom.append_child(root, p);
        dom.append_child(p, t);
        let created = dom.stats().created;

        let claimed = std::rc::Rc::new(Cell::new(None));
        let e = hydrate(&dom, root, {
            let claimed = claimed.clone();
            move |anchor| {
                let el = anchor.element("p");
                anchor.with_children(el, |inner| {
                    inner.text("hello");
                });
                claimed.set(Some(el));
            }
        });
        assert_eq!(claimed.get(), Some(p));
        assert_eq!(dom.stats().created, created);
        assert!(!hydrating());
        effects::destroy(e);
        assert_eq!(dom.inner_html(root), "");
    }
}
