use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::dev::{Advisory, report};
use crate::effects::{self, EffectFlags, EffectId, branch, own_node, pause, resume};
use crate::hydration::{
    Anchor, HYDRATION_END, HydrateIndex, hydrate_next, hydrate_node, hydrating, remove_nodes,
    set_hydrate_node, set_hydrating,
};

/// Position of a block inside an `if / else if / else` chain. The root of a
/// chain uses [`ChainLink::root`]; the alternate builder receives the link
/// for the next member.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainLink {
    pub root_index: usize,
    pub hydrate_index: HydrateIndex,
}

impl ChainLink {
    pub fn root() -> Self {
        Self {
            root_index: 0,
            hydrate_index: HydrateIndex::Unread,
        }
    }
}

impl Default for ChainLink {
    fn default() -> Self {
        Self::root()
    }
}

type BuildFn = Box<dyn FnOnce(&Anchor, ChainLink)>;

/// Handed to the selector on every evaluation. Calling neither method
/// leaves the block without a branch.
#[derive(Default)]
pub struct Branches {
    chosen: Option<(bool, BuildFn)>,
}

impl Branches {
    /// Selects the consequent branch.
    pub fn set(&mut self, build: impl FnOnce(&Anchor, ChainLink) + 'static) {
        self.set_flag(true, build);
    }

    /// Selects the consequent (`true`) or alternate (`false`) branch.
    pub fn set_flag(&mut self, flag: bool, build: impl FnOnce(&Anchor, ChainLink) + 'static) {
        self.chosen = Some((flag, Box::new(build)));
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Condition {
    Uninitialized,
    Null,
    Bool(bool),
}

struct IfState {
    anchor: RefCell<Anchor>,
    marker: Option<String>,
    condition: Cell<Condition>,
    consequent: Cell<Option<EffectId>>,
    alternate: Cell<Option<EffectId>>,
    hydrate_index: Cell<HydrateIndex>,
    root_index: usize,
}

impl IfState {
    fn slot(&self, consequent: bool) -> &Cell<Option<EffectId>> {
        if consequent { &self.consequent } else { &self.alternate }
    }
}

fn pause_slot(state: &Rc<IfState>, consequent: bool) {
    let Some(id) = state.slot(consequent).get() else {
        return;
    };
    let weak: Weak<IfState> = Rc::downgrade(state);
    pause(id, move || {
        if let Some(state) = weak.upgrade() {
            let slot = state.slot(consequent);
            if slot.get() == Some(id) {
                slot.set(None);
            }
        }
    });
}

// Returns true when the server-rendered branch disagrees with `truthy` and
// recovery has run.
fn check_hydration(state: &IfState, truthy: bool) -> bool {
    if !hydrating() || state.hydrate_index.get() == HydrateIndex::Disabled {
        return false;
    }
    if state.hydrate_index.get() == HydrateIndex::Unread {
        let parsed = state
            .marker
            .as_deref()
            .map_or(HydrateIndex::Invalid, HydrateIndex::parse);
        state.hydrate_index.set(parsed);
    }
    let index = state.hydrate_index.get();
    let mismatch = match index.is_else_for(state.root_index) {
        Some(is_else) => truthy == is_else,
        None => true,
    };
    if !mismatch {
        return false;
    }

    report(Advisory::HydrationMismatch {
        root_index: state.root_index,
        marker: state.marker.clone(),
    });
    let end = remove_nodes();
    state.anchor.borrow_mut().before = end;
    set_hydrate_node(end);
    set_hydrating(false);
    state.hydrate_index.set(HydrateIndex::Disabled);
    true
}

fn update_branch(state: &Rc<IfState>, next: Condition, build: Option<BuildFn>) {
    if state.condition.replace(next) == next {
        return;
    }
    let truthy = next == Condition::Bool(true);
    let mismatch = check_hydration(state, truthy);
    let anchor = state.anchor.borrow().clone();

    match next {
        Condition::Bool(true) => {
            if let Some(id) = state.consequent.get() {
                resume(id);
            } else if let Some(build) = build {
                log::debug!("if_block[{}]: building consequent", state.root_index);
                let id = branch(move || build(&anchor, ChainLink::root()));
                state.consequent.set(Some(id));
            }
            pause_slot(state, false);
        }
        Condition::Bool(false) => {
            if let Some(id) = state.alternate.get() {
                resume(id);
            } else if let Some(build) = build {
                log::debug!("if_block[{}]: building alternate", state.root_index);
                let link = ChainLink {
                    root_index: state.root_index + 1,
                    hydrate_index: state.hydrate_index.get(),
                };
                let id = branch(move || build(&anchor, link));
                state.alternate.set(Some(id));
            }
            pause_slot(state, true);
        }
        Condition::Null | Condition::Uninitialized => {
            pause_slot(state, true);
            pause_slot(state, false);
        }
    }

    if mismatch {
        set_hydrating(true);
    }
}

/// Conditional block. `selector` runs under tracking on every evaluation
/// and picks a branch through [`Branches`]; a change of condition resumes
/// or builds the incoming branch and pauses the outgoing one, which is
/// destroyed once its exit transitions finish. Flipping back before then
/// resumes the same branch instance.
pub fn if_block(
    anchor: &Anchor,
    selector: impl Fn(&mut Branches) + 'static,
    link: ChainLink,
) -> EffectId {
    let mut anchor = anchor.clone();
    let mut marker = None;
    if link.root_index == 0 {
        if hydrating() {
            if let Some(open) = hydrate_node() {
                marker = anchor.dom.comment_data(open);
                if marker.is_some() {
                    own_node(&anchor.dom, open);
                }
            }
            hydrate_next();
        } else {
            let placeholder = anchor.dom.create_comment("");
            anchor.dom.insert_before(anchor.parent, placeholder, anchor.before);
            own_node(&anchor.dom, placeholder);
            anchor.before = Some(placeholder);
        }
    }

    let dom = anchor.dom.clone();
    let state = Rc::new(IfState {
        anchor: RefCell::new(anchor),
        marker,
        condition: Cell::new(Condition::Uninitialized),
        consequent: Cell::new(None),
        alternate: Cell::new(None),
        hydrate_index: Cell::new(link.hydrate_index),
        root_index: link.root_index,
    });

    let flags = if link.root_index > 0 {
        EffectFlags::TRANSPARENT
    } else {
        EffectFlags::empty()
    };

    let block_state = state.clone();
    let id = effects::block(
        move || {
            let mut branches = Branches::default();
            selector(&mut branches);
            match branches.chosen {
                Some((flag, build)) => update_branch(&block_state, Condition::Bool(flag), Some(build)),
                None => update_branch(&block_state, Condition::Null, None),
            }
        },
        flags,
    );

    if hydrating() {
        let end = hydrate_node();
        state.anchor.borrow_mut().before = end;
        if link.root_index == 0 {
            // The chain root owns the `[` and `]` markers.
            if let Some(end) = end.filter(|n| dom.comment_data(*n).as_deref() == Some(HYDRATION_END)) {
                own_node(&dom, end);
            }
            hydrate_next();
        }
    }
    id
}

/// Ids of the consequent and alternate branches currently held by the
/// block `id` (active or paused).
pub fn branch_effects(id: EffectId) -> Vec<EffectId> {
    effects::children_of(id)
        .into_iter()
        .filter(|c| effects::flags_of(*c).contains(EffectFlags::BRANCH))
        .collect()
}
