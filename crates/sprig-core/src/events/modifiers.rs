//! The closed set of event modifiers and what each one does to a listener.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use smallvec::SmallVec;

use super::{Event, EventError, Handler, ListenerOptions};

/// Wraps the handler with a check or side effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Guard {
    Trusted,
    SelfOnly,
    StopImmediatePropagation,
    StopPropagation,
    PreventDefault,
}

/// Passed to the listener registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListenerFlag {
    Capture,
    Once,
    Passive,
    NonPassive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModifierEffect {
    Guard(Guard),
    Option(ListenerFlag),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Modifier {
    PreventDefault,
    StopPropagation,
    StopImmediatePropagation,
    Capture,
    Once,
    Passive,
    NonPassive,
    SelfOnly,
    Trusted,
}

impl Modifier {
    /// Every modifier, in the order error messages list them.
    pub const ALL: [Modifier; 9] = [
        Modifier::PreventDefault,
        Modifier::StopPropagation,
        Modifier::StopImmediatePropagation,
        Modifier::Capture,
        Modifier::Once,
        Modifier::Passive,
        Modifier::NonPassive,
        Modifier::SelfOnly,
        Modifier::Trusted,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Modifier::PreventDefault => "preventDefault",
            Modifier::StopPropagation => "stopPropagation",
            Modifier::StopImmediatePropagation => "stopImmediatePropagation",
            Modifier::Capture => "capture",
            Modifier::Once => "once",
            Modifier::Passive => "passive",
            Modifier::NonPassive => "nonpassive",
            Modifier::SelfOnly => "self",
            Modifier::Trusted => "trusted",
        }
    }

    pub fn effect(self) -> ModifierEffect {
        match self {
            Modifier::PreventDefault => ModifierEffect::Guard(Guard::PreventDefault),
            Modifier::StopPropagation => ModifierEffect::Guard(Guard::StopPropagation),
            Modifier::StopImmediatePropagation => {
                ModifierEffect::Guard(Guard::StopImmediatePropagation)
            }
            Modifier::SelfOnly => ModifierEffect::Guard(Guard::SelfOnly),
            Modifier::Trusted => ModifierEffect::Guard(Guard::Trusted),
            Modifier::Capture => ModifierEffect::Option(ListenerFlag::Capture),
            Modifier::Once => ModifierEffect::Option(ListenerFlag::Once),
            Modifier::Passive => ModifierEffect::Option(ListenerFlag::Passive),
            Modifier::NonPassive => ModifierEffect::Option(ListenerFlag::NonPassive),
        }
    }

    pub fn is_modifier_name(name: &str) -> bool {
        name.parse::<Modifier>().is_ok()
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Modifier {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Modifier::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| EventError::UnknownModifier(s.to_string()))
    }
}

/// Guards (in wrapping order) and listener options derived from a set of
/// modifiers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListenerPlan {
    pub guards: SmallVec<[Guard; 5]>,
    pub options: ListenerOptions,
}

const GUARD_ORDER: [Guard; 5] = [
    Guard::Trusted,
    Guard::SelfOnly,
    Guard::StopImmediatePropagation,
    Guard::StopPropagation,
    Guard::PreventDefault,
];

impl ListenerPlan {
    pub fn from_modifiers(modifiers: &[Modifier]) -> Self {
        let mut plan = ListenerPlan::default();
        for g in GUARD_ORDER {
            if modifiers.contains(&Modifier::from_guard(g)) {
                plan.guards.push(g);
            }
        }
        for m in modifiers {
            if let ModifierEffect::Option(flag) = m.effect() {
                match flag {
                    ListenerFlag::Capture => plan.options.capture = true,
                    ListenerFlag::Once => plan.options.once = true,
                    ListenerFlag::Passive => plan.options.passive = Some(true),
                    ListenerFlag::NonPassive => plan.options.passive = Some(false),
                }
            }
        }
        plan
    }

    /// Wraps `handler` with every guard; the last guard ends up outermost.
    pub fn wrap(&self, handler: Handler) -> Handler {
        self.guards
            .iter()
            .fold(handler, |inner, guard| guard.wrap(inner))
    }
}

impl Modifier {
    fn from_guard(g: Guard) -> Modifier {
        match g {
            Guard::Trusted => Modifier::Trusted,
            Guard::SelfOnly => Modifier::SelfOnly,
            Guard::StopImmediatePropagation => Modifier::StopImmediatePropagation,
            Guard::StopPropagation => Modifier::StopPropagation,
            Guard::PreventDefault => Modifier::PreventDefault,
        }
    }
}

impl Guard {
    pub fn wrap(self, inner: Handler) -> Handler {
        match self {
            Guard::Trusted => Rc::new(move |e: &Event| {
                if e.is_trusted() {
                    inner(e)
                }
            }),
            Guard::SelfOnly => Rc::new(move |e: &Event| {
                if e.target() == e.current_target() {
                    inner(e)
                }
            }),
            Guard::StopImmediatePropagation => Rc::new(move |e: &Event| {
                e.stop_immediate_propagation();
                inner(e)
            }),
            Guard::StopPropagation => Rc::new(move |e: &Event| {
                e.stop_propagation();
                inner(e)
            }),
            Guard::PreventDefault => Rc::new(move |e: &Event| {
                e.prevent_default();
                inner(e)
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn plan_orders_guards_and_collects_options() {
        let plan = ListenerPlan::from_modifiers(&[
            Modifier::PreventDefault,
            Modifier::Once,
            Modifier::Trusted,
            Modifier::NonPassive,
        ]);
        assert_eq!(plan.guards.as_slice(), &[Guard::Trusted, Guard::PreventDefault]);
        assert!(plan.options.once);
        assert_eq!(plan.options.passive, Some(false));
        assert!(!plan.options.capture);
    }

    #[test]
    fn outer_guards_run_before_inner_checks() {
        // preventDefault is outermost, so it fires even when `trusted` rejects.
        let plan = ListenerPlan::from_modifiers(&[Modifier::Trusted, Modifier::PreventDefault]);
        let called = Rc::new(Cell::new(false));
        let handler = {
            let called = called.clone();
            plan.wrap(Rc::new(move |_e: &Event| called.set(true)))
        };
        let synthetic = Event::new("click").untrusted();
        handler(&synthetic);
        assert!(synthetic.default_prevented());
        assert!(!called.get());

        handler(&Event::new("click"));
        assert!(called.get());
    }

    #[test]
    fn parse_round_trips_names() {
        for m in Modifier::ALL {
            assert_eq!(m.name().parse::<Modifier>().ok(), Some(m));
        }
        assert!("prevent_default".parse::<Modifier>().is_err());
    }
}
