//! # Directive validation
//!
//! The template compiler checks `on:` and `style:` directives before code
//! generation and lowers them into what `sprig-core` consumes: a
//! [`ListenerPlan`](sprig_core::events::ListenerPlan) for handlers, an
//! alias for forwards, and a flag for `style:display|if`.
//!
//! ```rust
//! use sprig_compiler::*;
//!
//! let directive = EventDirective::handler("click", &["preventDefault", "once"]);
//! let (validated, warnings) =
//!     validate_event_directive(&directive, &CompileOptions::default()).unwrap();
//! assert!(warnings.is_empty());
//! let ValidatedDirective::Handler(h) = validated else { unreachable!() };
//! assert!(h.plan.options.once);
//! ```

mod event_handler;
mod style_directive;

use thiserror::Error;

pub use event_handler::*;
pub use style_directive::*;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Emit code for the legacy runtime, where `once` and `passive` are
    /// unavailable.
    pub legacy: bool,
    /// Log warnings as they are produced.
    pub dev: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Event handlers cannot be attached to `on:*`; only forwarding is allowed")]
    HandlerOnAnyEvent,
    #[error("The '{0}' and '{1}' modifiers cannot be used together")]
    ModifierCombination(&'static str, &'static str),
    #[error("Valid event modifiers are {0}")]
    InvalidModifier(String),
    #[error("The '{0}' modifier cannot be used in legacy mode")]
    LegacyModifier(&'static str),
    #[error("An event can be forwarded under at most one alias")]
    ForwardAliasCount,
    #[error("Invalid alias \"{0}\" for `on:*`: it must contain a single `*` at its start or end")]
    ForwardAnyAlias(String),
    #[error("Invalid alias \"{alias}\" for `on:{event}`: only `on:*` can be forwarded under a wildcard")]
    ForwardAlias { event: String, alias: String },
    #[error("Invalid event name \"{0}\"")]
    InvalidEventName(String),
    #[error("`style:` directive can only use the `important` modifier")]
    StyleDirectiveModifier,
}

/// Non-fatal findings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Warning {
    /// `passive` on a touch or wheel handler that is already made passive.
    RedundantPassiveForTouch { event: String },
    /// `passive` on an event other than touch or wheel.
    RedundantPassive { event: String },
    /// The forwarding alias has the name of a modifier.
    AliasIsModifier { event: String, alias: String },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::RedundantPassiveForTouch { event } => write!(
                f,
                "on:{event}: touch event handlers that don't use the event object are passive by default"
            ),
            Warning::RedundantPassive { event } => write!(
                f,
                "on:{event}: the passive modifier only works with wheel and touch events"
            ),
            Warning::AliasIsModifier { event, alias } => write!(
                f,
                "on:{event}|{alias}: forwarding alias has the name of an event modifier; use a different name"
            ),
        }
    }
}

/// Joins items the way messages list them: `a`, `a or b`, `a, b or c`.
pub fn list(items: &[&str], conjunction: &str) -> String {
    match items {
        [] => String::new(),
        [only] => (*only).to_string(),
        [init @ .., last] => format!("{} {conjunction} {last}", init.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_formats_like_prose() {
        assert_eq!(list(&[], "or"), "");
        assert_eq!(list(&["a"], "or"), "a");
        assert_eq!(list(&["a", "b"], "or"), "a or b");
        assert_eq!(list(&["a", "b", "c"], "and"), "a, b and c");
    }
}
