use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::effects::{self, EffectId, branch};
use crate::hydration::Anchor;
use crate::scope::current_effect;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorInfo {
    pub message: String,
    /// The boundary that caught the panic.
    pub boundary: Option<EffectId>,
}

/// Renders `content` in a branch of its own. If building it panics, the
/// partial subtree is destroyed (its cleanups run and its nodes are
/// removed) and `fallback` is rendered in its place.
///
/// Only panics raised while `content` is being built are caught; a later
/// re-run of an inner effect propagates as usual.
pub fn error_boundary(
    anchor: &Anchor,
    content: impl FnOnce(&Anchor) + 'static,
    fallback: impl FnOnce(&Anchor, ErrorInfo) + 'static,
) -> EffectId {
    let anchor = anchor.clone();
    branch(move || {
        let boundary = current_effect();
        let inner = anchor.clone();
        let Err(err) = catch_unwind(AssertUnwindSafe(move || branch(move || content(&inner)))) else {
            return;
        };

        let message = if let Some(s) = err.downcast_ref::<String>() {
            s.clone()
        } else if let Some(s) = err.downcast_ref::<&str>() {
            s.to_string()
        } else {
            "Unknown panic".to_string()
        };
        log::error!("error boundary caught: {message}");

        if let Some(id) = boundary {
            for child in effects::children_of(id) {
                effects::destroy(child);
            }
        }
        let fb_anchor = anchor.clone();
        branch(move || fallback(&fb_anchor, ErrorInfo { message, boundary }));
    })
}
