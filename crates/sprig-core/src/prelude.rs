pub use crate::attributes::{AttrValue, ClassValue, StyleOverrides, attr, clsx, escape_html, to_class, to_style};
pub use crate::blocks::{Branches, ChainLink, if_block};
pub use crate::component::Component;
pub use crate::config::{RuntimeOptions, configure, options};
pub use crate::dom::{Dom, NodeId};
pub use crate::effects::{Dispose, EffectId, branch, destroy, effect, on_cleanup, pause, resume};
pub use crate::error::{ErrorInfo, error_boundary};
pub use crate::events::{
    Event, EventError, Handler, ListenerOptions, ListenerPlan, Modifier, bubble,
    create_event_dispatcher, listen, listen_component, register,
};
pub use crate::hydration::{Anchor, hydrate, mount};
pub use crate::reactive::{batch, untrack};
pub use crate::signal::{Signal, signal};
pub use crate::style::{set_display, set_style};
pub use crate::transition::{AnimationSpec, Easing, Transition, tick};
