//! # Sprig runtime
//!
//! The runtime behind templates compiled by `sprig-compiler`. Generated code
//! builds an effect tree, asks the runtime to manage conditional branches,
//! adopts server-rendered markup and forwards component events.
//!
//! - [`Signal<T>`]: observable value. Reads inside an effect subscribe it.
//! - [`effect`], [`branch`], [`root`]: nodes of the effect tree. Each effect
//!   owns the effects created while it runs and the nodes it inserted.
//! - [`if_block`]: `{#if}` / `{:else if}` / `{:else}` with exit transitions
//!   and branch reuse.
//! - [`hydrate`]: claims existing nodes instead of creating them, and
//!   recovers when the server picked a different branch.
//! - [`events`]: listeners, modifiers and the per-component bubble registry
//!   with wildcard forwarding.
//!
//! ## Signals and effects
//!
//! ```rust
//! use sprig_core::*;
//!
//! let count = signal(0);
//! let doubled = std::rc::Rc::new(std::cell::Cell::new(0));
//! let e = effect({
//!     let count = count.clone();
//!     let doubled = doubled.clone();
//!     move || doubled.set(count.get() * 2)
//! });
//! count.update(|v| *v += 2);
//! assert_eq!(doubled.get(), 4);
//! destroy(e);
//! ```
//!
//! Writes made while an effect is running are queued and flushed once the
//! outermost effect returns, parents before children.
//!
//! ## Conditional blocks
//!
//! ```rust
//! use sprig_core::*;
//!
//! let dom = Dom::new();
//! let target = dom.create_element("main");
//! let show = signal(true);
//! let app = mount(&dom, target, {
//!     let show = show.clone();
//!     move |anchor| {
//!         if_block(anchor, move |b| {
//!             if show.get() {
//!                 b.set(|a, _| {
//!                     a.text("yes");
//!                 });
//!             } else {
//!                 b.set_flag(false, |a, _| {
//!                     a.text("no");
//!                 });
//!             }
//!         }, ChainLink::root());
//!     }
//! });
//! assert_eq!(dom.inner_html(target), "yes<!---->");
//! show.set(false);
//! assert_eq!(dom.inner_html(target), "no<!---->");
//! destroy(app);
//! ```
//!
//! Outgoing branches are paused, not destroyed: if they carry transitions
//! they stay in the tree until the outro finishes, and flipping the
//! condition back in the meantime resumes the same branch.

pub mod attributes;
pub mod blocks;
pub mod component;
pub mod config;
pub mod dev;
pub mod dom;
pub mod effects;
pub mod error;
pub mod events;
pub mod hydration;
pub mod legacy;
pub mod prelude;
pub mod reactive;
pub mod scope;
pub mod signal;
pub mod style;
pub mod tests;
pub mod transition;

pub use attributes::*;
pub use blocks::*;
pub use component::*;
pub use dev::{Advisory, add_sink};
pub use dom::*;
pub use effects::*;
pub use error::*;
pub use hydration::*;
pub use legacy::{LegacyError, Props};
pub use reactive::*;
pub use scope::*;
pub use signal::*;
pub use style::*;
pub use transition::*;
