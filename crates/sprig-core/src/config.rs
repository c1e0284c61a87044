//! Per-thread runtime options.
//!
//! The runtime is single-threaded, so options live in a thread-local and are
//! read by value. Install them once before mounting:
//!
//! ```rust
//! use sprig_core::config::{RuntimeOptions, configure, options};
//!
//! configure(RuntimeOptions {
//!     dev: true,
//!     ..RuntimeOptions::default()
//! });
//! assert!(options().dev);
//! ```

use std::cell::RefCell;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Forward advisories (hydration mismatches, deprecated directives) to
    /// installed sinks. They are always logged.
    pub dev: bool,
    /// Upper bound on scheduling passes in one flush before the remaining
    /// queue is dropped.
    pub max_flush_passes: usize,
    /// Keep the v4 component instance API (`$on`, `$set`, `$destroy`) alive.
    pub component_api_v4: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            dev: cfg!(debug_assertions),
            max_flush_passes: 1000,
            component_api_v4: false,
        }
    }
}

thread_local! {
    static OPTIONS: RefCell<RuntimeOptions> = RefCell::new(RuntimeOptions::default());
}

pub fn configure(opts: RuntimeOptions) {
    OPTIONS.with(|o| *o.borrow_mut() = opts);
}

pub fn options() -> RuntimeOptions {
    OPTIONS.with(|o| o.borrow().clone())
}

/// Runs `f` with `opts` installed, restoring the previous options afterwards.
pub fn with_options<R>(opts: RuntimeOptions, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<RuntimeOptions>);
    impl Drop for Restore {
        fn drop(&mut self) {
            if let Some(prev) = self.0.take() {
                configure(prev);
            }
        }
    }
    let _restore = Restore(Some(options()));
    configure(opts);
    f()
}
