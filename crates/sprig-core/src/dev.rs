//! Developer-facing advisories.
//!
//! Advisories are never errors: the runtime recovers and keeps going. Each
//! one is logged at `warn`, and in dev mode also handed to every installed
//! sink (the inspector in `sprig-devtools` is one).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::config::options;
use crate::effects::Dispose;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Advisory {
    /// Server-rendered markup disagreed with the branch chosen on the client.
    HydrationMismatch {
        /// Position of the block in its else-if chain.
        root_index: usize,
        /// Raw marker text, or `None` when no marker node was found.
        marker: Option<String>,
    },
    /// A node claimed during hydration had a different kind than expected.
    HydrationNodeMismatch { expected: &'static str },
    /// An `on:` directive was passed to a component that only takes callback props.
    OnDirectiveOnCallbackComponent { event: String, component: String },
    /// The scheduler dropped queued effects after too many passes.
    FlushOverrun { passes: usize, dropped: usize },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::HydrationMismatch { root_index, marker } => match marker {
                Some(m) => write!(
                    f,
                    "hydration mismatch in conditional block (chain index {root_index}, marker {m:?}); rebuilding on the client"
                ),
                None => write!(
                    f,
                    "hydration mismatch in conditional block (chain index {root_index}, no marker); rebuilding on the client"
                ),
            },
            Advisory::HydrationNodeMismatch { expected } => {
                write!(f, "hydration expected a {expected} node; creating a fresh one")
            }
            Advisory::OnDirectiveOnCallbackComponent { event, component } => write!(
                f,
                "using on:{event} to listen to the {component} component is deprecated; use the on{event} prop instead"
            ),
            Advisory::FlushOverrun { passes, dropped } => write!(
                f,
                "effect flush exceeded {passes} passes; dropped {dropped} queued effects (possible update cycle)"
            ),
        }
    }
}

type Sink = Rc<dyn Fn(&Advisory)>;

thread_local! {
    static SINKS: RefCell<Vec<(u64, Sink)>> = const { RefCell::new(Vec::new()) };
    static NEXT_SINK: std::cell::Cell<u64> = const { std::cell::Cell::new(0) };
}

/// Installs a sink; running the returned `Dispose` removes it.
pub fn add_sink(sink: impl Fn(&Advisory) + 'static) -> Dispose {
    let id = NEXT_SINK.with(|n| {
        let id = n.get();
        n.set(id + 1);
        id
    });
    SINKS.with(|s| s.borrow_mut().push((id, Rc::new(sink))));
    Dispose::new(move || {
        SINKS.with(|s| s.borrow_mut().retain(|(sid, _)| *sid != id));
    })
}

pub fn report(advisory: Advisory) {
    log::warn!("{advisory}");
    if !options().dev {
        return;
    }
    let sinks: Vec<Sink> = SINKS.with(|s| s.borrow().iter().map(|(_, f)| f.clone()).collect());
    for sink in sinks {
        sink(&advisory);
    }
}
