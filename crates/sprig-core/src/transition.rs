//! Exit/entry transitions and the clock that drives them.
//!
//! A [`Transition`] animates a progress value between 0 (gone) and 1
//! (present). `outro` plays it out and calls back when it reaches 0; `intro`
//! plays it back in and drops the pending callback. Running transitions are
//! advanced by [`tick`] (or [`tick_at`] with an explicit instant in tests).

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use parking_lot::RwLock;
use web_time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Easing {
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
}

impl Easing {
    pub fn interpolate(&self, t: f32) -> f32 {
        match self {
            Easing::Linear => t,
            Easing::EaseIn => t * t,
            Easing::EaseOut => t * (2.0 - t),
            Easing::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnimationSpec {
    pub duration: Duration,
    pub easing: Easing,
    pub delay: Duration,
}

impl Default for AnimationSpec {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(300),
            easing: Easing::EaseInOut,
            delay: Duration::ZERO,
        }
    }
}

impl AnimationSpec {
    pub fn tween(duration: Duration, easing: Easing) -> Self {
        Self {
            duration,
            easing,
            delay: Duration::ZERO,
        }
    }

    pub fn fast() -> Self {
        Self::tween(Duration::from_millis(150), Easing::EaseOut)
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn is_instant(&self) -> bool {
        self.duration.is_zero() && self.delay.is_zero()
    }
}

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock frozen at `t`.
#[derive(Clone)]
pub struct TestClock {
    pub t: Instant,
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.t
    }
}

static CLOCK: RwLock<Option<Box<dyn Clock>>> = parking_lot::const_rwlock(None);

/// Replaces the global transition clock.
pub fn set_clock(clock: Box<dyn Clock>) {
    *CLOCK.write() = Some(clock);
}

pub fn now() -> Instant {
    CLOCK
        .read()
        .as_ref()
        .map(|c| c.now())
        .unwrap_or_else(Instant::now)
}

/// Progress value moving toward 0 or 1 over an [`AnimationSpec`].
struct Progress {
    current: f32,
    target: f32,
    start: f32,
    spec: AnimationSpec,
    start_time: Option<Instant>,
}

impl Progress {
    fn new(initial: f32, spec: AnimationSpec) -> Self {
        Self {
            current: initial,
            target: initial,
            start: initial,
            spec,
            start_time: None,
        }
    }

    fn set_target(&mut self, target: f32, at: Instant) {
        self.start = self.current;
        self.target = target;
        self.start_time = Some(at);
    }

    /// Advances to `at`. Returns whether the value is still moving.
    fn update_at(&mut self, at: Instant) -> bool {
        let Some(start) = self.start_time else {
            return false;
        };
        let elapsed = at.saturating_duration_since(start);
        if elapsed < self.spec.delay {
            return true;
        }
        let animation_time = elapsed - self.spec.delay;
        if animation_time >= self.spec.duration {
            self.finish();
            return false;
        }
        let t = animation_time.as_secs_f32() / self.spec.duration.as_secs_f32();
        let eased = self.spec.easing.interpolate(t);
        self.current = self.start + (self.target - self.start) * eased;
        true
    }

    fn finish(&mut self) {
        self.current = self.target;
        self.start_time = None;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Outro,
    Intro,
}

struct TransitionState {
    phase: Phase,
    progress: Progress,
    on_done: Option<Box<dyn FnOnce()>>,
}

pub struct Transition {
    spec: AnimationSpec,
    global: bool,
    state: RefCell<TransitionState>,
}

thread_local! {
    static RUNNING: RefCell<Vec<Rc<Transition>>> = const { RefCell::new(Vec::new()) };
}

impl Transition {
    /// A transition that plays only when its own branch is switched.
    pub fn local(spec: AnimationSpec) -> Rc<Self> {
        Self::build(spec, false)
    }

    /// A transition that also plays when any ancestor branch is switched.
    pub fn global(spec: AnimationSpec) -> Rc<Self> {
        Self::build(spec, true)
    }

    fn build(spec: AnimationSpec, global: bool) -> Rc<Self> {
        Rc::new(Self {
            spec,
            global,
            state: RefCell::new(TransitionState {
                phase: Phase::Idle,
                progress: Progress::new(1.0, spec),
                on_done: None,
            }),
        })
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    pub fn phase(&self) -> Phase {
        self.state.borrow().phase
    }

    pub fn progress(&self) -> f32 {
        self.state.borrow().progress.current
    }

    /// Plays the transition out; `done` runs once progress reaches 0.
    pub fn outro(self: &Rc<Self>, done: Box<dyn FnOnce()>) {
        if self.spec.is_instant() {
            {
                let mut st = self.state.borrow_mut();
                st.phase = Phase::Idle;
                st.progress.set_target(0.0, now());
                st.progress.finish();
                st.on_done = None;
            }
            done();
            return;
        }
        {
            let mut st = self.state.borrow_mut();
            st.phase = Phase::Outro;
            st.progress.set_target(0.0, now());
            st.on_done = Some(done);
        }
        self.enqueue();
    }

    /// Plays the transition back in, aborting a running outro.
    pub fn intro(self: &Rc<Self>) {
        let dropped = {
            let mut st = self.state.borrow_mut();
            let dropped = st.on_done.take();
            if self.spec.is_instant() {
                st.progress.set_target(1.0, now());
                st.progress.finish();
                st.phase = Phase::Idle;
            } else {
                st.phase = Phase::Intro;
                st.progress.set_target(1.0, now());
            }
            dropped
        };
        drop(dropped);
        if !self.spec.is_instant() {
            self.enqueue();
        }
    }

    /// Halts the transition where it is, dropping any pending callback.
    pub fn stop(&self) {
        let dropped = {
            let mut st = self.state.borrow_mut();
            st.phase = Phase::Idle;
            st.on_done.take()
        };
        drop(dropped);
        let me: *const Transition = self;
        let _ = RUNNING.try_with(|r| {
            if let Ok(mut r) = r.try_borrow_mut() {
                r.retain(|t| !std::ptr::eq(Rc::as_ptr(t), me));
            }
        });
    }

    fn enqueue(self: &Rc<Self>) {
        RUNNING.with(|r| {
            let mut r = r.borrow_mut();
            if !r.iter().any(|t| Rc::ptr_eq(t, self)) {
                r.push(self.clone());
            }
        });
    }

    // Returns the completion callback when an outro just finished, and
    // whether the transition is still running.
    fn advance(&self, at: Instant) -> (Option<Box<dyn FnOnce()>>, bool) {
        let mut st = self.state.borrow_mut();
        if st.phase == Phase::Idle {
            return (None, false);
        }
        if st.progress.update_at(at) {
            return (None, true);
        }
        let finished_out = st.phase == Phase::Outro;
        st.phase = Phase::Idle;
        let done = if finished_out { st.on_done.take() } else { None };
        (done, false)
    }
}

impl std::fmt::Debug for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transition")
            .field("global", &self.global)
            .field("phase", &self.phase())
            .field("progress", &self.progress())
            .finish()
    }
}

/// Advances every running transition to the clock's current time.
pub fn tick() -> bool {
    tick_at(now())
}

/// Advances every running transition to `at` and fires finished outros.
/// Returns whether any transition is still running.
pub fn tick_at(at: Instant) -> bool {
    let running: Vec<Rc<Transition>> = RUNNING.with(|r| r.borrow().clone());
    let mut finished = Vec::new();
    let mut still = Vec::new();
    for t in running {
        let (done, alive) = t.advance(at);
        if let Some(done) = done {
            finished.push(done);
        }
        if alive {
            still.push(t);
        }
    }
    RUNNING.with(|r| {
        r.borrow_mut()
            .retain(|t| still.iter().any(|s| Rc::ptr_eq(s, t)))
    });
    for done in finished {
        done();
    }
    RUNNING.with(|r| !r.borrow().is_empty())
}

pub fn running_transitions() -> usize {
    RUNNING.with(|r| r.borrow().len())
}
