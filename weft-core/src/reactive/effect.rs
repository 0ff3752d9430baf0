//! Effect Implementation
//!
//! An Effect is a re-runnable unit of reactive computation: a render
//! function, a watcher, or a computed getter. Running an effect establishes
//! its dependencies; a later trigger on any of them notifies the effect,
//! which either re-runs directly or defers to its scheduler callback.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies ([`Effect::lazy`] skips the initial run).
//!
//! 2. The run executes inside a thread-local effect stack so that nested
//!    effects track against the right owner, and so re-entering an effect
//!    already on its own ancestor chain can be detected and skipped.
//!
//! 3. After the run, deps the function no longer read are pruned from their
//!    dep sets. This is what lets reactivity correctly drop subscriptions
//!    when a conditional branch stops reading a value.
//!
//! # Stopping
//!
//! [`Effect::stop`] removes the effect from every dep set and fires its
//! stop hook. A deferred-stop flag lets an effect that stops itself finish
//! its current run first.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;
use tracing::trace;

use super::dep::Dep;
use crate::error::{self, Error};

/// Counter for generating unique effect IDs.
static EFFECT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for an effect.
///
/// Dep sets store these ids as non-owning back-references; they are
/// resolved through the effect registry when a trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(u64);

impl EffectId {
    fn next() -> Self {
        Self(EFFECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

type EffectFn = Box<dyn FnMut() -> Result<(), Error>>;
type SchedulerFn = Rc<dyn Fn()>;
type StopHook = Box<dyn FnOnce()>;

pub(crate) struct EffectInner {
    id: EffectId,
    func: RefCell<EffectFn>,
    scheduler: RefCell<Option<SchedulerFn>>,
    on_stop: RefCell<Option<StopHook>>,
    deps: RefCell<SmallVec<[Dep; 4]>>,
    active: Cell<bool>,
    running: Cell<bool>,
    deferred_stop: Cell<bool>,
    allow_recurse: Cell<bool>,
}

thread_local! {
    // Registry of live effects. Holds weak references so a dropped effect
    // cannot be resurrected by a stale dep entry.
    static REGISTRY: RefCell<HashMap<EffectId, Weak<EffectInner>>> =
        RefCell::new(HashMap::new());

    // The currently running effect, as a stack to support nesting.
    static EFFECT_STACK: RefCell<Vec<Rc<EffectInner>>> = RefCell::new(Vec::new());
}

/// The effect currently collecting dependencies, if any.
pub(crate) fn active_effect() -> Option<Rc<EffectInner>> {
    EFFECT_STACK.with(|s| s.borrow().last().cloned())
}

fn on_stack(id: EffectId) -> bool {
    EFFECT_STACK.with(|s| s.borrow().iter().any(|e| e.id == id))
}

/// Notify one effect that a dependency triggered.
///
/// Re-entrant notification (an effect triggering itself while already
/// running, other than through its scheduler) is silently ignored to
/// prevent infinite synchronous recursion.
pub(crate) fn notify(id: EffectId) {
    let Some(effect) = REGISTRY.with(|r| r.borrow().get(&id).and_then(Weak::upgrade)) else {
        return;
    };
    if !effect.active.get() {
        return;
    }
    if on_stack(id) && !effect.allow_recurse.get() {
        trace!(effect = ?id, "skipping re-entrant effect notification");
        return;
    }

    let scheduler = effect.scheduler.borrow().clone();
    match scheduler {
        Some(scheduler) => scheduler(),
        None => {
            if let Err(err) = run_inner(&effect) {
                error::report_uncaptured(&err);
            }
        }
    }
}

// Guard that pops the effect stack, clears the running flag, and restores
// the tracking suspension depth on every exit path, including error returns.
struct StackGuard {
    effect: Rc<EffectInner>,
    saved_pause_depth: u32,
}

impl StackGuard {
    fn push(effect: Rc<EffectInner>) -> Self {
        effect.running.set(true);
        EFFECT_STACK.with(|s| s.borrow_mut().push(effect.clone()));
        // A run always tracks, even when initiated inside a suspension
        // scope.
        let saved_pause_depth = crate::reactive::dep::reset_tracking();
        Self {
            effect,
            saved_pause_depth,
        }
    }
}

impl Drop for StackGuard {
    fn drop(&mut self) {
        crate::reactive::dep::restore_tracking(self.saved_pause_depth);
        EFFECT_STACK.with(|s| {
            let popped = s.borrow_mut().pop();
            debug_assert!(
                popped.map(|e| e.id) == Some(self.effect.id),
                "effect stack mismatch"
            );
        });
        self.effect.running.set(false);
    }
}

fn run_inner(effect: &Rc<EffectInner>) -> Result<(), Error> {
    if !effect.active.get() {
        // A stopped effect can still be invoked directly; it runs without
        // tracking.
        return (effect.func.borrow_mut())();
    }
    if on_stack(effect.id) {
        trace!(effect = ?effect.id, "skipping re-entrant effect run");
        return Ok(());
    }

    // Provisionally mark every previously tracked dep as stale: take the
    // old list, let the run rebuild it, then prune whatever was not
    // re-tracked.
    let prev_deps: SmallVec<[Dep; 4]> = effect.deps.borrow_mut().drain(..).collect();

    let result = {
        let _guard = StackGuard::push(effect.clone());
        (effect.func.borrow_mut())()
    };

    {
        let fresh = effect.deps.borrow();
        for dep in &prev_deps {
            if !fresh.iter().any(|d| Rc::ptr_eq(d, dep)) {
                dep.remove(effect.id);
            }
        }
    }

    if effect.deferred_stop.get() {
        stop_inner(effect);
    }

    result
}

fn stop_inner(effect: &Rc<EffectInner>) {
    if !effect.active.replace(false) {
        return;
    }
    effect.deferred_stop.set(false);
    for dep in effect.deps.borrow_mut().drain(..) {
        dep.remove(effect.id);
    }
    REGISTRY.with(|r| {
        r.borrow_mut().remove(&effect.id);
    });
    if let Some(hook) = effect.on_stop.borrow_mut().take() {
        hook();
    }
}

impl EffectInner {
    pub(crate) fn id(&self) -> EffectId {
        self.id
    }

    /// Record a freshly tracked dep and subscribe to it.
    ///
    /// Called by the dependency graph during a run.
    pub(crate) fn track_dep(self: &Rc<Self>, dep: &Dep) {
        dep.insert(self.id);
        let mut deps = self.deps.borrow_mut();
        if !deps.iter().any(|d| Rc::ptr_eq(d, dep)) {
            deps.push(dep.clone());
        }
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        // Unsubscribe from every dep and leave the registry. The
        // thread-locals may already be gone during thread teardown.
        for dep in self.deps.borrow_mut().drain(..) {
            dep.remove(self.id);
        }
        let id = self.id;
        let _ = REGISTRY.try_with(|r| {
            r.borrow_mut().remove(&id);
        });
    }
}

/// A re-runnable reactive computation.
///
/// Cloning an `Effect` yields another handle to the same effect.
///
/// # Example
///
/// ```rust,ignore
/// let state = Store::new();
/// state.set("count", 0);
///
/// let state_clone = state.clone();
/// let effect = Effect::new(move || {
///     println!("count is {:?}", state_clone.get("count"));
///     Ok(())
/// });
///
/// state.set("count", 1); // effect re-runs
/// effect.stop();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create an effect and run it immediately to establish dependencies.
    ///
    /// An error from the initial run is routed to the app-level handler.
    pub fn new<F>(func: F) -> Self
    where
        F: FnMut() -> Result<(), Error> + 'static,
    {
        let effect = Self::lazy(func);
        if let Err(err) = effect.run() {
            error::report_uncaptured(&err);
        }
        effect
    }

    /// Create an effect without running it.
    ///
    /// Useful when the first run must happen at a controlled point, such as
    /// a component's mount.
    pub fn lazy<F>(func: F) -> Self
    where
        F: FnMut() -> Result<(), Error> + 'static,
    {
        let inner = Rc::new(EffectInner {
            id: EffectId::next(),
            func: RefCell::new(Box::new(func)),
            scheduler: RefCell::new(None),
            on_stop: RefCell::new(None),
            deps: RefCell::new(SmallVec::new()),
            active: Cell::new(true),
            running: Cell::new(false),
            deferred_stop: Cell::new(false),
            allow_recurse: Cell::new(false),
        });
        REGISTRY.with(|r| {
            r.borrow_mut().insert(inner.id, Rc::downgrade(&inner));
        });
        Self { inner }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    /// Install a scheduler callback.
    ///
    /// When a dependency triggers, the scheduler runs instead of the effect
    /// function; it typically enqueues the re-run into the flush queue.
    pub fn set_scheduler<F>(&self, scheduler: F)
    where
        F: Fn() + 'static,
    {
        *self.inner.scheduler.borrow_mut() = Some(Rc::new(scheduler));
    }

    /// Install a hook that fires once when the effect stops.
    pub fn set_on_stop<F>(&self, hook: F)
    where
        F: FnOnce() + 'static,
    {
        *self.inner.on_stop.borrow_mut() = Some(Box::new(hook));
    }

    /// Allow the effect to be re-notified while it is running.
    pub fn set_allow_recurse(&self, allow: bool) {
        self.inner.allow_recurse.set(allow);
    }

    /// Run the effect function, re-collecting dependencies.
    ///
    /// Re-entering an effect already on its own ancestor chain is a no-op.
    pub fn run(&self) -> Result<(), Error> {
        run_inner(&self.inner)
    }

    /// Stop the effect: unsubscribe from every dep and fire the stop hook.
    ///
    /// Calling `stop` from inside the effect's own run defers the actual
    /// stop until the run finishes.
    pub fn stop(&self) {
        if !self.inner.active.get() {
            return;
        }
        if self.inner.running.get() {
            self.inner.deferred_stop.set(true);
            return;
        }
        stop_inner(&self.inner);
    }

    /// Whether the effect has not been stopped.
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Number of deps the effect is currently subscribed to.
    pub fn dep_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("active", &self.inner.active.get())
            .field("dep_count", &self.dep_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
