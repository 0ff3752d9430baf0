//! Watchers
//!
//! A watcher observes a reactive source and runs a callback when its value
//! changes. The source is an arbitrary closure over reactive reads; deps are
//! collected by running it inside an effect, so a watcher re-fires for
//! exactly what the source touched.
//!
//! When the callback runs is a policy choice, [`FlushMode`]:
//!
//! - `Sync` fires inline on every trigger.
//! - `Pre` batches into the main scheduler queue, ordered before the owning
//!   component's own update job.
//! - `Post` batches into the post-flush queue, after render work.
//!
//! The callback sees the new and previous value; an unchanged source value
//! (by `PartialEq`) is skipped even when a dependency technically fired.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{self, Error};

use super::effect::Effect;
use super::scheduler::{self, Job};

/// When a watcher callback runs relative to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Inline, synchronously on every trigger.
    Sync,
    /// In the main queue, before the owner's update job.
    #[default]
    Pre,
    /// In the post-flush queue, after render work.
    Post,
}

/// Watcher construction options.
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// When the callback runs.
    pub flush: FlushMode,
    /// Run the callback once at creation, with no previous value.
    pub immediate: bool,
    /// Scheduling id of the owning component. Ownerless batched watchers
    /// run after every owner-ordered job.
    pub owner: Option<u64>,
}

/// Handle for stopping a watcher.
///
/// Dropping the handle does not stop the watcher; call [`stop`](Self::stop).
#[derive(Clone)]
pub struct WatchHandle {
    effect: Effect,
    job: Option<Job>,
}

impl WatchHandle {
    /// Detach the watcher. Pending batched runs are discarded.
    pub fn stop(&self) {
        if let Some(job) = &self.job {
            job.dispose();
        }
        self.effect.stop();
    }

    /// Whether the watcher is still attached.
    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }
}

type Tick = Rc<RefCell<dyn FnMut() -> Result<(), Error>>>;

// Wire a tick closure to an effect according to the flush mode. Returns the
// scheduler job, if the mode batches.
fn attach(effect: &Effect, tick: Tick, options: &WatchOptions) -> Option<Job> {
    match options.flush {
        FlushMode::Sync => {
            effect.set_scheduler(move || {
                if let Err(err) = (tick.borrow_mut())() {
                    error::report_uncaptured(&err);
                }
            });
            None
        }
        FlushMode::Pre => {
            let job = match options.owner {
                Some(uid) => Job::pre(uid, move || (tick.borrow_mut())()),
                None => Job::new(move || (tick.borrow_mut())()),
            };
            let queued = job.clone();
            effect.set_scheduler(move || scheduler::queue_job(&queued));
            Some(job)
        }
        FlushMode::Post => {
            let job = Job::new(move || (tick.borrow_mut())());
            let queued = job.clone();
            effect.set_scheduler(move || scheduler::queue_post_job(&queued));
            Some(job)
        }
    }
}

/// Watch a reactive source and call back with its new and previous value.
///
/// The source runs once at creation to collect dependencies. The callback
/// is skipped when a trigger leaves the source value unchanged.
pub fn watch<T, S, C>(source: S, callback: C, options: WatchOptions) -> WatchHandle
where
    T: Clone + PartialEq + 'static,
    S: Fn() -> T + 'static,
    C: FnMut(&T, Option<&T>) -> Result<(), Error> + 'static,
{
    let latest: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
    let previous: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
    let callback = Rc::new(RefCell::new(callback));

    let latest_slot = latest.clone();
    let effect = Effect::lazy(move || {
        *latest_slot.borrow_mut() = Some(source());
        Ok(())
    });

    let effect_clone = effect.clone();
    let latest_tick = latest.clone();
    let previous_tick = previous.clone();
    let tick = move || -> Result<(), Error> {
        if !effect_clone.is_active() {
            return Ok(());
        }
        // Re-runs the source inside the effect, refreshing deps.
        effect_clone.run()?;
        let new = latest_tick
            .borrow()
            .clone()
            .ok_or_else(|| Error::Watcher("source produced no value".into()))?;
        let prev = previous_tick.borrow().clone();
        if prev.as_ref() == Some(&new) {
            return Ok(());
        }
        *previous_tick.borrow_mut() = Some(new.clone());
        (callback.borrow_mut())(&new, prev.as_ref()).map_err(|err| match err {
            Error::Watcher(_) => err,
            other => Error::Watcher(other.to_string()),
        })
    };
    let tick: Tick = Rc::new(RefCell::new(tick));

    let job = attach(&effect, tick.clone(), &options);

    if options.immediate {
        if let Err(err) = (tick.borrow_mut())() {
            error::report_uncaptured(&err);
        }
    } else {
        // Prime deps and the baseline value without firing the callback.
        if let Err(err) = effect.run() {
            error::report_uncaptured(&err);
        }
        *previous.borrow_mut() = latest.borrow().clone();
    }

    WatchHandle { effect, job }
}

/// Run a closure immediately inside an effect and re-run it per the flush
/// mode when its dependencies change.
///
/// Unlike [`watch`] there is no source/callback split and no value
/// comparison.
pub fn watch_effect<F>(func: F, options: WatchOptions) -> WatchHandle
where
    F: FnMut() -> Result<(), Error> + 'static,
{
    let effect = Effect::lazy(func);

    let effect_clone = effect.clone();
    let tick = move || -> Result<(), Error> {
        if !effect_clone.is_active() {
            return Ok(());
        }
        effect_clone.run()
    };
    let tick: Tick = Rc::new(RefCell::new(tick));

    let job = attach(&effect, tick, &options);

    if let Err(err) = effect.run() {
        error::report_uncaptured(&err);
    }

    WatchHandle { effect, job }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
