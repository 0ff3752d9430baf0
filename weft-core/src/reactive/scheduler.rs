//! Job Scheduler
//!
//! The scheduler coalesces reactive work into batches. Instead of re-running
//! render effects and watchers synchronously on every write, they enqueue a
//! [`Job`]; the queue is deduplicated and kept sorted by job id, and the
//! whole batch runs when the embedder calls [`flush_jobs`].
//!
//! Job ids encode creation order of their owners. Because parents are
//! created before children, flushing in ascending id order updates parents
//! first, which lets a child whose props changed skip a redundant pass of
//! its own. Jobs without an id sort last.
//!
//! There is no implicit microtask here: the host event loop decides when a
//! batch ends. [`set_tick_hook`] lets an embedder get a nudge the first time
//! work lands in an empty queue, so it can schedule a [`flush_jobs`] call
//! however its platform spells "soon".
//!
//! A failing job is reported through the error channel and never aborts the
//! rest of the flush.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::trace;

use crate::error::{self, Error};

/// A unit of deferred reactive work.
///
/// Cloning yields another handle to the same job; the queue deduplicates by
/// handle identity.
#[derive(Clone)]
pub struct Job {
    inner: Rc<JobInner>,
}

struct JobInner {
    /// Owner ordering key. `None` sorts after every numbered job.
    id: Option<u64>,
    /// Pre jobs run before non-pre jobs with the same id.
    pre: bool,
    /// Whether the job may re-enqueue itself while it is the one flushing.
    allow_recurse: Cell<bool>,
    /// A disposed job stays in the queue but is skipped at flush time.
    disposed: Cell<bool>,
    func: RefCell<Box<dyn FnMut() -> Result<(), Error>>>,
}

impl Job {
    /// Create an unordered job.
    pub fn new<F>(func: F) -> Self
    where
        F: FnMut() -> Result<(), Error> + 'static,
    {
        Self::build(None, false, func)
    }

    /// Create a job ordered by its owner's id.
    pub fn with_id<F>(id: u64, func: F) -> Self
    where
        F: FnMut() -> Result<(), Error> + 'static,
    {
        Self::build(Some(id), false, func)
    }

    /// Create a pre-flavored job ordered by its owner's id.
    ///
    /// At equal ids, pre jobs run before the owner's own (non-pre) job.
    pub fn pre<F>(id: u64, func: F) -> Self
    where
        F: FnMut() -> Result<(), Error> + 'static,
    {
        Self::build(Some(id), true, func)
    }

    fn build<F>(id: Option<u64>, pre: bool, func: F) -> Self
    where
        F: FnMut() -> Result<(), Error> + 'static,
    {
        Self {
            inner: Rc::new(JobInner {
                id,
                pre,
                allow_recurse: Cell::new(false),
                disposed: Cell::new(false),
                func: RefCell::new(Box::new(func)),
            }),
        }
    }

    /// The job's ordering key.
    pub fn id(&self) -> Option<u64> {
        self.inner.id
    }

    /// Allow the job to re-enqueue itself while it is flushing.
    pub fn set_allow_recurse(&self, allow: bool) {
        self.inner.allow_recurse.set(allow);
    }

    /// Mark the job dead. It is skipped if already queued and rejected if
    /// enqueued again.
    pub fn dispose(&self) {
        self.inner.disposed.set(true);
    }

    /// Whether the job has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    fn same(&self, other: &Job) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // None sorts last so unordered jobs run after every owner-ordered one.
    fn sort_id(&self) -> u64 {
        self.inner.id.unwrap_or(u64::MAX)
    }

    fn run(&self) {
        if self.inner.disposed.get() {
            return;
        }
        let result = (self.inner.func.borrow_mut())();
        if let Err(err) = result {
            error::report_uncaptured(&err);
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.inner.id)
            .field("pre", &self.inner.pre)
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

thread_local! {
    static QUEUE: RefCell<Vec<Job>> = RefCell::new(Vec::new());
    static POST_QUEUE: RefCell<Vec<Job>> = RefCell::new(Vec::new());
    static FLUSH_INDEX: Cell<usize> = const { Cell::new(0) };
    static IS_FLUSHING: Cell<bool> = const { Cell::new(false) };
    static TICK_REQUESTED: Cell<bool> = const { Cell::new(false) };
    static TICK_HOOK: RefCell<Option<Rc<dyn Fn()>>> = RefCell::new(None);
}

/// Install a hook invoked the first time work lands in an empty queue.
///
/// Embedders use this to schedule a [`flush_jobs`] call on their event loop.
pub fn set_tick_hook<F>(hook: F)
where
    F: Fn() + 'static,
{
    TICK_HOOK.with(|h| *h.borrow_mut() = Some(Rc::new(hook)));
}

/// Remove the tick hook.
pub fn clear_tick_hook() {
    TICK_HOOK.with(|h| *h.borrow_mut() = None);
}

fn request_tick() {
    if TICK_REQUESTED.with(|t| t.replace(true)) {
        return;
    }
    let hook = TICK_HOOK.with(|h| h.borrow().clone());
    if let Some(hook) = hook {
        hook();
    }
}

/// Whether any main-queue or post-flush work is pending.
pub fn has_pending_jobs() -> bool {
    QUEUE.with(|q| FLUSH_INDEX.with(|i| q.borrow().len() > i.get()))
        || POST_QUEUE.with(|q| !q.borrow().is_empty())
}

/// Binary search for where a job with this id belongs.
///
/// The already-flushed prefix is excluded so a mid-flush enqueue with an id
/// ahead of the cursor still runs in this batch. At equal ids, pre jobs sit
/// before non-pre jobs.
fn find_insertion_index(queue: &[Job], start: usize, id: u64) -> usize {
    let mut lo = start;
    let mut hi = queue.len();
    while lo < hi {
        let mid = (lo + hi) / 2;
        let mid_job = &queue[mid];
        let mid_id = mid_job.sort_id();
        if mid_id < id || (mid_id == id && mid_job.inner.pre) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Enqueue a job for the next flush.
///
/// A job already in the un-flushed part of the queue is not enqueued again.
/// The job currently flushing counts as queued unless it allows recursion.
pub fn queue_job(job: &Job) {
    if job.inner.disposed.get() {
        return;
    }

    let queued = QUEUE.with(|q| {
        let mut queue = q.borrow_mut();
        let flushing = IS_FLUSHING.with(|f| f.get());
        let flush_index = FLUSH_INDEX.with(|i| i.get());

        let dedupe_from = if flushing && job.inner.allow_recurse.get() {
            flush_index + 1
        } else {
            flush_index
        };
        if queue[dedupe_from.min(queue.len())..]
            .iter()
            .any(|queued| queued.same(job))
        {
            return false;
        }

        let search_from = if flushing { flush_index + 1 } else { 0 };
        let at = find_insertion_index(&queue, search_from.min(queue.len()), job.sort_id());
        queue.insert(at, job.clone());
        true
    });

    if queued {
        trace!(id = ?job.inner.id, pre = job.inner.pre, "job queued");
        request_tick();
    }
}

/// Enqueue a callback to run after the main queue drains.
///
/// Post callbacks run in FIFO order of first enqueue, after deduplication
/// and a stable sort by id.
pub fn queue_post_job(job: &Job) {
    if job.inner.disposed.get() {
        return;
    }
    let queued = POST_QUEUE.with(|q| {
        let mut queue = q.borrow_mut();
        if queue.iter().any(|queued| queued.same(job)) {
            return false;
        }
        queue.push(job.clone());
        true
    });
    if queued {
        request_tick();
    }
}

/// Run a closure after the current batch has flushed.
///
/// Sugar for enqueueing a one-shot post callback.
pub fn next_tick<F>(func: F)
where
    F: FnOnce() -> Result<(), Error> + 'static,
{
    let mut func = Some(func);
    let job = Job::new(move || match func.take() {
        Some(f) => f(),
        None => Ok(()),
    });
    queue_post_job(&job);
}

/// Drain the queue: run every pending job in id order, then the post-flush
/// callbacks, repeating until both queues are empty.
///
/// Jobs enqueued mid-flush join the current batch (or the replay loop when
/// their slot has already passed). Re-entrant calls are no-ops: the
/// outermost flush drains everything.
pub fn flush_jobs() {
    if IS_FLUSHING.with(|f| f.replace(true)) {
        return;
    }
    TICK_REQUESTED.with(|t| t.set(false));

    loop {
        loop {
            let job = QUEUE.with(|q| {
                let queue = q.borrow();
                let index = FLUSH_INDEX.with(|i| i.get());
                queue.get(index).cloned()
            });
            let Some(job) = job else {
                break;
            };
            job.run();
            FLUSH_INDEX.with(|i| i.set(i.get() + 1));
        }

        QUEUE.with(|q| q.borrow_mut().clear());
        FLUSH_INDEX.with(|i| i.set(0));

        flush_post_jobs();

        // Post callbacks (or errors in them) may have queued more work;
        // replay synchronously until the system settles.
        let settled = QUEUE.with(|q| q.borrow().is_empty())
            && POST_QUEUE.with(|q| q.borrow().is_empty());
        if settled {
            break;
        }
    }

    IS_FLUSHING.with(|f| f.set(false));
}

fn flush_post_jobs() {
    let mut batch = POST_QUEUE.with(|q| std::mem::take(&mut *q.borrow_mut()));
    if batch.is_empty() {
        return;
    }
    batch.sort_by_key(Job::sort_id);
    trace!(jobs = batch.len(), "post flush");
    for job in &batch {
        job.run();
    }
}

/// Clear both queues without running anything. Test and teardown helper.
pub fn drop_pending_jobs() {
    QUEUE.with(|q| q.borrow_mut().clear());
    POST_QUEUE.with(|q| q.borrow_mut().clear());
    FLUSH_INDEX.with(|i| i.set(0));
    TICK_REQUESTED.with(|t| t.set(false));
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
