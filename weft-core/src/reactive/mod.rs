//! Reactivity Engine
//!
//! Fine-grained dependency tracking over dynamic data. Reads performed
//! inside an [`Effect`] subscribe it to the exact locations it touched;
//! writes re-run exactly the subscribed effects, either synchronously or
//! batched through the [`scheduler`].
//!
//! The pieces:
//!
//! - [`dep`]: the dependency graph, track/trigger, and tracking suspension.
//! - [`effect`]: the reactive side-effect primitive and its context stack.
//! - [`store`]: observable map and list storage over dynamic [`Value`]s.
//! - [`computed`]: lazily cached derived values.
//! - [`watch`]: change callbacks with sync, pre, and post flush timing.
//! - [`scheduler`]: the deduplicated, id-ordered batch queue.

pub mod computed;
pub mod dep;
pub mod effect;
pub mod scheduler;
pub mod store;
pub mod watch;

pub use computed::Computed;
pub use dep::{pause_tracking, resume_tracking, DepKey, PauseScope, TargetId, TriggerKind};
pub use effect::{Effect, EffectId};
pub use scheduler::{flush_jobs, has_pending_jobs, next_tick, queue_job, queue_post_job, Job};
pub use store::{ListStore, Store, Value};
pub use watch::{watch, watch_effect, FlushMode, WatchHandle, WatchOptions};
