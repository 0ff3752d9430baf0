//! Computed Values
//!
//! A Computed is a cached derived value. It wraps a lazy effect whose
//! scheduler callback, instead of re-running the getter, only flips a dirty
//! flag and notifies the computed's own dependents. The value is recomputed
//! on the next read, and only if dirty.
//!
//! This guarantees at most one recomputation per dependency-change batch,
//! however many times the value is read.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::trace;

use crate::error::Error;

use super::dep::{self, DepKey, TargetId, TriggerKind};
use super::effect::Effect;

/// A cached derived value that recomputes lazily when a dependency changes.
///
/// # Type Parameters
///
/// - `T`: the computed value type. `PartialEq` is used to detect whether a
///   recomputation actually produced a different value.
///
/// # Example
///
/// ```rust,ignore
/// let state = Store::new();
/// state.set("count", 2);
///
/// let state_clone = state.clone();
/// let doubled = Computed::new(move || state_clone.get("count").as_int().unwrap_or(0) * 2);
///
/// assert_eq!(doubled.get()?, 4);
/// state.set("count", 5);   // marks dirty, does not recompute
/// assert_eq!(doubled.get()?, 10);
/// ```
pub struct Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    inner: Rc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    /// Identity of the computed's own value slot in the dependency graph.
    target: TargetId,
    effect: Effect,
    value: Rc<RefCell<Option<T>>>,
    dirty: Rc<Cell<bool>>,
    /// Set by the getter when the recomputed value differs from the cache.
    changed: Rc<Cell<bool>>,
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a computed with the given getter.
    ///
    /// The getter does not run until the first read.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let target = TargetId::next();
        let value: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
        let dirty = Rc::new(Cell::new(true));
        let changed = Rc::new(Cell::new(false));

        let value_slot = value.clone();
        let changed_flag = changed.clone();
        let effect = Effect::lazy(move || {
            let next = compute();
            let mut slot = value_slot.borrow_mut();
            changed_flag.set(slot.as_ref() != Some(&next));
            *slot = Some(next);
            Ok(())
        });

        // The scheduler never recomputes inline: it flips the dirty flag
        // and notifies this computed's own dependents.
        let dirty_flag = dirty.clone();
        effect.set_scheduler(move || {
            if !dirty_flag.replace(true) {
                dep::trigger(target, Some(DepKey::Value), TriggerKind::Set);
            }
        });

        Self {
            inner: Rc::new(ComputedInner {
                target,
                effect,
                value,
                dirty,
                changed,
            }),
        }
    }

    /// Read the value, recomputing it first if a dependency has triggered
    /// since the last recomputation.
    ///
    /// Registers the computed as a dependency of the active effect. Errors
    /// if the getter never produced a value, which happens when it
    /// transitively reads this computed back: the re-entrant run is skipped
    /// and the slot stays empty.
    pub fn get(&self) -> Result<T, Error> {
        dep::track(self.inner.target, DepKey::Value);

        if self.inner.dirty.replace(false) {
            // Runs the getter inside the wrapped effect so fresh deps are
            // collected against it.
            self.inner.effect.run()?;
            if !self.inner.changed.get() {
                trace!(target_id = self.inner.target.raw(), "computed value unchanged");
            }
        }

        self.inner.value.borrow().clone().ok_or_else(|| {
            Error::Effect(format!(
                "computed {} produced no value; its getter reads itself",
                self.inner.target.raw()
            ))
        })
    }

    /// Read the value without registering a dependency.
    pub fn get_untracked(&self) -> Result<T, Error> {
        let _pause = dep::PauseScope::enter();
        self.get()
    }

    /// Whether a recomputation is pending.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Whether the getter has run at least once.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Detach the computed from the dependency graph.
    ///
    /// Reads keep returning the cached value but it no longer updates.
    pub fn stop(&self) {
        self.inner.effect.stop();
        dep::drop_target(self.inner.target);
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Computed<T>
where
    T: Clone + PartialEq + std::fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("target", &self.inner.target)
            .field("dirty", &self.inner.dirty.get())
            .field("value", &self.inner.value.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::store::Store;
    use std::cell::Cell;

    fn counted_computed(state: &Store) -> (Computed<i64>, Rc<Cell<i32>>) {
        let computes = Rc::new(Cell::new(0));
        let computes_clone = computes.clone();
        let state_clone = state.clone();
        let computed = Computed::new(move || {
            computes_clone.set(computes_clone.get() + 1);
            state_clone.get("count").as_int().unwrap_or(0) * 2
        });
        (computed, computes)
    }

    #[test]
    fn computed_is_lazy() {
        let state = Store::new();
        state.set("count", 1);

        let (computed, computes) = counted_computed(&state);
        assert!(!computed.has_value());
        assert_eq!(computes.get(), 0);

        assert_eq!(computed.get().unwrap(), 2);
        assert_eq!(computes.get(), 1);
    }

    #[test]
    fn repeated_reads_use_the_cache() {
        let state = Store::new();
        state.set("count", 3);

        let (computed, computes) = counted_computed(&state);
        assert_eq!(computed.get().unwrap(), 6);
        assert_eq!(computed.get().unwrap(), 6);
        assert_eq!(computed.get().unwrap(), 6);
        assert_eq!(computes.get(), 1);
    }

    #[test]
    fn write_marks_dirty_without_recomputing() {
        let state = Store::new();
        state.set("count", 1);

        let (computed, computes) = counted_computed(&state);
        assert_eq!(computed.get().unwrap(), 2);
        assert_eq!(computes.get(), 1);

        state.set("count", 10);
        // Dirty, but no eager recomputation.
        assert!(computed.is_dirty());
        assert_eq!(computes.get(), 1);

        assert_eq!(computed.get().unwrap(), 20);
        assert_eq!(computes.get(), 2);
    }

    #[test]
    fn many_writes_one_recomputation() {
        let state = Store::new();
        state.set("count", 0);

        let (computed, computes) = counted_computed(&state);
        assert_eq!(computed.get().unwrap(), 0);

        for n in 1..=5 {
            state.set("count", n);
        }
        assert_eq!(computed.get().unwrap(), 10);
        // One initial compute plus exactly one for the whole write burst.
        assert_eq!(computes.get(), 2);
    }

    #[test]
    fn computed_notifies_its_own_dependents() {
        let state = Store::new();
        state.set("count", 1);

        let (computed, _computes) = counted_computed(&state);

        let observed = Rc::new(Cell::new(0));
        let observed_clone = observed.clone();
        let computed_clone = computed.clone();
        let _effect = crate::reactive::Effect::new(move || {
            observed_clone.set(computed_clone.get()? as i32);
            Ok(())
        });
        assert_eq!(observed.get(), 2);

        state.set("count", 4);
        assert_eq!(observed.get(), 8);
    }

    #[test]
    fn stopped_computed_keeps_its_cache() {
        let state = Store::new();
        state.set("count", 2);

        let (computed, computes) = counted_computed(&state);
        assert_eq!(computed.get().unwrap(), 4);

        computed.stop();
        state.set("count", 100);
        assert_eq!(computed.get().unwrap(), 4);
        assert_eq!(computes.get(), 1);
    }

    #[test]
    fn untracked_read_does_not_subscribe() {
        let state = Store::new();
        state.set("count", 1);
        let (computed, _computes) = counted_computed(&state);

        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let computed_clone = computed.clone();
        let _effect = crate::reactive::Effect::new(move || {
            runs_clone.set(runs_clone.get() + 1);
            let _ = computed_clone.get_untracked();
            Ok(())
        });
        assert_eq!(runs.get(), 1);

        state.set("count", 9);
        // The effect read untracked, so the change does not re-run it.
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn self_referential_getter_errors_instead_of_panicking() {
        let slot: Rc<RefCell<Option<Computed<i64>>>> = Rc::new(RefCell::new(None));
        let slot_clone = slot.clone();
        let computed = Computed::new(move || {
            let inner = slot_clone.borrow().clone();
            match inner {
                // The re-entrant read is skipped and reports no value; the
                // getter falls back rather than recursing.
                Some(me) => me.get().unwrap_or(-1),
                None => 0,
            }
        });
        *slot.borrow_mut() = Some(computed.clone());

        assert_eq!(computed.get().unwrap(), -1);
    }
}
