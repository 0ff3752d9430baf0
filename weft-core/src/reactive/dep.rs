//! Dependency Graph
//!
//! The dependency graph records which effects read which observable
//! locations. A location is identified by the identity of the owning object
//! (a [`TargetId`]) plus a [`DepKey`] naming one property, one sequence
//! index, the sequence length, or the whole-object iteration marker.
//!
//! Each location owns a [`DepSet`]: the set of effect ids currently
//! subscribed to it. Dep sets hold ids rather than owning references; they
//! are resolved through the effect registry when a trigger fires. Effects
//! own the forward list of dep handles, which is what makes O(1)
//! unsubscription possible without an ownership cycle.
//!
//! # Track / Trigger
//!
//! [`track`] is called on every observable read and registers the active
//! effect (if any, and if tracking is enabled). [`trigger`] is called after
//! every observable write; it resolves the dep sets implicated by the
//! [`TriggerKind`], merges them through a uniqueness pass, and notifies each
//! subscribed effect exactly once per trigger call.
//!
//! This layer has no failure mode: a key that matches no dep set is a no-op.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::{IndexMap, IndexSet};
use tracing::trace;

use super::effect::{self, EffectId};

/// Counter for generating unique target IDs.
static TARGET_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identity of one observable object (a map, a list, a computed value).
///
/// Allocated once per underlying object so that rewrapping the same raw
/// data keys into the same dep sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(u64);

impl TargetId {
    /// Allocate a fresh target identity.
    pub fn next() -> Self {
        Self(TARGET_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// One observable location within a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A named property of a map-like target.
    Field(String),
    /// One index of a sequence-like target.
    Index(usize),
    /// The length of a sequence-like target.
    Length,
    /// The whole-object iteration marker (key listings, size reads).
    Iterate,
    /// The single value slot of a computed.
    Value,
}

/// What kind of structural change a write performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// An existing location changed value.
    Set,
    /// A new key or index appeared.
    Add,
    /// A key or index was removed.
    Delete,
    /// The whole target was emptied.
    Clear,
}

/// The set of effects subscribed to one observable location.
#[derive(Debug, Default)]
pub struct DepSet {
    subscribers: RefCell<IndexSet<EffectId>>,
}

impl DepSet {
    fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, id: EffectId) {
        self.subscribers.borrow_mut().insert(id);
    }

    pub(crate) fn remove(&self, id: EffectId) {
        self.subscribers.borrow_mut().shift_remove(&id);
    }

    /// Number of subscribed effects.
    pub fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// Whether no effect is subscribed.
    pub fn is_empty(&self) -> bool {
        self.subscribers.borrow().is_empty()
    }

    fn snapshot(&self) -> Vec<EffectId> {
        self.subscribers.borrow().iter().copied().collect()
    }
}

/// Shared handle to a dep set.
pub type Dep = Rc<DepSet>;

thread_local! {
    // The graph itself: target -> key -> dep set. Thread-local because the
    // whole runtime is thread-confined; see the effect context stack.
    static DEP_GRAPH: RefCell<HashMap<TargetId, IndexMap<DepKey, Dep>>> =
        RefCell::new(HashMap::new());

    // Nestable suspension counter for bulk mutations. While nonzero,
    // reads do not register and writes do not fire.
    static PAUSE_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Suspend dependency tracking and triggering. Nestable.
pub fn pause_tracking() {
    PAUSE_DEPTH.with(|d| d.set(d.get() + 1));
}

/// Resume dependency tracking and triggering.
///
/// Unbalanced calls are clamped at zero.
pub fn resume_tracking() {
    PAUSE_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
}

/// Whether tracking is currently enabled.
pub fn tracking_enabled() -> bool {
    PAUSE_DEPTH.with(|d| d.get() == 0)
}

/// Force tracking on, returning the suspended depth for later restore.
///
/// An effect run always tracks, even when it was initiated inside a
/// suspension scope.
pub(crate) fn reset_tracking() -> u32 {
    PAUSE_DEPTH.with(|d| d.replace(0))
}

/// Restore a suspension depth saved by [`reset_tracking`].
pub(crate) fn restore_tracking(depth: u32) {
    PAUSE_DEPTH.with(|d| d.set(depth));
}

/// RAII guard for a tracking suspension scope.
///
/// Restores the previous depth on drop, on every exit path.
pub struct PauseScope(());

impl PauseScope {
    /// Enter a suspension scope.
    pub fn enter() -> Self {
        pause_tracking();
        Self(())
    }
}

impl Drop for PauseScope {
    fn drop(&mut self) {
        resume_tracking();
    }
}

/// Register the active effect as a subscriber of `(target, key)`.
///
/// No-op when there is no active effect or tracking is suspended.
pub fn track(target: TargetId, key: DepKey) {
    if !tracking_enabled() {
        return;
    }
    let Some(effect) = effect::active_effect() else {
        return;
    };

    let dep = DEP_GRAPH.with(|graph| {
        graph
            .borrow_mut()
            .entry(target)
            .or_default()
            .entry(key)
            .or_insert_with(|| Rc::new(DepSet::new()))
            .clone()
    });

    trace!(target_id = target.raw(), effect = ?effect.id(), "track");
    effect.track_dep(&dep);
}

/// Notify every effect subscribed to the locations implicated by a write.
///
/// Resolution rules per [`TriggerKind`]:
///
/// - `Set` implicates the written key only.
/// - `Add` and `Delete` additionally implicate the iteration dep, and the
///   length dep when the key is a sequence index.
/// - `Clear` implicates every dep of the target.
///
/// Implicated dep sets are merged through a uniqueness pass, so an effect
/// subscribed through two paths still runs once per trigger call.
pub fn trigger(target: TargetId, key: Option<DepKey>, kind: TriggerKind) {
    if !tracking_enabled() {
        // Writes performed while tracking is suspended do not fire.
        return;
    }

    let deps: Vec<Dep> = DEP_GRAPH.with(|graph| {
        let graph = graph.borrow();
        let Some(keys) = graph.get(&target) else {
            return Vec::new();
        };

        let mut deps = Vec::new();
        match kind {
            TriggerKind::Clear => {
                deps.extend(keys.values().cloned());
            }
            _ => {
                if let Some(ref k) = key {
                    if let Some(dep) = keys.get(k) {
                        deps.push(dep.clone());
                    }
                }
                if matches!(kind, TriggerKind::Add | TriggerKind::Delete) {
                    if let Some(dep) = keys.get(&DepKey::Iterate) {
                        deps.push(dep.clone());
                    }
                    // Index mutations on sequence-like storage also change
                    // the observable length.
                    if matches!(key, Some(DepKey::Index(_))) {
                        if let Some(dep) = keys.get(&DepKey::Length) {
                            deps.push(dep.clone());
                        }
                    }
                }
            }
        }
        deps
    });

    if deps.is_empty() {
        return;
    }

    // Uniqueness pass: an effect reachable through several dep sets is
    // notified once.
    let mut ids: IndexSet<EffectId> = IndexSet::new();
    for dep in &deps {
        ids.extend(dep.snapshot());
    }

    trace!(
        target_id = target.raw(),
        ?kind,
        subscribers = ids.len(),
        "trigger"
    );

    for id in ids {
        effect::notify(id);
    }
}

/// Drop every dep set owned by a target.
///
/// Called when the underlying raw object is deallocated.
pub(crate) fn drop_target(target: TargetId) {
    // The thread-local may already be gone during thread teardown.
    let _ = DEP_GRAPH.try_with(|graph| {
        graph.borrow_mut().remove(&target);
    });
}

#[cfg(test)]
pub(crate) fn dep_for(target: TargetId, key: &DepKey) -> Option<Dep> {
    DEP_GRAPH.with(|graph| {
        graph
            .borrow()
            .get(&target)
            .and_then(|keys| keys.get(key).cloned())
    })
}
