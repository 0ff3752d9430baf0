//! Lifecycle Hooks
//!
//! Hook registration is positional: the free functions below register
//! against whichever instance is currently running its setup function.
//! Called anywhere else they warn and do nothing, so a stray registration
//! never attaches to the wrong component.
//!
//! Hook order within one phase is registration order. `before_*` hooks run
//! before the host tree changes; their counterparts run after.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::warn;

use crate::error::{Captured, Error};

use super::component::{ComponentInstance, HookKind};

thread_local! {
    static CURRENT: RefCell<Vec<Rc<ComponentInstance>>> = RefCell::new(Vec::new());
}

struct InstanceGuard;

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        CURRENT.with(|c| {
            c.borrow_mut().pop();
        });
    }
}

/// Run `func` with `instance` as the registration target.
pub(crate) fn with_instance<R>(instance: &Rc<ComponentInstance>, func: impl FnOnce() -> R) -> R {
    CURRENT.with(|c| c.borrow_mut().push(instance.clone()));
    let _guard = InstanceGuard;
    func()
}

/// The instance whose setup is currently running, if any.
pub fn current_instance() -> Option<Rc<ComponentInstance>> {
    CURRENT.with(|c| c.borrow().last().cloned())
}

fn register<F>(kind: HookKind, name: &'static str, hook: F)
where
    F: FnMut() -> Result<(), Error> + 'static,
{
    match current_instance() {
        Some(instance) => instance.add_hook(kind, Box::new(hook)),
        None => warn!(hook = name, "lifecycle hook registered outside setup; ignored"),
    }
}

/// Run just before the instance's first subtree mounts.
pub fn on_before_mount<F>(hook: F)
where
    F: FnMut() -> Result<(), Error> + 'static,
{
    register(HookKind::BeforeMount, "beforeMount", hook);
}

/// Run after the instance's subtree is in the host tree.
pub fn on_mounted<F>(hook: F)
where
    F: FnMut() -> Result<(), Error> + 'static,
{
    register(HookKind::Mounted, "mounted", hook);
}

/// Run before each re-render patches the host tree.
pub fn on_before_update<F>(hook: F)
where
    F: FnMut() -> Result<(), Error> + 'static,
{
    register(HookKind::BeforeUpdate, "beforeUpdate", hook);
}

/// Run after each re-render's patch lands.
pub fn on_updated<F>(hook: F)
where
    F: FnMut() -> Result<(), Error> + 'static,
{
    register(HookKind::Updated, "updated", hook);
}

/// Run before teardown starts.
pub fn on_before_unmount<F>(hook: F)
where
    F: FnMut() -> Result<(), Error> + 'static,
{
    register(HookKind::BeforeUnmount, "beforeUnmount", hook);
}

/// Run after the subtree has left the host tree.
pub fn on_unmounted<F>(hook: F)
where
    F: FnMut() -> Result<(), Error> + 'static,
{
    register(HookKind::Unmounted, "unmounted", hook);
}

/// Register an error-capture hook.
///
/// The hook sees errors raised by descendant components. Returning
/// `Captured::Handled` stops propagation; `Captured::Propagate` passes the
/// error on up.
pub fn on_error_captured<F>(hook: F)
where
    F: FnMut(&Error) -> Result<Captured, Error> + 'static,
{
    match current_instance() {
        Some(instance) => instance.add_error_hook(Box::new(hook)),
        None => warn!("error-capture hook registered outside setup; ignored"),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
