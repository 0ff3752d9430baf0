//! Component Instances
//!
//! A [`Component`] is a definition: a name plus a setup function. Mounting
//! a component vnode creates a [`ComponentInstance`]: the live pairing of
//! that definition with props, state, a render function and a render
//! effect.
//!
//! Instance uids are monotonic, so a parent's uid is always smaller than
//! any child mounted under it. The render effect's scheduler queues an
//! update job keyed by the uid, which is what makes the scheduler flush
//! parents before children and run each instance at most once per batch.
//!
//! Lifecycle phases move `Created -> SettingUp -> Mounted`, bounce through
//! `Updating` on re-renders, and end at `Unmounted`, which is terminal and
//! idempotent. Setup may also suspend: returning [`Setup::Pending`] mounts
//! a placeholder comment and defers the real subtree until the embedder
//! fulfills the pending slot.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace, warn};

use crate::error::{self, Captured, Error};
use crate::reactive::dep::{self, DepKey, TargetId, TriggerKind};
use crate::reactive::scheduler::{self, Job};
use crate::reactive::{Effect, PauseScope, Store, Value};

use super::host::HostId;
use super::lifecycle;
use super::patch::Renderer;
use super::vnode::{patch_flags, Handler, PropValue, Props, VNode, VNodeType};

static UID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A render function: produces the instance's subtree from current state.
pub type RenderFn = Rc<dyn Fn() -> Result<Rc<VNode>, Error>>;

type SetupFn = Box<dyn Fn(&SetupContext) -> Result<Setup, Error>>;

/// A component definition.
pub struct Component {
    name: String,
    setup: SetupFn,
}

impl Component {
    /// Define a component.
    pub fn new<F>(name: impl Into<String>, setup: F) -> Rc<Self>
    where
        F: Fn(&SetupContext) -> Result<Setup, Error> + 'static,
    {
        Rc::new(Self {
            name: name.into(),
            setup: Box::new(setup),
        })
    }

    /// The component's name, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// What a setup function hands back.
pub enum Setup {
    /// A ready render function.
    Render(RenderFn),
    /// Setup needs outside input first; mount a placeholder and wait for
    /// the slot to be fulfilled.
    Pending(PendingSetup),
}

impl Setup {
    /// Wrap a closure as the ready variant.
    pub fn render<F>(func: F) -> Self
    where
        F: Fn() -> Result<Rc<VNode>, Error> + 'static,
    {
        Setup::Render(Rc::new(func))
    }
}

/// What a setup function sees: its props and its own state store.
pub struct SetupContext {
    props: Rc<PropsState>,
    state: Store,
}

impl SetupContext {
    /// The instance's reactive props.
    pub fn props(&self) -> Rc<PropsState> {
        self.props.clone()
    }

    /// The instance's state store.
    pub fn state(&self) -> Store {
        self.state.clone()
    }

    /// Invoke the handler prop for an event, if the parent passed one.
    ///
    /// `emit("save")` calls the `onSave` prop. A missing handler is not an
    /// error; a failing one is wrapped and returned.
    pub fn emit(&self, event: &str, payload: &Value) -> Result<(), Error> {
        let name = handler_prop_name(event);
        let Some(handler) = self.props.handler_untracked(&name) else {
            return Ok(());
        };
        handler(payload).map_err(|err| Error::Event {
            event: name,
            message: err.to_string(),
        })
    }
}

fn handler_prop_name(event: &str) -> String {
    let mut name = String::with_capacity(event.len() + 2);
    name.push_str("on");
    let mut chars = event.chars();
    if let Some(first) = chars.next() {
        name.extend(first.to_uppercase());
        name.push_str(chars.as_str());
    }
    name
}

// ----------------------------------------------------------------------------
// Props
// ----------------------------------------------------------------------------

/// The reactive, read-only props of an instance.
///
/// Shallow: each prop name is its own dependency location, so a render
/// function re-runs only for the props it actually read. Replacement
/// happens from the parent's patch; the component body never writes.
pub struct PropsState {
    target: TargetId,
    values: RefCell<Props>,
}

impl PropsState {
    fn new(values: Props) -> Rc<Self> {
        Rc::new(Self {
            target: TargetId::next(),
            values: RefCell::new(values),
        })
    }

    /// Read one prop, registering it as a dependency of the active effect.
    pub fn get(&self, name: &str) -> Option<PropValue> {
        dep::track(self.target, DepKey::Field(name.to_owned()));
        self.values.borrow().get(name).cloned()
    }

    /// Read one prop as a string, empty if absent or not a string.
    pub fn str(&self, name: &str) -> String {
        match self.get(name) {
            Some(PropValue::Str(s)) => s,
            _ => String::new(),
        }
    }

    /// Read one prop as an integer.
    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(PropValue::Int(n)) => Some(n),
            _ => None,
        }
    }

    /// Read a handler prop.
    pub fn handler(&self, name: &str) -> Option<Handler> {
        match self.get(name) {
            Some(PropValue::Handler(h)) => Some(h),
            _ => None,
        }
    }

    fn handler_untracked(&self, name: &str) -> Option<Handler> {
        match self.values.borrow().get(name) {
            Some(PropValue::Handler(h)) => Some(h.clone()),
            _ => None,
        }
    }

    /// The prop names, tracked through the iteration marker.
    pub fn names(&self) -> Vec<String> {
        dep::track(self.target, DepKey::Iterate);
        self.values.borrow().keys().cloned().collect()
    }

    // Untracked comparison against incoming props, honoring the vnode's
    // patch-flag hints.
    fn differs(&self, new: &Props, flag: i32, dynamic: Option<&[String]>) -> bool {
        let current = self.values.borrow();
        if flag > 0 && flag & patch_flags::FULL_PROPS == 0 {
            if flag & patch_flags::PROPS == 0 {
                return false;
            }
            let Some(names) = dynamic else {
                return true;
            };
            return names
                .iter()
                .any(|name| current.get(name) != new.get(name));
        }
        *current != *new
    }

    // Swap in the new props, triggering per changed name.
    fn replace(&self, new: Props) {
        let mut changed: Vec<(String, TriggerKind)> = Vec::new();
        {
            let mut current = self.values.borrow_mut();
            for (name, value) in &new {
                match current.get(name) {
                    Some(prev) if prev == value => {}
                    Some(_) => changed.push((name.clone(), TriggerKind::Set)),
                    None => changed.push((name.clone(), TriggerKind::Add)),
                }
            }
            for name in current.keys() {
                if !new.contains_key(name) {
                    changed.push((name.clone(), TriggerKind::Delete));
                }
            }
            *current = new;
        }
        for (name, kind) in changed {
            dep::trigger(self.target, Some(DepKey::Field(name)), kind);
        }
    }
}

impl Drop for PropsState {
    fn drop(&mut self) {
        dep::drop_target(self.target);
    }
}

// ----------------------------------------------------------------------------
// Instance
// ----------------------------------------------------------------------------

/// Lifecycle phase of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Allocated, setup not yet run.
    Created,
    /// Setup running.
    SettingUp,
    /// Setup suspended behind a pending slot.
    Pending,
    /// Subtree in the host tree.
    Mounted,
    /// Re-render in progress.
    Updating,
    /// Terminal.
    Unmounted,
}

type HookFn = Box<dyn FnMut() -> Result<(), Error>>;
type ErrorHookFn = Box<dyn FnMut(&Error) -> Result<Captured, Error>>;

/// Which lifecycle list a hook registers into.
#[derive(Debug, Clone, Copy)]
pub(crate) enum HookKind {
    BeforeMount,
    Mounted,
    BeforeUpdate,
    Updated,
    BeforeUnmount,
    Unmounted,
}

#[derive(Default)]
struct Hooks {
    before_mount: RefCell<Vec<HookFn>>,
    mounted: RefCell<Vec<HookFn>>,
    before_update: RefCell<Vec<HookFn>>,
    updated: RefCell<Vec<HookFn>>,
    before_unmount: RefCell<Vec<HookFn>>,
    unmounted: RefCell<Vec<HookFn>>,
    error_captured: RefCell<Vec<ErrorHookFn>>,
}

/// One live component.
pub struct ComponentInstance {
    uid: u64,
    def: Rc<Component>,
    parent: Weak<ComponentInstance>,
    props: Rc<PropsState>,
    state: Store,
    render: RefCell<Option<RenderFn>>,
    subtree: RefCell<Option<Rc<VNode>>>,
    effect: RefCell<Option<Effect>>,
    job: RefCell<Option<Job>>,
    phase: Cell<Phase>,
    hooks: Hooks,
    renderer: Renderer,
    container: Cell<Option<HostId>>,
    anchor: Cell<Option<HostId>>,
    placeholder: Cell<Option<HostId>>,
}

thread_local! {
    // Which instance's subtree is currently being mounted or patched.
    // Components encountered inside become its children.
    static OWNER_STACK: RefCell<Vec<Rc<ComponentInstance>>> = RefCell::new(Vec::new());
}

fn current_owner() -> Option<Rc<ComponentInstance>> {
    OWNER_STACK.with(|s| s.borrow().last().cloned())
}

impl ComponentInstance {
    /// The instance's scheduling uid.
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// The definition's name.
    pub fn name(&self) -> &str {
        self.def.name()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    /// The parent instance, if any.
    pub fn parent(&self) -> Option<Rc<ComponentInstance>> {
        self.parent.upgrade()
    }

    /// The instance's reactive props.
    pub fn props(&self) -> Rc<PropsState> {
        self.props.clone()
    }

    /// The instance's state store.
    pub fn state(&self) -> Store {
        self.state.clone()
    }

    /// The currently mounted subtree.
    pub fn subtree(&self) -> Option<Rc<VNode>> {
        self.subtree.borrow().clone()
    }

    /// The pending placeholder's host node, while suspended.
    pub fn placeholder(&self) -> Option<HostId> {
        self.placeholder.get()
    }

    pub(crate) fn add_hook(&self, kind: HookKind, hook: HookFn) {
        let list = match kind {
            HookKind::BeforeMount => &self.hooks.before_mount,
            HookKind::Mounted => &self.hooks.mounted,
            HookKind::BeforeUpdate => &self.hooks.before_update,
            HookKind::Updated => &self.hooks.updated,
            HookKind::BeforeUnmount => &self.hooks.before_unmount,
            HookKind::Unmounted => &self.hooks.unmounted,
        };
        list.borrow_mut().push(hook);
    }

    pub(crate) fn add_error_hook(&self, hook: ErrorHookFn) {
        self.hooks.error_captured.borrow_mut().push(hook);
    }

    // Create the render effect and its update job, then run it once to
    // mount the subtree.
    fn setup_render_effect(self: &Rc<Self>) -> Result<(), Error> {
        let weak = Rc::downgrade(self);
        let effect = Effect::lazy(move || match weak.upgrade() {
            Some(instance) => instance.update(),
            None => Ok(()),
        });

        let job_effect = effect.clone();
        let job_owner = Rc::downgrade(self);
        let job = Job::with_id(self.uid, move || {
            if let Err(err) = job_effect.run() {
                handle_error(job_owner.upgrade().as_ref(), &err);
            }
            Ok(())
        });
        let queued = job.clone();
        effect.set_scheduler(move || scheduler::queue_job(&queued));
        // State writes from inside lifecycle hooks land while the render
        // effect is on the stack; they must still schedule the next pass.
        effect.set_allow_recurse(true);
        job.set_allow_recurse(true);

        *self.effect.borrow_mut() = Some(effect.clone());
        *self.job.borrow_mut() = Some(job);

        effect.run()
    }

    // One render pass: mount on the first run, patch afterwards.
    fn update(self: &Rc<Self>) -> Result<(), Error> {
        if self.phase.get() == Phase::Unmounted {
            return Ok(());
        }
        let Some(render) = self.render.borrow().clone() else {
            return Ok(());
        };
        let container = self
            .container
            .get()
            .ok_or_else(|| Error::Render(format!("{}: no mount container", self.name())))?;

        let first = self.subtree.borrow().is_none();
        if first {
            self.fire_hooks("beforeMount", &self.hooks.before_mount);
            let tree = self.with_owner(|| -> Result<Rc<VNode>, Error> {
                let tree = render()?;
                // A suspended instance mounts where its placeholder sits.
                let at = self.placeholder.get().or(self.anchor.get());
                self.renderer.mount(&tree, container, at)?;
                Ok(tree)
            })?;
            *self.subtree.borrow_mut() = Some(tree);
            if let Some(placeholder) = self.placeholder.take() {
                self.renderer.host().remove(placeholder);
            }
            self.phase.set(Phase::Mounted);
            debug!(name = self.name(), uid = self.uid, "mounted");
            self.fire_hooks("mounted", &self.hooks.mounted);
        } else {
            self.phase.set(Phase::Updating);
            self.fire_hooks("beforeUpdate", &self.hooks.before_update);
            let tree = self.with_owner(|| -> Result<Rc<VNode>, Error> {
                let tree = render()?;
                let prev = self.subtree.borrow().clone();
                if let Some(prev) = prev {
                    self.renderer.patch(&prev, &tree, container, self.anchor.get())?;
                }
                Ok(tree)
            })?;
            *self.subtree.borrow_mut() = Some(tree);
            self.phase.set(Phase::Mounted);
            trace!(name = self.name(), uid = self.uid, "updated");
            self.fire_hooks("updated", &self.hooks.updated);
        }
        Ok(())
    }

    // The owner stack must span the whole render-and-commit pass: children
    // are instantiated while the subtree is mounted or patched, not while
    // the render closure runs.
    fn with_owner<R>(self: &Rc<Self>, f: impl FnOnce() -> R) -> R {
        OWNER_STACK.with(|s| s.borrow_mut().push(self.clone()));
        let result = f();
        OWNER_STACK.with(|s| {
            s.borrow_mut().pop();
        });
        result
    }

    /// Tear the instance down. Terminal and idempotent: the second call is
    /// a no-op and every hook fires once.
    pub fn unmount(self: &Rc<Self>) {
        if self.phase.replace(Phase::Unmounted) == Phase::Unmounted {
            return;
        }
        debug!(name = self.name(), uid = self.uid, "unmounting");
        self.fire_hooks("beforeUnmount", &self.hooks.before_unmount);

        if let Some(effect) = self.effect.borrow_mut().take() {
            effect.stop();
        }
        if let Some(job) = self.job.borrow_mut().take() {
            job.dispose();
        }
        if let Some(subtree) = self.subtree.borrow_mut().take() {
            self.renderer.unmount(&subtree);
        }
        if let Some(placeholder) = self.placeholder.take() {
            self.renderer.host().remove(placeholder);
        }

        self.fire_hooks("unmounted", &self.hooks.unmounted);
    }

    // Run one hook list. Hooks registered while firing run on the next
    // occasion. A failing hook is routed up the ancestor chain.
    fn fire_hooks(self: &Rc<Self>, name: &'static str, list: &RefCell<Vec<HookFn>>) {
        let mut taken = std::mem::take(&mut *list.borrow_mut());
        for hook in taken.iter_mut() {
            if let Err(err) = hook() {
                let wrapped = Error::Hook {
                    hook: name,
                    message: err.to_string(),
                };
                handle_error(Some(self), &wrapped);
            }
        }
        let mut current = list.borrow_mut();
        taken.append(&mut current);
        *current = taken;
    }

    // Offer an error to this instance's capture hooks.
    fn try_capture(self: &Rc<Self>, err: &Error) -> Captured {
        let mut taken = std::mem::take(&mut *self.hooks.error_captured.borrow_mut());
        let mut verdict = Captured::Propagate;
        for hook in taken.iter_mut() {
            match hook(err) {
                Ok(Captured::Handled) => {
                    verdict = Captured::Handled;
                    break;
                }
                Ok(Captured::Propagate) => {}
                Err(secondary) => {
                    // The original error keeps propagating.
                    warn!(error = %secondary, "error-capture hook failed");
                }
            }
        }
        let mut current = self.hooks.error_captured.borrow_mut();
        taken.append(&mut current);
        *current = taken;
        verdict
    }
}

impl std::fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("uid", &self.uid)
            .field("name", &self.def.name())
            .field("phase", &self.phase.get())
            .finish()
    }
}

/// Route an error raised inside an instance.
///
/// Walks the ancestor chain offering the error to each error-capture hook;
/// the first `Handled` verdict stops it. Uncaptured errors fall through to
/// the app-level handler and finally the log.
pub fn handle_error(instance: Option<&Rc<ComponentInstance>>, err: &Error) {
    let mut cursor = instance.and_then(|i| i.parent());
    while let Some(ancestor) = cursor {
        if ancestor.try_capture(err) == Captured::Handled {
            return;
        }
        cursor = ancestor.parent();
    }
    error::report_uncaptured(err);
}

// ----------------------------------------------------------------------------
// Mount / update entry points (called by the renderer)
// ----------------------------------------------------------------------------

/// Mount a component vnode: create the instance, run setup, render.
pub(crate) fn mount_component(
    renderer: &Renderer,
    vnode: &Rc<VNode>,
    container: HostId,
    anchor: Option<HostId>,
) -> Result<(), Error> {
    let VNodeType::Component(def) = &vnode.kind else {
        return Err(Error::Render("mount_component on a non-component node".into()));
    };

    let parent = current_owner();
    let instance = Rc::new(ComponentInstance {
        uid: UID_COUNTER.fetch_add(1, Ordering::Relaxed),
        def: def.clone(),
        parent: parent.as_ref().map(Rc::downgrade).unwrap_or_default(),
        props: PropsState::new(vnode.props.clone()),
        state: Store::new(),
        render: RefCell::new(None),
        subtree: RefCell::new(None),
        effect: RefCell::new(None),
        job: RefCell::new(None),
        phase: Cell::new(Phase::Created),
        hooks: Hooks::default(),
        renderer: renderer.clone(),
        container: Cell::new(Some(container)),
        anchor: Cell::new(anchor),
        placeholder: Cell::new(None),
    });
    *vnode.instance.borrow_mut() = Some(instance.clone());
    debug!(name = instance.name(), uid = instance.uid, "mounting component");

    let ctx = SetupContext {
        props: instance.props.clone(),
        state: instance.state.clone(),
    };
    instance.phase.set(Phase::SettingUp);
    // Setup runs untracked: reads inside it must not subscribe whatever
    // outer effect happens to be running.
    let setup_result = lifecycle::with_instance(&instance, || {
        let _pause = PauseScope::enter();
        (instance.def.setup)(&ctx)
    });

    match setup_result {
        Ok(Setup::Render(render)) => {
            *instance.render.borrow_mut() = Some(render);
            if let Err(err) = instance.setup_render_effect() {
                handle_error(Some(&instance), &err);
                mount_placeholder(&instance, "render failed");
            }
        }
        Ok(Setup::Pending(pending)) => {
            pending.attach(&instance);
            instance.phase.set(Phase::Pending);
            mount_placeholder(&instance, "");
        }
        Err(err) => {
            let wrapped = Error::Setup(err.to_string());
            handle_error(Some(&instance), &wrapped);
            // The instance stays in the tree as an inert placeholder.
            instance.phase.set(Phase::Mounted);
            mount_placeholder(&instance, "setup failed");
        }
    }
    Ok(())
}

fn mount_placeholder(instance: &Rc<ComponentInstance>, note: &str) {
    let Some(container) = instance.container.get() else {
        return;
    };
    if instance.subtree.borrow().is_some() || instance.placeholder.get().is_some() {
        return;
    }
    let host = instance.renderer.host();
    let placeholder = host.create_comment(note);
    host.insert(placeholder, container, instance.anchor.get());
    instance.placeholder.set(Some(placeholder));
}

/// Patch a component vnode: rebind the instance and hand it the new props.
///
/// When the patch-flag comparison says nothing the instance observes can
/// have changed, this is a pure rebind and no re-render is scheduled.
pub(crate) fn update_component(old: &Rc<VNode>, new: &Rc<VNode>) -> Result<(), Error> {
    let instance = old
        .instance
        .borrow()
        .clone()
        .ok_or_else(|| Error::Render("component vnode was never mounted".into()))?;
    *new.instance.borrow_mut() = Some(instance.clone());

    if instance
        .props
        .differs(&new.props, new.patch_flag, new.dynamic_props.as_deref())
    {
        // Triggers fire per changed prop name; the render effect's job
        // lands behind the parent's in the same flush (child uid is
        // larger), so the child re-renders once, after its props settled.
        instance.props.replace(new.props.clone());
    } else {
        trace!(name = instance.name(), uid = instance.uid, "update bailed out");
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Pending setup
// ----------------------------------------------------------------------------

/// A fulfillable slot for setup that depends on outside input.
///
/// The component mounts a comment placeholder; when the embedder calls
/// [`fulfill`](Self::fulfill) with a render function, the real subtree
/// mounts in the placeholder's position. Fulfilling after unmount, or a
/// second time, is ignored with a warning.
#[derive(Clone)]
pub struct PendingSetup {
    inner: Rc<PendingInner>,
}

struct PendingInner {
    instance: RefCell<Weak<ComponentInstance>>,
    fulfilled: Cell<bool>,
}

impl PendingSetup {
    /// Create an unattached slot.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(PendingInner {
                instance: RefCell::new(Weak::new()),
                fulfilled: Cell::new(false),
            }),
        }
    }

    fn attach(&self, instance: &Rc<ComponentInstance>) {
        *self.inner.instance.borrow_mut() = Rc::downgrade(instance);
    }

    /// Provide the render function and mount the suspended subtree.
    pub fn fulfill<F>(&self, render: F)
    where
        F: Fn() -> Result<Rc<VNode>, Error> + 'static,
    {
        if self.inner.fulfilled.replace(true) {
            warn!("pending setup fulfilled twice");
            return;
        }
        let Some(instance) = self.inner.instance.borrow().upgrade() else {
            warn!("pending setup fulfilled for a dropped instance");
            return;
        };
        if instance.phase.get() != Phase::Pending {
            warn!(
                name = instance.name(),
                phase = ?instance.phase.get(),
                "pending setup fulfilled out of phase"
            );
            return;
        }
        *instance.render.borrow_mut() = Some(Rc::new(render));
        if let Err(err) = instance.setup_render_effect() {
            handle_error(Some(&instance), &err);
        }
    }
}

impl Default for PendingSetup {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
