//! App Entry
//!
//! An [`App`] pairs a root component with its props and a host. Mounting
//! builds the renderer, mounts the root, runs one flush so the initial
//! batch of watchers and post callbacks settles, and returns an
//! [`AppHandle`] for teardown.
//!
//! After mount the embedder owns the cadence: write to stores, then call
//! [`flush_jobs`](crate::reactive::scheduler::flush_jobs) at its frame or
//! event boundary (or wire [`set_tick_hook`](crate::reactive::scheduler::set_tick_hook)
//! into its event loop).

use std::rc::Rc;

use tracing::info;

use crate::error::{self, Error};
use crate::reactive::scheduler;

use super::component::{Component, ComponentInstance};
use super::host::{HostId, HostOps};
use super::patch::Renderer;
use super::vnode::{component_node, Props, VNode};

/// A configured-but-unmounted application.
pub struct App {
    root: Rc<Component>,
    props: Props,
}

impl App {
    /// Describe an app: root component plus its props.
    pub fn new(root: Rc<Component>, props: Props) -> Self {
        Self { root, props }
    }

    /// Install the app-level error handler.
    ///
    /// It receives every error no error-capture hook claimed. Takes effect
    /// immediately and replaces any previous handler.
    pub fn on_error<F>(self, handler: F) -> Self
    where
        F: Fn(&Error) + 'static,
    {
        error::set_app_error_handler(handler);
        self
    }

    /// Mount into `container` on the given host.
    ///
    /// Flushes once before returning, so mounted hooks and immediate
    /// watchers have run.
    pub fn mount(self, host: Rc<dyn HostOps>, container: HostId) -> Result<AppHandle, Error> {
        let renderer = Renderer::new(host);
        let vnode = component_node(self.root, self.props);
        renderer.mount(&vnode, container, None)?;
        scheduler::flush_jobs();
        info!("app mounted");
        Ok(AppHandle { vnode, renderer })
    }
}

/// Handle to a mounted application.
pub struct AppHandle {
    vnode: Rc<VNode>,
    renderer: Renderer,
}

impl AppHandle {
    /// The root component's live instance.
    pub fn root_instance(&self) -> Option<Rc<ComponentInstance>> {
        self.vnode.instance.borrow().clone()
    }

    /// The renderer, for embedders that mount extra trees.
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Tear the whole tree down. Idempotent.
    pub fn unmount(&self) {
        self.renderer.unmount(&self.vnode);
        info!("app unmounted");
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
