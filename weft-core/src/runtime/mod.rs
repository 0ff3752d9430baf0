//! Component Runtime
//!
//! The runtime renders virtual trees through a pluggable host and keeps
//! them up to date from the reactivity engine. Render functions run inside
//! effects; state writes queue per-instance update jobs; the scheduler
//! flushes parents before children.
//!
//! The pieces:
//!
//! - [`vnode`]: the virtual-tree node type, patch flags, builders.
//! - [`host`]: the host-tree interface plus the in-memory reference host.
//! - [`patch`]: mount/patch/unmount, keyed and unkeyed child diffing.
//! - [`component`]: definitions, instances, props, the lifecycle machine.
//! - [`lifecycle`]: hook registration during setup.
//! - [`app`]: the mount-an-application entry point.

pub mod app;
pub mod component;
pub mod host;
pub mod lifecycle;
pub mod patch;
pub mod vnode;

pub use app::{App, AppHandle};
pub use component::{
    handle_error, Component, ComponentInstance, PendingSetup, Phase, PropsState, RenderFn, Setup,
    SetupContext,
};
pub use host::{channel_for, HostId, HostOp, HostOps, MemoryHost, PropChannel};
pub use lifecycle::{
    current_instance, on_before_mount, on_before_unmount, on_before_update, on_error_captured,
    on_mounted, on_unmounted, on_updated,
};
pub use patch::Renderer;
pub use vnode::{
    comment, component_node, element, element_text, element_with, fragment, keyed_component_node,
    keyed_element, patch_flags, props, same_node, static_node, text, Children, Handler, Key,
    PropValue, Props, VNode, VNodeType,
};
