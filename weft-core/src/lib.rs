//! Weft Core
//!
//! This crate provides the core runtime for the Weft reactive UI framework.
//! It implements:
//!
//! - Reactive primitives (stores, computed values, effects, watchers)
//! - A batched, id-ordered update scheduler
//! - A virtual-tree renderer with keyed minimal-move diffing
//! - Component instances with a full lifecycle and error routing
//!
//! The crate is host-agnostic: the renderer talks to the UI tree through the
//! [`runtime::HostOps`] trait, and the embedder decides when update batches
//! flush.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Dependency tracking, effects, storage, the scheduler
//! - `runtime`: Virtual nodes, the renderer, components, lifecycle, app entry
//! - `error`: Error types and the capture/propagation chain
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::reactive::{flush_jobs, Store};
//! use weft_core::runtime::{element_text, App, Component, MemoryHost, Props, Setup};
//!
//! let counter = Component::new("Counter", |ctx| {
//!     let state = ctx.state();
//!     state.set("count", 0);
//!     let state = state.clone();
//!     Ok(Setup::render(move || {
//!         let count = state.get("count").as_int().unwrap_or(0);
//!         Ok(element_text("p", Props::new(), format!("count: {count}")))
//!     }))
//! });
//!
//! let (host, container) = MemoryHost::new();
//! let app = App::new(counter, Props::new()).mount(host, container)?;
//!
//! // Write state, then flush at the event boundary.
//! app.root_instance().unwrap().state().set("count", 1);
//! flush_jobs();
//! ```

pub mod error;
pub mod reactive;
pub mod runtime;

pub use error::{Captured, Error};
