//! Integration Tests for the Reactive Runtime
//!
//! These tests drive whole apps end to end: stores, computed values and
//! watchers feeding component renders through the scheduler, with the
//! in-memory host recording what actually happened to the tree.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use weft_core::reactive::{
    flush_jobs, next_tick, watch, Computed, FlushMode, WatchOptions,
};
use weft_core::runtime::{
    component_node, element_text, fragment, keyed_element, on_error_captured, on_mounted, props,
    App, Component, HostOp, MemoryHost, PendingSetup, Phase, PropValue, Props, Setup,
};
use weft_core::{Captured, Error};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A burst of writes produces exactly one render per flush.
#[test]
fn writes_coalesce_into_one_render() {
    init_tracing();
    let (host, container) = MemoryHost::new();

    let renders = Rc::new(Cell::new(0));
    let renders_clone = renders.clone();
    let root = Component::new("Counter", move |ctx| {
        let state = ctx.state();
        state.set("count", 0);
        let renders = renders_clone.clone();
        let state = state.clone();
        Ok(Setup::render(move || {
            renders.set(renders.get() + 1);
            let count = state.get("count").as_int().unwrap_or(0);
            Ok(element_text("p", Props::new(), format!("n={count}")))
        }))
    });

    let app = App::new(root, Props::new()).mount(host.clone(), container).unwrap();
    assert_eq!(renders.get(), 1);

    let state = app.root_instance().unwrap().state();
    for n in 1..=10 {
        state.set("count", n);
    }
    assert_eq!(renders.get(), 1);

    flush_jobs();
    assert_eq!(renders.get(), 2);
    assert_eq!(host.to_string(container), "<root><p>n=10</p></root>");
    app.unmount();
}

/// Parent and child both dirty in one batch: the parent renders first and
/// the child exactly once, with its props already settled.
#[test]
fn parent_flushes_before_child() {
    let (host, container) = MemoryHost::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let log_child = log.clone();
    let child = Component::new("Child", move |ctx| {
        let props = ctx.props();
        let log = log_child.clone();
        Ok(Setup::render(move || {
            log.borrow_mut().push(format!("child:{}", props.str("label")));
            Ok(element_text("span", Props::new(), props.str("label")))
        }))
    });

    let log_parent = log.clone();
    let parent = Component::new("Parent", move |ctx| {
        let state = ctx.state();
        state.set("label", "a");
        let log = log_parent.clone();
        let child = child.clone();
        let state = state.clone();
        Ok(Setup::render(move || {
            let label = state.get("label").as_str().unwrap_or_default().to_owned();
            log.borrow_mut().push("parent".to_owned());
            Ok(component_node(
                child.clone(),
                props([("label", PropValue::from(label))]),
            ))
        }))
    });

    let app = App::new(parent, Props::new()).mount(host, container).unwrap();
    assert_eq!(*log.borrow(), vec!["parent", "child:a"]);
    log.borrow_mut().clear();

    app.root_instance().unwrap().state().set("label", "b");
    flush_jobs();
    assert_eq!(*log.borrow(), vec!["parent", "child:b"]);
    app.unmount();
}

/// Keyed list rotation inside a component re-render is a single host move.
#[test]
fn keyed_rotation_in_a_component_is_one_move() {
    let (host, container) = MemoryHost::new();

    let root = Component::new("List", |ctx| {
        let state = ctx.state();
        state.set("order", "abcd");
        let state = state.clone();
        Ok(Setup::render(move || {
            let order = state.get("order").as_str().unwrap_or_default().to_owned();
            let items = order
                .chars()
                .map(|c| {
                    keyed_element("li", c.to_string().as_str(), Props::new(), vec![
                        weft_core::runtime::text(c.to_string()),
                    ])
                })
                .collect();
            Ok(fragment(items))
        }))
    });

    let app = App::new(root, Props::new()).mount(host.clone(), container).unwrap();
    host.clear_ops();

    app.root_instance().unwrap().state().set("order", "dabc");
    flush_jobs();

    assert_eq!(host.count_ops(|op| matches!(op, HostOp::Move)), 1);
    assert_eq!(host.count_ops(|op| matches!(op, HostOp::CreateElement(_))), 0);
    assert_eq!(host.count_ops(|op| matches!(op, HostOp::Remove)), 0);
    app.unmount();
}

/// A computed value between the store and the render recomputes once per
/// batch and drives the render like any other dependency.
#[test]
fn computed_feeds_a_render() {
    let (host, container) = MemoryHost::new();
    let computes = Rc::new(Cell::new(0));

    let computes_clone = computes.clone();
    let root = Component::new("Doubler", move |ctx| {
        let state = ctx.state();
        state.set("n", 1);
        let computes = computes_clone.clone();
        let state_for_computed = state.clone();
        let doubled = Computed::new(move || {
            computes.set(computes.get() + 1);
            state_for_computed.get("n").as_int().unwrap_or(0) * 2
        });
        Ok(Setup::render(move || {
            Ok(element_text("p", Props::new(), doubled.get()?.to_string()))
        }))
    });

    let app = App::new(root, Props::new()).mount(host.clone(), container).unwrap();
    assert_eq!(host.to_string(container), "<root><p>2</p></root>");
    assert_eq!(computes.get(), 1);

    let state = app.root_instance().unwrap().state();
    state.set("n", 3);
    state.set("n", 4);
    flush_jobs();
    assert_eq!(host.to_string(container), "<root><p>8</p></root>");
    assert_eq!(computes.get(), 2);
    app.unmount();
}

/// A pre watcher owned by the instance runs in the same flush as the
/// render, before it.
#[test]
fn owned_pre_watcher_runs_before_the_render() {
    let (host, container) = MemoryHost::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let log_render = log.clone();
    let root = Component::new("Watched", move |ctx| {
        let state = ctx.state();
        state.set("n", 0);
        let log = log_render.clone();
        let state = state.clone();
        Ok(Setup::render(move || {
            let n = state.get("n").as_int().unwrap_or(0);
            log.borrow_mut().push("render".to_owned());
            Ok(element_text("p", Props::new(), n.to_string()))
        }))
    });

    let app = App::new(root, Props::new()).mount(host, container).unwrap();
    let instance = app.root_instance().unwrap();
    let state = instance.state();
    log.borrow_mut().clear();

    let state_watched = state.clone();
    let log_watch = log.clone();
    let handle = watch(
        move || state_watched.get("n").as_int().unwrap_or(0),
        move |_new, _old| {
            log_watch.borrow_mut().push("watch".to_owned());
            Ok(())
        },
        WatchOptions {
            flush: FlushMode::Pre,
            owner: Some(instance.uid()),
            ..Default::default()
        },
    );

    state.set("n", 1);
    flush_jobs();
    assert_eq!(*log.borrow(), vec!["watch", "render"]);
    handle.stop();
    app.unmount();
}

/// `next_tick` callbacks observe the already-patched tree.
#[test]
fn next_tick_sees_the_patched_tree() {
    let (host, container) = MemoryHost::new();

    let root = Component::new("Ticker", |ctx| {
        let state = ctx.state();
        state.set("n", 0);
        let state = state.clone();
        Ok(Setup::render(move || {
            let n = state.get("n").as_int().unwrap_or(0);
            Ok(element_text("p", Props::new(), n.to_string()))
        }))
    });

    let app = App::new(root, Props::new()).mount(host.clone(), container).unwrap();
    let state = app.root_instance().unwrap().state();

    let observed = Rc::new(RefCell::new(String::new()));
    let observed_clone = observed.clone();
    let host_clone = host.clone();
    state.set("n", 7);
    next_tick(move || {
        *observed_clone.borrow_mut() = host_clone.to_string(container);
        Ok(())
    });
    flush_jobs();

    assert_eq!(*observed.borrow(), "<root><p>7</p></root>");
    app.unmount();
}

/// An error in a child's hook is claimed by the parent's capture hook and
/// never reaches the app handler.
#[test]
fn error_capture_stops_at_a_handling_ancestor() {
    let (host, container) = MemoryHost::new();

    let captured = Rc::new(RefCell::new(Vec::new()));
    let uncaptured = Rc::new(RefCell::new(Vec::new()));

    let child = Component::new("FailingChild", |_ctx| {
        on_mounted(|| Err(Error::msg("hook exploded")));
        Ok(Setup::render(|| Ok(element_text("span", Props::new(), "child"))))
    });

    let captured_clone = captured.clone();
    let parent = Component::new("CatchingParent", move |_ctx| {
        let captured = captured_clone.clone();
        on_error_captured(move |err| {
            captured.borrow_mut().push(err.to_string());
            Ok(Captured::Handled)
        });
        let child = child.clone();
        Ok(Setup::render(move || {
            Ok(component_node(child.clone(), Props::new()))
        }))
    });

    let uncaptured_clone = uncaptured.clone();
    let app = App::new(parent, Props::new())
        .on_error(move |err| uncaptured_clone.borrow_mut().push(err.to_string()))
        .mount(host, container)
        .unwrap();

    assert_eq!(captured.borrow().len(), 1);
    assert!(captured.borrow()[0].contains("hook exploded"));
    assert!(uncaptured.borrow().is_empty());

    app.unmount();
    weft_core::error::clear_app_error_handler();
}

/// A propagating capture hook passes the error on to the app handler.
#[test]
fn propagated_errors_reach_the_app_handler() {
    let (host, container) = MemoryHost::new();

    let seen_by_parent = Rc::new(Cell::new(0));
    let seen_by_app = Rc::new(Cell::new(0));

    let child = Component::new("FailingChild", |_ctx| {
        on_mounted(|| Err(Error::msg("hook exploded")));
        Ok(Setup::render(|| Ok(element_text("span", Props::new(), "child"))))
    });

    let seen_parent = seen_by_parent.clone();
    let parent = Component::new("ObservingParent", move |_ctx| {
        let seen = seen_parent.clone();
        on_error_captured(move |_err| {
            seen.set(seen.get() + 1);
            Ok(Captured::Propagate)
        });
        let child = child.clone();
        Ok(Setup::render(move || {
            Ok(component_node(child.clone(), Props::new()))
        }))
    });

    let seen_app = seen_by_app.clone();
    let app = App::new(parent, Props::new())
        .on_error(move |_err| seen_app.set(seen_app.get() + 1))
        .mount(host, container)
        .unwrap();

    assert_eq!(seen_by_parent.get(), 1);
    assert_eq!(seen_by_app.get(), 1);

    app.unmount();
    weft_core::error::clear_app_error_handler();
}

/// A pending setup mounts a placeholder, then the real subtree on fulfill,
/// and stays quiet if fulfilled after unmount.
#[test]
fn pending_setup_within_an_app() {
    let (host, container) = MemoryHost::new();

    let slot = Rc::new(RefCell::new(None));
    let slot_clone = slot.clone();
    let root = Component::new("LazyRoot", move |_ctx| {
        let pending = PendingSetup::new();
        *slot_clone.borrow_mut() = Some(pending.clone());
        Ok(Setup::Pending(pending))
    });

    let app = App::new(root, Props::new()).mount(host.clone(), container).unwrap();
    let instance = app.root_instance().unwrap();
    assert_eq!(instance.phase(), Phase::Pending);
    assert_eq!(host.to_string(container), "<root><!----></root>");

    let pending = slot.borrow().clone().unwrap();
    pending.fulfill(|| Ok(element_text("p", Props::new(), "arrived")));
    assert_eq!(host.to_string(container), "<root><p>arrived</p></root>");
    assert_eq!(instance.phase(), Phase::Mounted);

    app.unmount();
    assert_eq!(instance.phase(), Phase::Unmounted);
    assert_eq!(host.to_string(container), "<root></root>");
}

/// Unmounting the app tears children down exactly once, parents' hooks and
/// children's hooks included.
#[test]
fn unmount_cascades_and_stays_idempotent() {
    let (host, container) = MemoryHost::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let log_child = log.clone();
    let child = Component::new("Leaf", move |_ctx| {
        let log = log_child.clone();
        weft_core::runtime::on_unmounted(move || {
            log.borrow_mut().push("leaf unmounted");
            Ok(())
        });
        Ok(Setup::render(|| Ok(element_text("span", Props::new(), "leaf"))))
    });

    let log_parent = log.clone();
    let parent = Component::new("Branch", move |_ctx| {
        let log = log_parent.clone();
        weft_core::runtime::on_unmounted(move || {
            log.borrow_mut().push("branch unmounted");
            Ok(())
        });
        let child = child.clone();
        Ok(Setup::render(move || {
            Ok(component_node(child.clone(), Props::new()))
        }))
    });

    let app = App::new(parent, Props::new()).mount(host.clone(), container).unwrap();
    app.unmount();
    app.unmount();

    assert_eq!(*log.borrow(), vec!["leaf unmounted", "branch unmounted"]);
    assert_eq!(host.to_string(container), "<root></root>");
}
