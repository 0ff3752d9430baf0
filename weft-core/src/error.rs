//! Runtime Errors
//!
//! Every user-supplied callback in the runtime (setup functions, render
//! functions, watcher callbacks, lifecycle hooks, event handlers) returns a
//! `Result`. When one of them fails, the error is caught at the call site and
//! routed up the owning component's ancestor chain looking for an
//! error-capture hook. If no hook claims the error, it falls through to the
//! app-level handler, and finally to the log.
//!
//! The scheduler uses the same machinery: a failing job never aborts the rest
//! of the flush queue.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

/// An error produced by user code running inside the runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// A component setup function failed.
    #[error("component setup failed: {0}")]
    Setup(String),

    /// A render function failed.
    #[error("render function failed: {0}")]
    Render(String),

    /// A watcher callback failed.
    #[error("watcher callback failed: {0}")]
    Watcher(String),

    /// A lifecycle hook failed.
    #[error("lifecycle hook `{hook}` failed: {message}")]
    Hook {
        /// Which hook phase was running.
        hook: &'static str,
        /// What went wrong.
        message: String,
    },

    /// An event handler failed.
    #[error("event handler `{event}` failed: {message}")]
    Event {
        /// The event name as the handler prop spells it.
        event: String,
        /// What went wrong.
        message: String,
    },

    /// A plain effect function failed.
    #[error("effect failed: {0}")]
    Effect(String),

    /// A free-form error message.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Convenience constructor for free-form errors.
    pub fn msg(message: impl Into<String>) -> Self {
        Error::Msg(message.into())
    }
}

/// The verdict of an error-capture hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Captured {
    /// The hook handled the error; propagation stops here.
    Handled,
    /// The hook observed the error but did not claim it; keep walking
    /// the ancestor chain.
    Propagate,
}

// App-level fallback handler. Installed by `App::on_error`; consulted only
// after every error-capture hook on the ancestor chain declined the error.
thread_local! {
    static APP_HANDLER: RefCell<Option<Rc<dyn Fn(&Error)>>> = RefCell::new(None);
}

/// Install the app-level error handler.
///
/// Replaces any previously installed handler.
pub fn set_app_error_handler<F>(handler: F)
where
    F: Fn(&Error) + 'static,
{
    APP_HANDLER.with(|h| *h.borrow_mut() = Some(Rc::new(handler)));
}

/// Remove the app-level error handler.
pub fn clear_app_error_handler() {
    APP_HANDLER.with(|h| *h.borrow_mut() = None);
}

/// Deliver an error that no capture hook claimed.
///
/// Falls back to the app-level handler if one is installed, otherwise logs.
pub(crate) fn report_uncaptured(err: &Error) {
    let handler = APP_HANDLER.with(|h| h.borrow().clone());
    match handler {
        Some(handler) => handler(err),
        None => tracing::error!(error = %err, "unhandled runtime error"),
    }
}
