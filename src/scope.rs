//! Tracking scope
//!
//! Code running inside a form's tracking scope reaches the session controller
//! through [`current`] instead of threading a handle through every call. Calling
//! it anywhere else is an integration bug and panics immediately.

use crate::controller::SessionController;
use crate::error::TelemetryError;
use std::future::Future;

tokio::task_local! {
    static CURRENT_TRACKER: SessionController;
}

/// Entry points that establish a tracking scope around a unit of work
pub struct TrackingScope;

impl TrackingScope {
    /// Run `work` with `controller` as the current tracker.
    ///
    /// The controller is disposed when `work` completes, cancelling its timers.
    pub async fn run<F>(controller: SessionController, work: F) -> F::Output
    where
        F: Future,
    {
        let output = CURRENT_TRACKER.scope(controller.clone(), work).await;
        controller.dispose();
        output
    }

    /// Synchronous variant of [`TrackingScope::run`]
    pub fn run_sync<R>(controller: SessionController, work: impl FnOnce() -> R) -> R {
        let output = CURRENT_TRACKER.sync_scope(controller.clone(), work);
        controller.dispose();
        output
    }
}

/// The tracker of the enclosing scope.
///
/// # Panics
/// Panics when called outside [`TrackingScope::run`] or [`TrackingScope::run_sync`].
pub fn current() -> SessionController {
    match try_current() {
        Ok(controller) => controller,
        Err(e) => panic!("{e}: wrap the caller in TrackingScope::run"),
    }
}

/// The tracker of the enclosing scope, or [`TelemetryError::NoActiveScope`]
pub fn try_current() -> Result<SessionController, TelemetryError> {
    CURRENT_TRACKER
        .try_with(SessionController::clone)
        .map_err(|_| TelemetryError::NoActiveScope)
}
