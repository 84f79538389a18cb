//! Session controller
//!
//! Owns the live session record for one tracking scope and drives it from
//! unreliable signals: user activity, the idle timer, page unload and explicit
//! submission. Every signal goes through one lock-protected dispatch point, and
//! the single-flight export guard is read and set inside that same critical
//! section, so racing terminal signals export exactly one record per session.
//!
//! The lock is never held across an `.await`; the primary export call is the
//! only suspension point.

use crate::clock::{Clock, TokioClock};
use crate::config::TrackerConfig;
use crate::error::TelemetryError;
use crate::event::Event;
use crate::exporter::{Delivery, Exporter};
use crate::reducer::{open_session, reduce, reduce_session};
use crate::types::{ExportReason, SessionId, SessionRecord};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Result of a terminal signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStatus {
    /// This signal won the guard and the record was accepted by a channel
    Delivered(Delivery),
    /// Another signal already exported (or is exporting) this session
    Suppressed,
    /// This signal won the guard but every channel failed
    Failed(String),
}

impl ExportStatus {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ExportStatus::Delivered(_))
    }
}

/// Handle to a live tracking session. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct SessionController {
    shared: Arc<Shared>,
}

struct Shared {
    config: TrackerConfig,
    exporter: Arc<dyn Exporter>,
    clock: Arc<dyn Clock>,
    state: Mutex<SessionState>,
    /// Cancelled on disposal; parent of every idle timer token
    cancel: CancellationToken,
}

struct SessionState {
    record: SessionRecord,
    /// Set right before the first export attempt; never cleared for a session id
    export_guard: bool,
    last_activity: Instant,
    idle_cancel: CancellationToken,
    /// No sections were configured, so the default section is activated per session
    implicit_section: bool,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl SessionController {
    /// Establish a tracking session and arm its idle timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F, S>(
        config: TrackerConfig,
        fields: F,
        sections: S,
        exporter: Arc<dyn Exporter>,
    ) -> Self
    where
        F: IntoIterator,
        F::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        Self::start_with_clock(config, fields, sections, exporter, Arc::new(TokioClock::new()))
    }

    pub fn start_with_clock<F, S>(
        config: TrackerConfig,
        fields: F,
        sections: S,
        exporter: Arc<dyn Exporter>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        F: IntoIterator,
        F::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        let sections: Vec<String> = sections.into_iter().map(Into::into).collect();
        let implicit_section = sections.is_empty();
        let record = open_session(SessionId::new(), fields, sections, clock.now());
        let session_id = record.session_id.clone();

        let cancel = CancellationToken::new();
        let idle_cancel = cancel.child_token();

        tracing::info!(
            session_id = %session_id,
            fields = record.fields.len(),
            sections = record.tabs.len(),
            "Form tracking session started"
        );

        let shared = Arc::new(Shared {
            config,
            exporter,
            clock,
            state: Mutex::new(SessionState {
                record,
                export_guard: false,
                last_activity: Instant::now(),
                idle_cancel: idle_cancel.clone(),
                implicit_section,
            }),
            cancel,
        });

        spawn_idle_timer(&shared, session_id, idle_cancel);

        Self { shared }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.shared.config
    }

    pub fn session_id(&self) -> SessionId {
        self.state().record.session_id.clone()
    }

    /// Copy of the live record
    pub fn snapshot(&self) -> SessionRecord {
        self.state().record.clone()
    }

    /// Whether an export has been attempted for the current session
    pub fn has_exported(&self) -> bool {
        self.state().export_guard
    }

    /// Pointer motion, key press, scroll or click: postpone idle expiry
    pub fn record_activity(&self) {
        self.state().last_activity = Instant::now();
    }

    pub fn change_tab(&self, target: impl Into<String>) {
        self.dispatch(Event::tab_change(target));
    }

    /// Record a confirmed validation error; unknown fields are ignored
    pub fn report_validation_error(&self, field: impl Into<String>, message: impl Into<String>) {
        self.dispatch(Event::validation_error(field, message));
    }

    /// Fold running dwell time into the record without ending the session
    pub fn finalize_tab_times(&self) {
        self.dispatch(Event::FinalizeTabTimes);
    }

    /// Explicit submission. Exports through the primary channel.
    pub async fn submit(&self) -> ExportStatus {
        self.export_terminal(None, ExportReason::Submit).await
    }

    /// Page teardown. Cannot await the network, so it uses the exporter's
    /// non-blocking path.
    pub fn page_unload(&self) -> ExportStatus {
        let Some(snapshot) = self.begin_export(None, ExportReason::TabClose) else {
            return ExportStatus::Suppressed;
        };
        let result = self.shared.exporter.deliver_on_teardown(&snapshot);
        self.finish_export(&snapshot, ExportReason::TabClose, result)
    }

    /// Replace the session with a fresh one (new id, same identifiers, fresh guard)
    pub fn reset(&self) -> SessionId {
        let now = self.shared.clock.now();
        let session_id = SessionId::new();

        let idle_cancel = {
            let mut state = self.state();
            state.idle_cancel.cancel();

            let record = reduce_session(
                &state.record,
                &Event::Reset {
                    session_id: session_id.clone(),
                },
                now,
                state.implicit_section,
            );

            tracing::info!(
                previous = %state.record.session_id,
                session_id = %session_id,
                "Form tracking session reset"
            );

            state.record = record;
            state.export_guard = false;
            state.last_activity = Instant::now();
            state.idle_cancel = self.shared.cancel.child_token();
            state.idle_cancel.clone()
        };

        spawn_idle_timer(&self.shared, session_id.clone(), idle_cancel);
        session_id
    }

    /// Tear down the tracking scope. Cancels the idle timer and pending error
    /// confirmations; later signals are ignored.
    pub fn dispose(&self) {
        tracing::debug!(session_id = %self.session_id(), "Form tracking scope disposed");
        self.shared.cancel.cancel();
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Token cancelled when the tracking scope is disposed
    pub(crate) fn disposal(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, event: Event) {
        let now = self.shared.clock.now();
        let mut state = self.state();
        // The record is frozen from the moment an export is attempted
        if state.record.is_terminal() || state.export_guard || self.is_disposed() {
            tracing::debug!(
                session_id = %state.record.session_id,
                event = event.name(),
                "Ignoring event for finished session"
            );
            return;
        }
        state.record = reduce(&state.record, &event, now);
        tracing::debug!(
            session_id = %state.record.session_id,
            event = event.name(),
            error_count = state.record.error_count,
            "Session event applied"
        );
    }

    /// Deadline for the idle timer of `session_id`, or `None` if it must stop
    fn idle_deadline(&self, session_id: &SessionId) -> Option<Instant> {
        let state = self.state();
        if state.record.session_id != *session_id || state.export_guard {
            return None;
        }
        Some(state.last_activity + self.shared.config.idle_timeout())
    }

    async fn export_terminal(
        &self,
        expected: Option<&SessionId>,
        reason: ExportReason,
    ) -> ExportStatus {
        let Some(snapshot) = self.begin_export(expected, reason) else {
            return ExportStatus::Suppressed;
        };
        let result = self.shared.exporter.deliver(&snapshot).await;
        self.finish_export(&snapshot, reason, result)
    }

    /// Acquire the guard and build the finalized snapshot.
    ///
    /// Runs entirely under the state lock. The live record is left untouched
    /// until the export succeeds.
    fn begin_export(&self, expected: Option<&SessionId>, reason: ExportReason) -> Option<SessionRecord> {
        let now = self.shared.clock.now();
        let mut state = self.state();

        if expected.is_some_and(|id| *id != state.record.session_id) {
            return None;
        }
        if state.export_guard {
            tracing::debug!(
                session_id = %state.record.session_id,
                reason = %reason,
                "Session already exported, suppressing"
            );
            return None;
        }
        // Activity may land between the idle task's deadline check and this lock
        if reason == ExportReason::Idle
            && state.last_activity + self.shared.config.idle_timeout() > Instant::now()
        {
            return None;
        }

        state.export_guard = true;
        state.idle_cancel.cancel();

        let record = reduce(&state.record, &Event::FinalizeTabTimes, now);
        Some(finalize(&record, reason, now))
    }

    fn finish_export(
        &self,
        snapshot: &SessionRecord,
        reason: ExportReason,
        result: Result<Delivery, TelemetryError>,
    ) -> ExportStatus {
        match result {
            Ok(delivery) => {
                tracing::info!(
                    session_id = %snapshot.session_id,
                    reason = %reason,
                    channel = delivery.channel(),
                    "Session record exported"
                );
                let mut state = self.state();
                if state.record.session_id == snapshot.session_id {
                    state.record = snapshot.clone();
                }
                ExportStatus::Delivered(delivery)
            }
            Err(e) => {
                tracing::error!(
                    session_id = %snapshot.session_id,
                    reason = %reason,
                    error = %e,
                    "Session record could not be delivered"
                );
                ExportStatus::Failed(e.to_string())
            }
        }
    }
}

/// Apply the terminal transition for `reason` and stamp the reason
fn finalize(record: &SessionRecord, reason: ExportReason, now: DateTime<Utc>) -> SessionRecord {
    let terminal = match reason {
        ExportReason::Submit => Event::Submit,
        _ => Event::Abandon,
    };
    let record = reduce(record, &terminal, now);
    reduce(&record, &Event::SetExportReason { reason }, now)
}

/// Debounced idle timer for one session generation.
///
/// Sleeps until `last_activity + idle_timeout`; activity only moves the deadline,
/// so the task re-checks on wake and fires at most once.
fn spawn_idle_timer(shared: &Arc<Shared>, session_id: SessionId, cancel: CancellationToken) {
    let weak: Weak<Shared> = Arc::downgrade(shared);
    let mut deadline = Instant::now() + shared.config.idle_timeout();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep_until(deadline) => {}
            }

            let Some(shared) = weak.upgrade() else {
                return;
            };
            let controller = SessionController { shared };

            match controller.idle_deadline(&session_id) {
                Some(next) if next > Instant::now() => deadline = next,
                Some(_) => {
                    tracing::info!(session_id = %session_id, "Session idle timeout reached");
                    let status = controller
                        .export_terminal(Some(&session_id), ExportReason::Idle)
                        .await;
                    if status != ExportStatus::Suppressed {
                        return;
                    }
                    // Late activity rearms the window; anything else stops it
                    match controller.idle_deadline(&session_id) {
                        Some(next) => deadline = next,
                        None => return,
                    }
                }
                None => return,
            }
        }
    });
}
