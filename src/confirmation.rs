//! Validation-error confirmation
//!
//! A field's validation error is only reported once it has stayed visible for
//! the configured persistence threshold. Each field owns at most one pending
//! timer: showing a new message restarts it, clearing the error cancels it, and
//! re-observing the message already being tracked changes nothing. Disposing
//! the controller's tracking scope cancels every pending timer.

use crate::controller::SessionController;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

struct Watch {
    message: String,
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct WatchTable {
    next_generation: u64,
    fields: HashMap<String, Watch>,
}

/// Per-field error-confirmation timers feeding a [`SessionController`]
pub struct FieldErrorMonitor {
    controller: SessionController,
    threshold: Duration,
    table: Arc<Mutex<WatchTable>>,
}

impl FieldErrorMonitor {
    /// Monitor using the controller's configured persistence threshold
    pub fn new(controller: SessionController) -> Self {
        let threshold = controller.config().error_persistence();
        Self::with_threshold(controller, threshold)
    }

    pub fn with_threshold(controller: SessionController, threshold: Duration) -> Self {
        Self {
            controller,
            threshold,
            table: Arc::new(Mutex::new(WatchTable::default())),
        }
    }

    /// Report the current error state of a field (`None` when it has no error)
    pub fn observe(&self, field: &str, error: Option<&str>) {
        let mut table = lock(&self.table);

        let Some(message) = error else {
            if let Some(watch) = table.fields.remove(field) {
                watch.handle.abort();
                tracing::debug!(field, "Validation error cleared");
            }
            return;
        };

        if table
            .fields
            .get(field)
            .is_some_and(|watch| watch.message == message)
        {
            return;
        }
        if let Some(previous) = table.fields.remove(field) {
            previous.handle.abort();
        }

        let generation = table.next_generation;
        table.next_generation += 1;

        let handle = tokio::spawn(confirm_after(
            self.controller.clone(),
            Arc::clone(&self.table),
            self.threshold,
            field.to_string(),
            message.to_string(),
            generation,
        ));

        table.fields.insert(
            field.to_string(),
            Watch {
                message: message.to_string(),
                generation,
                handle,
            },
        );
    }

    /// Fields whose error is still waiting for confirmation
    pub fn pending_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = lock(&self.table)
            .fields
            .iter()
            .filter(|(_, watch)| !watch.handle.is_finished())
            .map(|(field, _)| field.clone())
            .collect();
        fields.sort();
        fields
    }

    /// Cancel every pending confirmation
    pub fn dispose(&self) {
        for (_, watch) in lock(&self.table).fields.drain() {
            watch.handle.abort();
        }
    }
}

impl Drop for FieldErrorMonitor {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn confirm_after(
    controller: SessionController,
    table: Arc<Mutex<WatchTable>>,
    threshold: Duration,
    field: String,
    message: String,
    generation: u64,
) {
    let disposal = controller.disposal();
    tokio::select! {
        _ = disposal.cancelled() => return,
        _ = tokio::time::sleep(threshold) => {}
    }

    let confirmed = lock(&table)
        .fields
        .get(&field)
        .is_some_and(|watch| watch.generation == generation);

    if confirmed {
        tracing::debug!(field = %field, message = %message, "Validation error confirmed");
        controller.report_validation_error(field, message);
    }
}

fn lock(table: &Mutex<WatchTable>) -> MutexGuard<'_, WatchTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::exporter::MemoryExporter;

    fn start() -> SessionController {
        SessionController::start(
            TrackerConfig::default(),
            ["email", "name"],
            Vec::<String>::new(),
            Arc::new(MemoryExporter::new()),
        )
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_persisting_error_reported_once() {
        let controller = start();
        let monitor = FieldErrorMonitor::new(controller.clone());

        monitor.observe("email", Some("Invalid email address"));
        sleep_ms(60_001).await;
        assert_eq!(controller.snapshot().error_count, 1);

        monitor.observe("email", None);
        monitor.observe("email", Some("Invalid email address"));
        sleep_ms(60_001).await;

        let record = controller.snapshot();
        assert_eq!(record.error_count, 1);
        assert_eq!(record.fields["email"].distinct_errors.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleared_error_is_never_reported() {
        let controller = start();
        let monitor = FieldErrorMonitor::new(controller.clone());

        monitor.observe("email", Some("Required"));
        sleep_ms(59_000).await;
        monitor.observe("email", None);
        sleep_ms(10_000).await;

        assert_eq!(controller.snapshot().error_count, 0);
        assert!(monitor.pending_fields().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerender_with_same_message_keeps_timer() {
        let controller = start();
        let monitor = FieldErrorMonitor::with_threshold(controller.clone(), Duration::from_millis(1_000));

        monitor.observe("name", Some("Required"));
        sleep_ms(600).await;
        monitor.observe("name", Some("Required"));
        sleep_ms(500).await;

        assert_eq!(controller.snapshot().error_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_message_restarts_timer() {
        let controller = start();
        let monitor = FieldErrorMonitor::with_threshold(controller.clone(), Duration::from_millis(1_000));

        monitor.observe("email", Some("Required"));
        sleep_ms(600).await;
        monitor.observe("email", Some("Invalid email address"));
        sleep_ms(600).await;
        assert_eq!(controller.snapshot().error_count, 0);
        assert_eq!(monitor.pending_fields(), vec!["email".to_string()]);

        sleep_ms(500).await;
        let record = controller.snapshot();
        assert_eq!(record.error_count, 1);
        assert!(record.fields["email"]
            .distinct_errors
            .contains("Invalid email address"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scope_disposal_cancels_pending() {
        let controller = start();
        let monitor = FieldErrorMonitor::with_threshold(controller.clone(), Duration::from_millis(1_000));

        monitor.observe("email", Some("Required"));
        controller.dispose();
        sleep_ms(2_000).await;

        assert_eq!(controller.snapshot().error_count, 0);
        assert!(monitor.pending_fields().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_cancels_pending() {
        let controller = start();
        let monitor = FieldErrorMonitor::with_threshold(controller.clone(), Duration::from_millis(1_000));

        monitor.observe("email", Some("Required"));
        monitor.observe("name", Some("Required"));
        monitor.dispose();
        sleep_ms(2_000).await;

        assert_eq!(controller.snapshot().error_count, 0);
    }
}
