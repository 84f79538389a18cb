//! Form Telemetry - Session analytics engine for form-filling behavior
//!
//! Tracks one form session (validation-error persistence, per-section dwell
//! time, submission or abandonment) and exports exactly one finalized record
//! per session, even when navigation, idle expiry and page teardown race.
//!
//! ## Modules
//!
//! - **Reducer**: pure `(SessionRecord, Event) -> SessionRecord` transitions
//! - **Controller**: live session, idle debounce, single-flight export guard
//! - **Exporter**: primary ingestion call with beacon and local-file fallbacks

pub mod clock;
pub mod confirmation;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod exporter;
pub mod reducer;
pub mod replay;
pub mod schema;
pub mod scope;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::TrackerConfig;
pub use confirmation::FieldErrorMonitor;
pub use controller::{ExportStatus, SessionController};
pub use error::TelemetryError;
pub use event::{Event, ScriptedEvent};
pub use exporter::{Delivery, Exporter, HttpExporter, MemoryExporter};
pub use reducer::{open_session, reduce, reduce_session};
pub use scope::{current, try_current, TrackingScope};
pub use types::{ExportReason, FieldRecord, SessionId, SessionRecord, TabRecord, DEFAULT_SECTION};

/// Library version embedded in the FFI and CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
