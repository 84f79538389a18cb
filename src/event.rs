//! Session events
//!
//! The closed set of transitions the reducer understands. Events deserialize from
//! a tagged JSON form (`{"type": "tabChange", "target": "payment"}`) so hosts and
//! scripts can drive a session without linking against Rust types.

use crate::types::{ExportReason, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A transition applied to a session record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    /// A confirmed, persisting validation error on a field
    ValidationError { field: String, message: String },
    /// The user moved to a section
    TabChange { target: String },
    /// Fold every running dwell interval without ending the session
    FinalizeTabTimes,
    Submit,
    Abandon,
    /// Bookkeeping applied after an export attempt
    SetExportReason { reason: ExportReason },
    /// Start over with a fresh session id and the same identifier sets
    Reset {
        #[serde(default, rename = "sessionId")]
        session_id: SessionId,
    },
    /// Anything the reducer does not recognize; applying it changes nothing
    #[serde(other)]
    Unknown,
}

impl Event {
    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Event::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn tab_change(target: impl Into<String>) -> Self {
        Event::TabChange {
            target: target.into(),
        }
    }

    /// Reset with a newly generated session id
    pub fn reset() -> Self {
        Event::Reset {
            session_id: SessionId::new(),
        }
    }

    /// Whether the event ends the session's active tracking
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Submit | Event::Abandon)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::ValidationError { .. } => "validationError",
            Event::TabChange { .. } => "tabChange",
            Event::FinalizeTabTimes => "finalizeTabTimes",
            Event::Submit => "submit",
            Event::Abandon => "abandon",
            Event::SetExportReason { .. } => "setExportReason",
            Event::Reset { .. } => "reset",
            Event::Unknown => "unknown",
        }
    }
}

/// An event together with the instant it happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedEvent {
    pub at: DateTime<Utc>,
    pub event: Event,
}
