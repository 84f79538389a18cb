//! Session record types
//!
//! This module defines the analytics record for one form-filling session and the
//! per-field and per-section records it aggregates. The serialized form (camelCase
//! JSON, keyed maps) is the exact payload sent to the ingestion endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// Section id used when the host configures no sections
pub const DEFAULT_SECTION: &str = "default";

/// Opaque, never-reused session token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random session id
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Why a record was exported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExportReason {
    Submit,
    TabClose,
    Idle,
    #[default]
    None,
}

impl ExportReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportReason::Submit => "submit",
            ExportReason::TabClose => "tabClose",
            ExportReason::Idle => "idle",
            ExportReason::None => "none",
        }
    }
}

impl fmt::Display for ExportReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation history of one form field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRecord {
    pub id: String,
    /// Distinct error messages observed for this field (exact string match)
    #[serde(default)]
    pub distinct_errors: BTreeSet<String>,
}

impl FieldRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            distinct_errors: BTreeSet::new(),
        }
    }
}

/// Dwell-time bookkeeping for one form section
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabRecord {
    pub visit_count: u32,
    /// Milliseconds folded in from completed active intervals
    pub accumulated_time: i64,
    /// Start of the current active interval; `None` when the section is inactive
    pub active_since: Option<DateTime<Utc>>,
}

impl TabRecord {
    pub fn is_active(&self) -> bool {
        self.active_since.is_some()
    }

    /// Fold the running interval into `accumulated_time` and deactivate.
    ///
    /// A clock that went backwards contributes zero rather than a negative span.
    pub(crate) fn fold_active_time(&mut self, now: DateTime<Utc>) {
        if let Some(since) = self.active_since.take() {
            let elapsed = (now - since).num_milliseconds().max(0);
            self.accumulated_time += elapsed;
        }
    }
}

/// Analytics for one form session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Milliseconds from `started_at` to submission
    pub completion_duration: Option<i64>,
    pub fields: BTreeMap<String, FieldRecord>,
    pub tabs: BTreeMap<String, TabRecord>,
    pub submitted: bool,
    pub abandoned: bool,
    pub error_count: u32,
    pub export_reason: ExportReason,
}

impl SessionRecord {
    /// Create an empty record with the given field and section identifiers.
    ///
    /// No section is active yet; see [`crate::reducer::open_session`] for the
    /// implicit default section.
    pub fn new<F, S>(session_id: SessionId, fields: F, sections: S, started_at: DateTime<Utc>) -> Self
    where
        F: IntoIterator,
        F::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(|id| {
                let id: String = id.into();
                (id.clone(), FieldRecord::new(id))
            })
            .collect();
        let tabs = sections
            .into_iter()
            .map(|id| (id.into(), TabRecord::default()))
            .collect();

        Self {
            session_id,
            started_at,
            ended_at: None,
            completion_duration: None,
            fields,
            tabs,
            submitted: false,
            abandoned: false,
            error_count: 0,
            export_reason: ExportReason::None,
        }
    }

    /// Whether a terminal transition (submit or abandon) has been applied
    pub fn is_terminal(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Error count re-derived from field contents
    pub fn derived_error_count(&self) -> u32 {
        self.fields
            .values()
            .map(|f| f.distinct_errors.len() as u32)
            .sum()
    }

    /// Id of the section currently accumulating dwell time, if any
    pub fn active_section(&self) -> Option<&str> {
        self.tabs
            .iter()
            .find(|(_, tab)| tab.is_active())
            .map(|(id, _)| id.as_str())
    }

    /// Total dwell time folded into all sections
    pub fn total_dwell_time(&self) -> i64 {
        self.tabs.values().map(|t| t.accumulated_time).sum()
    }

    pub fn field_ids(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn section_ids(&self) -> impl Iterator<Item = &str> {
        self.tabs.keys().map(String::as_str)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
