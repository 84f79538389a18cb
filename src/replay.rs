//! Event script replay
//!
//! Replays a recorded session offline: NDJSON lines of
//! `{"at": "<RFC 3339>", "event": {...}}` folded through the reducer. Useful for
//! reproducing an exported record from captured signals, and for analyzing
//! sessions without a running controller.

use crate::error::TelemetryError;
use crate::event::ScriptedEvent;
use crate::reducer::{open_session, reduce, reduce_session};
use crate::types::{SessionId, SessionRecord};
use chrono::{DateTime, Utc};

/// Parse an NDJSON event script; blank lines are skipped
pub fn parse_script(ndjson: &str) -> Result<Vec<ScriptedEvent>, TelemetryError> {
    let mut events = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<ScriptedEvent>(trimmed) {
            Ok(event) => events.push(event),
            Err(e) => {
                return Err(TelemetryError::ParseError(format!(
                    "line {}: {}",
                    line_num + 1,
                    e
                )));
            }
        }
    }
    Ok(events)
}

/// Apply scripted events to `record` in script order.
///
/// A `reset` here never activates a section; [`replay_session`] follows the
/// implicit default section the way a live controller does.
pub fn replay(record: &SessionRecord, events: &[ScriptedEvent]) -> SessionRecord {
    events
        .iter()
        .fold(record.clone(), |acc, scripted| reduce(&acc, &scripted.event, scripted.at))
}

/// Open a session at `started_at` (or the first event's time) and replay the script
pub fn replay_session(
    fields: &[String],
    sections: &[String],
    started_at: Option<DateTime<Utc>>,
    events: &[ScriptedEvent],
) -> SessionRecord {
    let started_at = started_at
        .or_else(|| events.first().map(|e| e.at))
        .unwrap_or_else(Utc::now);
    let record = open_session(
        SessionId::new(),
        fields.iter().cloned(),
        sections.iter().cloned(),
        started_at,
    );
    let implicit_section = sections.is_empty();
    events.iter().fold(record, |acc, scripted| {
        reduce_session(&acc, &scripted.event, scripted.at, implicit_section)
    })
}
