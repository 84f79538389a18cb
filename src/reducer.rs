//! Session event reducer
//!
//! `reduce` is the only way a session record changes. It is pure: it reads no
//! clock, spawns no timers and performs no I/O. The caller supplies the instant
//! the event happened, which keeps every transition deterministic and testable.

use crate::event::Event;
use crate::types::{ExportReason, SessionId, SessionRecord, DEFAULT_SECTION};
use chrono::{DateTime, Utc};

/// Apply one event to a record and return the next record.
///
/// Total over [`Event`]: nothing panics, and events whose precondition does not
/// hold (unknown field, terminal event on an ended session, unrecognized event)
/// return an unchanged copy.
pub fn reduce(record: &SessionRecord, event: &Event, now: DateTime<Utc>) -> SessionRecord {
    let mut next = record.clone();

    match event {
        Event::ValidationError { field, message } => {
            if let Some(field) = next.fields.get_mut(field) {
                if field.distinct_errors.insert(message.clone()) {
                    next.error_count += 1;
                }
            }
        }

        Event::TabChange { target } => {
            finalize_tab_times(&mut next, now);
            let tab = next.tabs.entry(target.clone()).or_default();
            tab.visit_count += 1;
            tab.active_since = Some(now);
        }

        Event::FinalizeTabTimes => finalize_tab_times(&mut next, now),

        Event::Submit => {
            if next.is_terminal() {
                return next;
            }
            // Repair the incremental counter from field contents
            next.error_count = next.derived_error_count();
            finalize_tab_times(&mut next, now);
            next.ended_at = Some(now);
            next.completion_duration = Some((now - next.started_at).num_milliseconds().max(0));
            next.submitted = true;
            next.abandoned = false;
            next.export_reason = ExportReason::Submit;
        }

        Event::Abandon => {
            if next.is_terminal() {
                return next;
            }
            finalize_tab_times(&mut next, now);
            next.ended_at = Some(now);
            next.abandoned = true;
        }

        Event::SetExportReason { reason } => next.export_reason = *reason,

        Event::Reset { session_id } => {
            next = SessionRecord::new(
                session_id.clone(),
                record.field_ids().map(str::to_string),
                record.section_ids().map(str::to_string),
                now,
            );
        }

        Event::Unknown => {}
    }

    next
}

/// Fold a sequence of events, in order, into a record
pub fn reduce_all<'a, I>(record: &SessionRecord, events: I) -> SessionRecord
where
    I: IntoIterator<Item = (&'a Event, DateTime<Utc>)>,
{
    events
        .into_iter()
        .fold(record.clone(), |acc, (event, at)| reduce(&acc, event, at))
}

/// Create the record for a newly established tracking scope.
///
/// With no configured sections the implicit [`DEFAULT_SECTION`] is activated
/// immediately so dwell time always has exactly one active section.
pub fn open_session<F, S>(
    session_id: SessionId,
    fields: F,
    sections: S,
    now: DateTime<Utc>,
) -> SessionRecord
where
    F: IntoIterator,
    F::Item: Into<String>,
    S: IntoIterator,
    S::Item: Into<String>,
{
    let record = SessionRecord::new(session_id, fields, sections, now);
    if record.tabs.is_empty() {
        reduce(&record, &Event::tab_change(DEFAULT_SECTION), now)
    } else {
        record
    }
}

/// [`reduce`] for a session created by [`open_session`].
///
/// `implicit_section` says the session was opened without sections; a `Reset`
/// then re-activates [`DEFAULT_SECTION`] so the fresh session matches a newly
/// opened one.
pub fn reduce_session(
    record: &SessionRecord,
    event: &Event,
    now: DateTime<Utc>,
    implicit_section: bool,
) -> SessionRecord {
    let next = reduce(record, event, now);
    match event {
        Event::Reset { .. } if implicit_section => {
            reduce(&next, &Event::tab_change(DEFAULT_SECTION), now)
        }
        _ => next,
    }
}

fn finalize_tab_times(record: &mut SessionRecord, now: DateTime<Utc>) {
    for tab in record.tabs.values_mut() {
        tab.fold_active_time(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn sample_record() -> SessionRecord {
        SessionRecord::new(
            SessionId::from("sess-1"),
            ["email", "name", "card"],
            ["personal", "payment", "experience"],
            t(0),
        )
    }

    #[test]
    fn test_reset_reopens_implicit_default_section() {
        let opened = open_session(SessionId::from("sess-1"), ["email"], Vec::<String>::new(), t(0));
        let opened = reduce(&opened, &Event::validation_error("email", "Required"), t(1_000));

        let reset = Event::Reset {
            session_id: SessionId::from("sess-2"),
        };
        let plain = reduce(&opened, &reset, t(2_000));
        let reopened = reduce_session(&opened, &reset, t(2_000), true);

        assert_eq!(plain.active_section(), None);
        assert_eq!(
            reopened,
            open_session(SessionId::from("sess-2"), ["email"], Vec::<String>::new(), t(2_000))
        );

        // Explicit sections stay inactive until the host picks one
        let explicit = sample_record();
        assert_eq!(
            reduce_session(&explicit, &reset, t(2_000), false),
            reduce(&explicit, &reset, t(2_000))
        );
    }

    #[test]
    fn test_validation_error_dedup() {
        let record = sample_record();
        let event = Event::validation_error("email", "Invalid email address");

        let once = reduce(&record, &event, t(10));
        let twice = reduce(&once, &event, t(20));

        assert_eq!(once.error_count, 1);
        assert_eq!(twice.error_count, 1);
        assert_eq!(twice.fields["email"].distinct_errors.len(), 1);
    }

    #[test]
    fn test_validation_error_distinct_messages_count_separately() {
        let record = sample_record();
        let record = reduce(&record, &Event::validation_error("email", "Required"), t(1));
        let record = reduce(&record, &Event::validation_error("email", "Invalid email address"), t(2));
        let record = reduce(&record, &Event::validation_error("name", "Required"), t(3));

        assert_eq!(record.error_count, 3);
        assert_eq!(record.error_count, record.derived_error_count());
    }

    #[test]
    fn test_validation_error_unknown_field_is_noop() {
        let record = sample_record();
        let next = reduce(&record, &Event::validation_error("phone", "Required"), t(1));
        assert_eq!(next, record);
    }

    #[test]
    fn test_tab_change_accumulates_dwell_time() {
        let record = sample_record();
        let record = reduce(&record, &Event::tab_change("personal"), t(0));
        let record = reduce(&record, &Event::tab_change("payment"), t(5_000));

        assert_eq!(record.tabs["personal"].accumulated_time, 5_000);
        assert_eq!(record.tabs["personal"].active_since, None);
        assert_eq!(record.tabs["payment"].active_since, Some(t(5_000)));
        assert_eq!(record.tabs["payment"].visit_count, 1);
        assert_eq!(record.active_section(), Some("payment"));
    }

    #[test]
    fn test_tab_change_creates_unknown_section() {
        let record = sample_record();
        let record = reduce(&record, &Event::tab_change("review"), t(0));

        assert_eq!(record.tabs.len(), 4);
        assert_eq!(record.tabs["review"].visit_count, 1);
    }

    #[test]
    fn test_reentering_active_section_counts_another_visit() {
        let record = sample_record();
        let record = reduce(&record, &Event::tab_change("personal"), t(0));
        let record = reduce(&record, &Event::tab_change("personal"), t(3_000));

        assert_eq!(record.tabs["personal"].visit_count, 2);
        assert_eq!(record.tabs["personal"].accumulated_time, 3_000);
        assert_eq!(record.tabs["personal"].active_since, Some(t(3_000)));
    }

    #[test]
    fn test_finalize_tab_times_keeps_session_open() {
        let record = sample_record();
        let record = reduce(&record, &Event::tab_change("personal"), t(0));
        let record = reduce(&record, &Event::FinalizeTabTimes, t(4_000));

        assert_eq!(record.tabs["personal"].accumulated_time, 4_000);
        assert!(record.active_section().is_none());
        assert!(!record.is_terminal());
    }

    #[test]
    fn test_dwell_time_is_conserved() {
        let visits = [
            ("personal", 0),
            ("payment", 1_250),
            ("personal", 4_000),
            ("experience", 4_001),
            ("payment", 9_999),
            ("payment", 15_000),
        ];
        let mut record = sample_record();
        for (section, at) in visits {
            record = reduce(&record, &Event::tab_change(section), t(at));
        }
        record = reduce(&record, &Event::FinalizeTabTimes, t(21_000));

        assert_eq!(record.total_dwell_time(), 21_000);
    }

    #[test]
    fn test_scenario_three_sections_then_submit() {
        let record = sample_record();
        let record = reduce(&record, &Event::tab_change("personal"), t(0));
        let record = reduce(&record, &Event::tab_change("payment"), t(5_000));
        let record = reduce(&record, &Event::tab_change("experience"), t(12_000));
        let record = reduce(&record, &Event::Submit, t(20_000));

        assert_eq!(record.tabs["personal"].accumulated_time, 5_000);
        assert_eq!(record.tabs["payment"].accumulated_time, 7_000);
        assert_eq!(record.tabs["experience"].accumulated_time, 8_000);
        assert!(record.submitted);
        assert!(!record.abandoned);
        assert_eq!(record.completion_duration, Some(20_000));
        assert_eq!(record.ended_at, Some(t(20_000)));
        assert_eq!(record.export_reason, ExportReason::Submit);
        assert!(record.active_section().is_none());
    }

    #[test]
    fn test_submit_repairs_error_count() {
        let mut record = sample_record();
        record
            .fields
            .get_mut("card")
            .unwrap()
            .distinct_errors
            .insert("Card number is invalid".to_string());
        record.error_count = 7;

        let record = reduce(&record, &Event::Submit, t(1_000));
        assert_eq!(record.error_count, 1);
    }

    #[test]
    fn test_abandon_keeps_submitted_flag() {
        let record = sample_record();
        let record = reduce(&record, &Event::tab_change("personal"), t(0));
        let record = reduce(&record, &Event::Abandon, t(2_000));

        assert!(record.abandoned);
        assert!(!record.submitted);
        assert_eq!(record.ended_at, Some(t(2_000)));
        assert_eq!(record.completion_duration, None);
        assert_eq!(record.tabs["personal"].accumulated_time, 2_000);
    }

    #[test]
    fn test_terminal_flags_stay_exclusive() {
        let submitted = reduce(&sample_record(), &Event::Submit, t(1_000));
        let after_abandon = reduce(&submitted, &Event::Abandon, t(2_000));
        assert_eq!(after_abandon, submitted);

        let abandoned = reduce(&sample_record(), &Event::Abandon, t(1_000));
        let after_submit = reduce(&abandoned, &Event::Submit, t(2_000));
        assert_eq!(after_submit, abandoned);
    }

    #[test]
    fn test_set_export_reason() {
        let record = reduce(
            &sample_record(),
            &Event::SetExportReason {
                reason: ExportReason::Idle,
            },
            t(0),
        );
        assert_eq!(record.export_reason, ExportReason::Idle);
    }

    #[test]
    fn test_reset_matches_fresh_record() {
        let record = sample_record();
        let record = reduce(&record, &Event::tab_change("personal"), t(0));
        let record = reduce(&record, &Event::tab_change("review"), t(100));
        let record = reduce(&record, &Event::validation_error("email", "Required"), t(200));
        let record = reduce(&record, &Event::Submit, t(300));

        let new_id = SessionId::from("sess-2");
        let reset = reduce(
            &record,
            &Event::Reset {
                session_id: new_id.clone(),
            },
            t(1_000),
        );

        let fresh = SessionRecord::new(
            new_id,
            record.field_ids().map(str::to_string).collect::<Vec<_>>(),
            record.section_ids().map(str::to_string).collect::<Vec<_>>(),
            t(1_000),
        );
        assert_eq!(reset, fresh);
        assert_ne!(reset.session_id, record.session_id);
        assert!(reset.tabs.contains_key("review"));
    }

    #[test]
    fn test_unknown_event_is_noop() {
        let record = sample_record();
        assert_eq!(reduce(&record, &Event::Unknown, t(5)), record);
    }

    #[test]
    fn test_open_session_activates_default_section() {
        let record = open_session(SessionId::from("s"), ["email"], Vec::<String>::new(), t(0));

        assert_eq!(record.active_section(), Some(DEFAULT_SECTION));
        assert_eq!(record.tabs[DEFAULT_SECTION].visit_count, 1);
    }

    #[test]
    fn test_open_session_with_sections_waits_for_host() {
        let record = open_session(SessionId::from("s"), ["email"], ["personal"], t(0));
        assert!(record.active_section().is_none());
    }

    #[test]
    fn test_reduce_all_folds_in_order() {
        let events = [
            (Event::tab_change("personal"), t(0)),
            (Event::tab_change("payment"), t(10)),
            (Event::Submit, t(30)),
        ];
        let record = reduce_all(&sample_record(), events.iter().map(|(e, at)| (e, *at)));

        assert_eq!(record.tabs["personal"].accumulated_time, 10);
        assert_eq!(record.tabs["payment"].accumulated_time, 20);
        assert!(record.submitted);
    }
}
