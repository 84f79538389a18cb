//! Last-resort local persistence of a finalized record

use crate::error::TelemetryError;
use crate::types::SessionRecord;
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// File name offered for a record that could not be sent.
///
/// The timestamp uses the ISO 8601 basic format so the name is valid on every
/// filesystem (no colons).
pub fn download_file_name(at: DateTime<Utc>) -> String {
    format!("form_analytics_{}.json", stamp(at))
}

/// Write the record as pretty JSON into `dir`, creating the directory if needed.
///
/// Never overwrites an existing file.
pub fn persist_locally(dir: &Path, record: &SessionRecord) -> Result<PathBuf, TelemetryError> {
    persist_at(dir, record, Utc::now())
}

fn persist_at(
    dir: &Path,
    record: &SessionRecord,
    at: DateTime<Utc>,
) -> Result<PathBuf, TelemetryError> {
    fs::create_dir_all(dir)?;
    let json = record.to_json_pretty()?;

    let mut attempt = 0u32;
    loop {
        let path = dir.join(candidate_name(record, at, attempt));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(json.as_bytes())?;
                return Ok(path);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Plain download name first, then suffixed with the session id on collision
fn candidate_name(record: &SessionRecord, at: DateTime<Utc>, attempt: u32) -> String {
    let session: String = record.session_id.as_str().chars().take(8).collect();
    match attempt {
        0 => download_file_name(at),
        1 => format!("form_analytics_{}_{}.json", stamp(at), session),
        n => format!("form_analytics_{}_{}-{}.json", stamp(at), session, n),
    }
}

fn stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%S%.3fZ").to_string()
}
