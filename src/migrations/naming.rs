// SPDX-License-Identifier: Apache-2.0

//! Migration versions, names and ordering.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, NaiveDateTime, Timelike, Utc};
use gate_sql::{ClassifiedStatement, StatementBatch};
use parking_lot::Mutex;

const VERSION_FORMAT: &str = "%Y%m%d%H%M%S";
const MAX_NAME_LEN: usize = 100;
const FALLBACK_NAME: &str = "migration";

/// Hands out `YYYYMMDDHHMMSS` versions that never repeat within a process.
#[derive(Debug, Default)]
pub struct VersionClock {
    last: Mutex<Option<NaiveDateTime>>,
}

impl VersionClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> String {
        self.next_at(Utc::now())
    }

    /// Version for `now`, bumped one second past the previous one if needed.
    pub fn next_at(&self, now: DateTime<Utc>) -> String {
        let now = now.naive_utc();
        let now = now.with_nanosecond(0).unwrap_or(now);
        let mut last = self.last.lock();
        let version = match *last {
            Some(previous) if now <= previous => previous + Duration::seconds(1),
            _ => now,
        };
        *last = Some(version);
        version.format(VERSION_FORMAT).to_string()
    }
}

/// Lower-case `[a-z0-9_]`, single underscores, at most 100 characters.
pub fn sanitize_name(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    for c in raw.trim().to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            name.push(c);
        } else if !name.is_empty() && !name.ends_with('_') {
            name.push('_');
        }
    }
    let mut name: String = name.chars().take(MAX_NAME_LEN).collect();
    while name.ends_with('_') {
        name.pop();
    }
    name
}

/// The caller's name if it survives sanitising, else one derived from the
/// batch.
pub fn migration_name(batch: &StatementBatch, requested: Option<&str>) -> String {
    if let Some(name) = requested.map(sanitize_name).filter(|n| !n.is_empty()) {
        return name;
    }
    let derived = batch.dominant().map(descriptive_name).unwrap_or_default();
    if derived.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        derived
    }
}

/// `<command>_<object kind>_<object>`; non-public schemas are kept.
fn descriptive_name(statement: &ClassifiedStatement) -> String {
    let mut parts = vec![statement.command.verb().to_string()];
    if let Some(object) = &statement.object {
        if let Some(kind) = &object.kind {
            parts.push(kind.clone());
        }
        match object.schema.as_deref() {
            Some(schema) if !schema.eq_ignore_ascii_case("public") => parts.push(schema.to_string()),
            _ => {}
        }
        parts.push(object.name.clone());
    }
    sanitize_name(&parts.join("_"))
}

/// Version-descending order: numeric versions first, compared by value,
/// then the rest compared lexically.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let numeric = |v: &str| !v.is_empty() && v.bytes().all(|c| c.is_ascii_digit());
    match (numeric(a), numeric(b)) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (true, true) => {
            let (a, b) = (a.trim_start_matches('0'), b.trim_start_matches('0'));
            b.len().cmp(&a.len()).then_with(|| b.cmp(a))
        }
        (false, false) => b.cmp(a),
    }
}
