//! Local wall-clock to offset-qualified timestamp conversion.
//!
//! Schedules express intervals as a calendar date plus `HH:MM` times in a
//! fixed civil zone. [`zoned_timestamp`] turns one such pair into
//! `YYYY-MM-DDTHH:MM:SS±HH:MM`, and [`normalize_intervals`] applies it to
//! every `{date, start, end}` entry under a group key, adding `startLocal` and
//! `endLocal` fields.

use chrono::{Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone};
use chrono_tz::Tz;
use serde_json::{Map, Value};

use gridcast_types::GroupPattern;

const DATE_KEYS: &[&str] = &["date", "day", "d"];
const START_KEYS: &[&str] = &["start", "from", "startTime", "start_time", "begin"];
const END_KEYS: &[&str] = &["end", "to", "endTime", "end_time", "finish"];

/// Field names added to normalized interval entries.
pub const START_FIELD: &str = "startLocal";
pub const END_FIELD: &str = "endLocal";

/// Parse `YYYY-MM-DD` or `DD.MM.YYYY`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d.%m.%Y"))
        .ok()
}

/// Parse `H:MM` or `HH:MM`. `24:00` is returned as midnight with a one-day
/// carry.
pub fn parse_clock(raw: &str) -> Option<(NaiveTime, i64)> {
    let (h, m) = raw.trim().split_once(':')?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    if hour == 24 && minute == 0 {
        return Some((NaiveTime::MIN, 1));
    }
    Some((NaiveTime::from_hms_opt(hour, minute, 0)?, 0))
}

/// Convert a local wall-clock instant in `tz` to an offset-qualified string.
///
/// The wall-clock components are first read as a UTC instant; the zone's
/// offset at that provisional instant is subtracted, and the offset is then
/// recomputed at the corrected instant for the final rendering.
pub fn zoned_timestamp(local: NaiveDateTime, tz: Tz) -> String {
    let provisional = local.and_utc();
    let first = tz
        .offset_from_utc_datetime(&provisional.naive_utc())
        .fix()
        .local_minus_utc();
    let corrected = provisional - Duration::seconds(i64::from(first));
    let offset: FixedOffset = tz.offset_from_utc_datetime(&corrected.naive_utc()).fix();
    offset
        .from_utc_datetime(&corrected.naive_utc())
        .format("%Y-%m-%dT%H:%M:%S%:z")
        .to_string()
}

/// Normalize a textual date and clock time. Returns `None` when either part
/// does not parse.
pub fn normalize_pair(date: &str, time: &str, tz: Tz) -> Option<String> {
    let date = parse_date(date)?;
    let (clock, carry) = parse_clock(time)?;
    let date = date.checked_add_signed(Duration::days(carry))?;
    Some(zoned_timestamp(date.and_time(clock), tz))
}

fn pick<'a>(entry: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| entry.get(*k).and_then(Value::as_str))
}

/// Add `startLocal`/`endLocal` to one interval entry if it has the
/// `{date, start, end}` shape. Anything else is left untouched.
fn normalize_entry(entry: &mut Value, tz: Tz) -> bool {
    let Some(obj) = entry.as_object_mut() else {
        return false;
    };
    let (Some(date), Some(start), Some(end)) = (
        pick(obj, DATE_KEYS),
        pick(obj, START_KEYS),
        pick(obj, END_KEYS),
    ) else {
        return false;
    };
    let (Some(start_at), Some(end_at)) = (
        normalize_pair(date, start, tz),
        normalize_pair(date, end, tz),
    ) else {
        return false;
    };
    obj.insert(START_FIELD.to_string(), Value::String(start_at));
    obj.insert(END_FIELD.to_string(), Value::String(end_at));
    true
}

/// Walk `value` and normalize every array stored under a group key.
///
/// Returns the number of entries that were normalized.
pub fn normalize_intervals(value: &mut Value, pattern: &GroupPattern, tz: Tz) -> usize {
    let mut count = 0;
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if pattern.is_match(key) {
                    if let Value::Array(entries) = child {
                        for entry in entries.iter_mut() {
                            if normalize_entry(entry, tz) {
                                count += 1;
                            }
                        }
                        continue;
                    }
                }
                count += normalize_intervals(child, pattern, tz);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                count += normalize_intervals(item, pattern, tz);
            }
        }
        _ => {}
    }
    count
}
