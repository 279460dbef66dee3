use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, SubsecRound, Utc};

/// Returns the current wall-clock time in UTC, truncated to the microsecond
/// precision the store persists.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Encodes a timestamp with fixed microsecond precision so that string order
/// matches chronological order.
pub fn timestamp_to_db(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decodes a persisted timestamp. Naive values written by older loggers are
/// read as UTC.
pub fn timestamp_from_db(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(parsed) => Ok(parsed.with_timezone(&Utc)),
        Err(rfc3339_error) => NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|_| rfc3339_error),
    }
}

/// Returns `now` unless it does not come strictly after `newest`, in which
/// case the result is one microsecond past `newest`.
pub fn next_monotonic_timestamp(
    now: DateTime<Utc>,
    newest: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    match newest {
        Some(newest) if now <= newest => newest + Duration::microseconds(1),
        _ => now,
    }
}
