//! Foundational low-level utilities shared across braid crates.
//!
//! Provides record id generation, canonical timestamp encoding used by the
//! turn store, and text helpers for conversation names and previews.

pub mod id_utils;
pub mod text_utils;
pub mod time_utils;

pub use id_utils::new_record_id;
pub use text_utils::{conversation_name, preview_text, CONVERSATION_NAME_LENGTH};
pub use time_utils::{next_monotonic_timestamp, now_utc, timestamp_from_db, timestamp_to_db};

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    #[test]
    fn record_ids_are_lowercase_and_sort_by_creation_time() {
        let first = new_record_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = new_record_id();
        assert_eq!(first.len(), 26);
        assert_eq!(first, first.to_ascii_lowercase());
        assert!(first < second);
    }

    #[test]
    fn timestamp_encoding_orders_lexicographically() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let later = earlier + Duration::microseconds(1);
        let earlier_text = timestamp_to_db(earlier);
        let later_text = timestamp_to_db(later);
        assert_eq!(earlier_text, "2024-01-01T10:00:00.000000Z");
        assert!(earlier_text < later_text);
        assert_eq!(timestamp_from_db(&later_text).expect("parse"), later);
    }

    #[test]
    fn timestamp_from_db_accepts_legacy_naive_values() {
        let parsed = timestamp_from_db("2024-01-02T10:00:00.250000").expect("parse legacy");
        assert_eq!(
            parsed,
            Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap() + Duration::milliseconds(250)
        );
        let parsed = timestamp_from_db("2024-01-01T10:00:00Z").expect("parse rfc3339");
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap());
        assert!(timestamp_from_db("yesterday").is_err());
    }

    #[test]
    fn now_utc_round_trips_through_db_encoding() {
        let now = now_utc();
        assert_eq!(timestamp_from_db(&timestamp_to_db(now)).expect("parse"), now);
    }

    #[test]
    fn next_monotonic_timestamp_never_goes_backwards() {
        let newest = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            next_monotonic_timestamp(now, Some(newest)),
            newest + Duration::microseconds(1)
        );
        assert_eq!(next_monotonic_timestamp(newest, Some(now)), newest);
        assert_eq!(next_monotonic_timestamp(now, None), now);
    }

    #[test]
    fn conversation_name_collapses_newlines_and_truncates() {
        assert_eq!(conversation_name("hello\nworld"), "hello world");
        let long = "a".repeat(40);
        let name = conversation_name(&long);
        assert_eq!(name.chars().count(), CONVERSATION_NAME_LENGTH);
        assert!(name.ends_with('…'));
    }

    #[test]
    fn preview_text_normalizes_whitespace() {
        assert_eq!(preview_text("  one\n two   three ", 80), "one two three");
        assert_eq!(preview_text("", 80), "(no text)");
        assert_eq!(preview_text("abcdef", 3), "abc...");
    }
}
