use ulid::Ulid;

/// Returns a new time-sortable record id (a lowercase ULID).
pub fn new_record_id() -> String {
    Ulid::new().to_string().to_ascii_lowercase()
}
