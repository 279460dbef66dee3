/// Maximum number of characters kept in a derived conversation name.
pub const CONVERSATION_NAME_LENGTH: usize = 32;

/// Derives a display name for a conversation from its first prompt.
pub fn conversation_name(text: &str) -> String {
    let flattened = text.replace('\n', " ");
    if flattened.chars().count() <= CONVERSATION_NAME_LENGTH {
        return flattened;
    }
    let mut name = flattened
        .chars()
        .take(CONVERSATION_NAME_LENGTH - 1)
        .collect::<String>();
    name.push('…');
    name
}

/// Collapses whitespace and truncates `text` to `max_chars` characters.
pub fn preview_text(text: &str, max_chars: usize) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return "(no text)".to_string();
    }
    if normalized.chars().count() <= max_chars {
        return normalized;
    }
    let mut preview = normalized.chars().take(max_chars).collect::<String>();
    preview.push_str("...");
    preview
}
