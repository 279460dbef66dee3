//! Terminal rendering for head, conversation and listing output.

use std::collections::HashMap;

use braid_core::preview_text;
use braid_session::{ConversationSummary, LoadedConversation, Turn};

const HEAD_MARKER: &str = "→";
const PREVIEW_CHARS: usize = 72;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ThemeRole {
    Heading,
    Exchange,
    Label,
    Marker,
    Muted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ThemePalette {
    pub heading: &'static str,
    pub exchange: &'static str,
    pub label: &'static str,
    pub marker: &'static str,
    pub muted: &'static str,
}

impl Default for ThemePalette {
    fn default() -> Self {
        Self {
            heading: "1;32",
            exchange: "1;34",
            label: "33",
            marker: "36",
            muted: "90",
        }
    }
}

impl ThemePalette {
    fn color_code(&self, role: ThemeRole) -> &str {
        match role {
            ThemeRole::Heading => self.heading,
            ThemeRole::Exchange => self.exchange,
            ThemeRole::Label => self.label,
            ThemeRole::Marker => self.marker,
            ThemeRole::Muted => self.muted,
        }
    }
}

/// ANSI styling; a disabled theme passes text through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Theme {
    enabled: bool,
    palette: ThemePalette,
}

impl Theme {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            palette: ThemePalette::default(),
        }
    }

    pub(crate) fn paint(&self, role: ThemeRole, text: &str) -> String {
        if !self.enabled || text.is_empty() {
            return text.to_string();
        }
        let color = self.palette.color_code(role);
        format!("\x1b[{color}m{text}\x1b[0m")
    }
}

pub(crate) fn format_head_turn(turn: &Turn, theme: &Theme) -> String {
    [
        theme.paint(
            ThemeRole::Heading,
            &format!("Current head is at response {}", turn.id),
        ),
        String::new(),
        theme.paint(ThemeRole::Label, "Prompt:"),
        turn.prompt.clone(),
        String::new(),
        theme.paint(ThemeRole::Label, "Response:"),
        turn.response.clone(),
    ]
    .join("\n")
}

/// A status line followed by a one-line preview of the turn's prompt.
pub(crate) fn format_head_move(message: &str, turn: &Turn, theme: &Theme) -> String {
    format!(
        "{}\n{}",
        message,
        theme.paint(
            ThemeRole::Muted,
            &format!("  Prompt: {}", preview_text(&turn.prompt, PREVIEW_CHARS)),
        )
    )
}

/// Renders a reconstructed chain, marking the exchange at `head_id`.
pub(crate) fn format_conversation(
    loaded: &LoadedConversation,
    head_id: Option<&str>,
    theme: &Theme,
) -> String {
    let conversation = &loaded.conversation;
    let mut lines = vec![
        theme.paint(
            ThemeRole::Heading,
            &format!("Conversation: {} ({})", conversation.name, conversation.id),
        ),
        theme.paint(ThemeRole::Heading, &format!("Model: {}", conversation.model)),
        String::new(),
    ];

    for (index, turn) in loaded.turns.iter().enumerate() {
        let prefix = if head_id == Some(turn.id.as_str()) {
            format!("{HEAD_MARKER} ")
        } else {
            String::new()
        };
        lines.push(theme.paint(
            ThemeRole::Exchange,
            &format!("{prefix}Exchange {} -- {}", index + 1, turn.id),
        ));
        if let Some(system) = turn.system.as_deref().filter(|system| !system.is_empty()) {
            lines.push(theme.paint(ThemeRole::Label, "System:"));
            lines.push(system.to_string());
            lines.push(String::new());
        }
        lines.push(theme.paint(ThemeRole::Label, "Prompt:"));
        lines.push(turn.prompt.clone());
        lines.push(String::new());
        lines.push(theme.paint(ThemeRole::Label, "Response:"));
        lines.push(turn.response.clone());
        lines.push(String::new());
    }

    while lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines.join("\n")
}

/// Renders listing rows in the given order. `ordinals` maps conversation ids
/// to the numbers accepted by `head print` and `export`.
pub(crate) fn format_conversation_list<'a>(
    rows: impl IntoIterator<Item = &'a ConversationSummary>,
    ordinals: &HashMap<String, usize>,
    head_conversation: Option<&str>,
    theme: &Theme,
) -> String {
    let mut blocks = Vec::new();
    for row in rows {
        let marker = if head_conversation == Some(row.id.as_str()) {
            theme.paint(ThemeRole::Marker, HEAD_MARKER)
        } else {
            " ".to_string()
        };
        let ordinal = ordinals.get(&row.id).copied().unwrap_or_default();
        let last_active = row
            .last_active
            .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "Never".to_string());
        blocks.push(
            [
                format!(
                    "{marker} {}",
                    theme.paint(
                        ThemeRole::Heading,
                        &format!("[{ordinal}] {} -- {}", row.name, row.id)
                    )
                ),
                theme.paint(ThemeRole::Muted, &format!("    Model: {}", row.model)),
                theme.paint(
                    ThemeRole::Muted,
                    &format!(
                        "    Responses: {} | Last active: {last_active}",
                        row.turn_count
                    ),
                ),
            ]
            .join("\n"),
        );
    }
    blocks.join("\n\n")
}
