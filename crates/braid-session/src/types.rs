//! Records persisted by the turn store and values produced by the graph engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A conversation shell. Its turns are reconstructed by walking parent links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub name: String,
    pub model: String,
}

/// One persisted prompt/response exchange; a node in the conversation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub conversation_id: String,
    pub parent_id: Option<String>,
    /// False only for rows written before parent tracking existed.
    pub parent_tracked: bool,
    pub created_at: DateTime<Utc>,
    /// Insertion sequence assigned by the store; breaks `created_at` ties.
    pub sequence: i64,
    pub model: String,
    pub prompt: String,
    pub system: Option<String>,
    pub response: String,
    #[serde(default)]
    pub options: Map<String, Value>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub duration_ms: Option<u64>,
}

impl Turn {
    /// Returns true when a missing parent must be derived from time order.
    pub fn needs_legacy_parent(&self) -> bool {
        self.parent_id.is_none() && !self.parent_tracked
    }

    pub(crate) fn chronological_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.sequence)
    }
}

/// Turn data handed over by the model-invocation engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTurn {
    /// Existing conversation to continue; a new one is created when absent.
    pub conversation_id: Option<String>,
    /// Display name for a newly created conversation; derived from the prompt
    /// when absent.
    pub conversation_name: Option<String>,
    pub model: String,
    pub prompt: String,
    pub system: Option<String>,
    pub response: String,
    pub options: Map<String, Value>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub duration_ms: Option<u64>,
    /// Overrides the store-assigned timestamp; used by imports and tests.
    pub created_at: Option<DateTime<Utc>>,
}

/// A conversation together with its reconstructed root-to-head turn chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedConversation {
    pub conversation: Conversation,
    pub turns: Vec<Turn>,
}

impl LoadedConversation {
    pub fn turn_ids(&self) -> Vec<&str> {
        self.turns.iter().map(|turn| turn.id.as_str()).collect()
    }
}

/// Listing row for one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub name: String,
    pub model: String,
    pub turn_count: usize,
    pub last_active: Option<DateTime<Utc>>,
}

/// Sort key accepted by `list_conversations`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationSort {
    #[default]
    Recency,
    TurnCount,
}

/// Outcome of a parent-link backfill pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub conversations: usize,
    pub turns_scanned: usize,
    pub turns_linked: usize,
}
