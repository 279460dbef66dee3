//! Turn store contract consumed by the graph engine and head controller.

use chrono::{DateTime, Utc};

use crate::{BraidResult, Conversation, ConversationSummary, Turn};

/// Durable conversations, turns and the single head pointer.
///
/// Operations are synchronous and each one is a single statement against the
/// backing store; callers compose them without spanning transactions.
pub trait TurnStore {
    /// Creates the conversation unless one with the same id already exists.
    fn insert_conversation(&self, conversation: &Conversation) -> BraidResult<()>;
    fn get_conversation(&self, id: &str) -> BraidResult<Option<Conversation>>;

    /// Appends an immutable turn. Fails with `Validation` when its
    /// conversation is unset or unknown.
    fn insert_turn(&self, turn: &Turn) -> BraidResult<Turn>;
    /// Creates the conversation if needed and appends the turn as one atomic
    /// write; on failure neither row is stored.
    fn append_turn(&self, conversation: &Conversation, turn: &Turn) -> BraidResult<Turn>;
    /// Fails with `NotFound` when no turn has this id.
    fn get_turn(&self, id: &str) -> BraidResult<Turn>;
    fn find_turn(&self, id: &str) -> BraidResult<Option<Turn>>;
    /// All turns of a conversation, in no guaranteed order.
    fn turns_in_conversation(&self, conversation_id: &str) -> BraidResult<Vec<Turn>>;
    /// The turn with the greatest `created_at` strictly before `before`,
    /// ties broken by the later insertion sequence.
    fn most_recent_turn_before(
        &self,
        conversation_id: &str,
        before: DateTime<Utc>,
    ) -> BraidResult<Option<Turn>>;
    fn latest_turn(&self, conversation_id: &str) -> BraidResult<Option<Turn>>;
    /// Conversation owning the globally newest turn.
    fn most_recently_active_conversation(&self) -> BraidResult<Option<String>>;
    fn conversation_summaries(&self) -> BraidResult<Vec<ConversationSummary>>;
    /// Sets `parent_id` on a turn that has none. Returns false when the turn
    /// already had a parent, leaving it untouched.
    fn link_parent(&self, turn_id: &str, parent_id: &str) -> BraidResult<bool>;

    fn get_head(&self) -> BraidResult<Option<String>>;
    fn set_head(&self, turn_id: &str) -> BraidResult<()>;
    fn clear_head(&self) -> BraidResult<()>;
}
