//! Parent resolution, chain reconstruction, conversation loading and backfill.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::{
    BackfillReport, BraidError, BraidResult, ConversationSort, ConversationSummary,
    LoadedConversation, Turn, TurnStore,
};

/// Read and maintenance operations over the parent-linked turn graph.
#[derive(Debug)]
pub struct ConversationGraph<'a, S: TurnStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: TurnStore + ?Sized> ConversationGraph<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Computes the parent of a turn about to be written at `created_at`.
    ///
    /// An explicit parent must exist, belong to the same conversation and be
    /// strictly older than `created_at`. Without one, the newest turn strictly earlier in the conversation is
    /// used, or `None` for the first turn.
    pub fn resolve_new_parent(
        &self,
        conversation_id: &str,
        created_at: DateTime<Utc>,
        explicit_parent: Option<&str>,
    ) -> BraidResult<Option<String>> {
        if let Some(parent_id) = explicit_parent {
            let parent = self.store.get_turn(parent_id)?;
            if parent.conversation_id != conversation_id {
                return Err(BraidError::Validation(format!(
                    "parent {} belongs to conversation {}, not {}",
                    parent.id, parent.conversation_id, conversation_id
                )));
            }
            if parent.created_at >= created_at {
                return Err(BraidError::Validation(format!(
                    "parent {} was created at {}, not before {}",
                    parent.id, parent.created_at, created_at
                )));
            }
            return Ok(Some(parent.id));
        }

        Ok(self
            .store
            .most_recent_turn_before(conversation_id, created_at)?
            .map(|turn| turn.id))
    }

    /// Resolves the parent of a persisted turn: its stored link, or for legacy
    /// rows the newest earlier turn in its conversation.
    pub fn parent_of(&self, turn: &Turn) -> BraidResult<Option<String>> {
        if let Some(parent_id) = &turn.parent_id {
            return Ok(Some(parent_id.clone()));
        }
        if !turn.needs_legacy_parent() {
            return Ok(None);
        }
        Ok(self
            .store
            .most_recent_turn_before(&turn.conversation_id, turn.created_at)?
            .map(|parent| parent.id))
    }

    /// Loads a conversation and reconstructs its active chain.
    ///
    /// Without an id the most recently active conversation is used; `None`
    /// is returned when no turns exist anywhere. The chain starts at the head
    /// when the head belongs to this conversation, else at its newest turn.
    pub fn load_conversation(
        &self,
        conversation_id: Option<&str>,
    ) -> BraidResult<Option<LoadedConversation>> {
        let conversation_id = match conversation_id {
            Some(id) => id.to_string(),
            None => match self.store.most_recently_active_conversation()? {
                Some(id) => id,
                None => return Ok(None),
            },
        };

        let conversation = self
            .store
            .get_conversation(&conversation_id)?
            .ok_or_else(|| BraidError::ConversationNotFound(conversation_id.clone()))?;
        let turns = self.store.turns_in_conversation(&conversation_id)?;
        if turns.is_empty() {
            return Ok(Some(LoadedConversation {
                conversation,
                turns: Vec::new(),
            }));
        }

        let head = self.store.get_head()?;
        let start_id = match head {
            Some(head) if turns.iter().any(|turn| turn.id == head) => head,
            _ => turns
                .iter()
                .max_by_key(|turn| turn.chronological_key())
                .map(|turn| turn.id.clone())
                .unwrap_or_default(),
        };

        let chain = reconstruct_chain(&start_id, &turns)?;
        debug!(
            conversation = %conversation.id,
            start = %start_id,
            chain_len = chain.len(),
            total_turns = turns.len(),
            "reconstructed conversation chain"
        );
        Ok(Some(LoadedConversation {
            conversation,
            turns: chain,
        }))
    }

    /// Reconstructs the chain ending at `turn_id` within its conversation.
    pub fn chain_to(&self, turn_id: &str) -> BraidResult<LoadedConversation> {
        let turn = self.store.get_turn(turn_id)?;
        let conversation = self
            .store
            .get_conversation(&turn.conversation_id)?
            .ok_or_else(|| BraidError::ConversationNotFound(turn.conversation_id.clone()))?;
        let turns = self.store.turns_in_conversation(&conversation.id)?;
        Ok(LoadedConversation {
            turns: reconstruct_chain(turn_id, &turns)?,
            conversation,
        })
    }

    /// Links every legacy turn to its chronological predecessor.
    ///
    /// Turns that carry a parent, and roots written by the recorder, are never
    /// modified, so repeated runs are no-ops.
    pub fn backfill_parent_links(&self) -> BraidResult<BackfillReport> {
        let mut report = BackfillReport::default();
        for summary in self.store.conversation_summaries()? {
            let mut turns = self.store.turns_in_conversation(&summary.id)?;
            turns.sort_by_key(Turn::chronological_key);
            report.conversations += 1;
            report.turns_scanned += turns.len();

            let mut linked = 0usize;
            for pair in turns.windows(2) {
                let (previous, current) = (&pair[0], &pair[1]);
                if !current.needs_legacy_parent() {
                    continue;
                }
                if self.store.link_parent(&current.id, &previous.id)? {
                    linked += 1;
                }
            }
            info!(
                conversation = %summary.id,
                turns = turns.len(),
                linked,
                "backfilled parent links"
            );
            report.turns_linked += linked;
        }
        Ok(report)
    }

    pub fn list_conversations(&self, sort: ConversationSort) -> BraidResult<Vec<ConversationSummary>> {
        let mut summaries = self.store.conversation_summaries()?;
        match sort {
            ConversationSort::Recency => summaries.sort_by(compare_recency),
            ConversationSort::TurnCount => summaries.sort_by(|left, right| {
                right
                    .turn_count
                    .cmp(&left.turn_count)
                    .then_with(|| compare_recency(left, right))
            }),
        }
        Ok(summaries)
    }

    /// Translates a 1-based listing ordinal (newest-active first) or a literal
    /// conversation id into a conversation id.
    pub fn resolve_identifier(&self, identifier: &str) -> BraidResult<String> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(BraidError::InvalidIdentifier(
                "identifier must not be empty".to_string(),
            ));
        }

        if identifier.chars().all(|ch| ch.is_ascii_digit()) {
            let listing = self.list_conversations(ConversationSort::Recency)?;
            let ordinal = identifier.parse::<usize>().map_err(|_| {
                BraidError::InvalidIdentifier(format!(
                    "conversation number {identifier} is not a valid listing number"
                ))
            })?;
            if ordinal == 0 || ordinal > listing.len() {
                return Err(BraidError::InvalidIdentifier(format!(
                    "conversation number {identifier} is out of range (1-{})",
                    listing.len()
                )));
            }
            return Ok(listing[ordinal - 1].id.clone());
        }

        match self.store.get_conversation(identifier)? {
            Some(conversation) => Ok(conversation.id),
            None => Err(BraidError::ConversationNotFound(identifier.to_string())),
        }
    }
}

/// Walks parent links from `start_id` through `turns` and returns the chain
/// root-first.
///
/// Legacy turns without a tracked parent continue at the newest strictly
/// earlier turn. A walk longer than `turns` fails with `CorruptGraph`.
pub fn reconstruct_chain(start_id: &str, turns: &[Turn]) -> BraidResult<Vec<Turn>> {
    let by_id = turns
        .iter()
        .map(|turn| (turn.id.as_str(), turn))
        .collect::<HashMap<_, _>>();
    let mut chronological = turns.iter().collect::<Vec<_>>();
    chronological.sort_by_key(|turn| turn.chronological_key());

    let mut chain = Vec::new();
    let mut cursor = Some(start_id);
    while let Some(id) = cursor {
        let Some(turn) = by_id.get(id) else {
            break;
        };
        if chain.len() == turns.len() {
            return Err(BraidError::CorruptGraph {
                start: start_id.to_string(),
                visited: chain.len(),
            });
        }
        chain.push((*turn).clone());
        cursor = match turn.parent_id.as_deref() {
            Some(parent_id) => Some(parent_id),
            None if turn.needs_legacy_parent() => {
                legacy_parent(turn, &chronological).map(|parent| parent.id.as_str())
            }
            None => None,
        };
    }

    chain.reverse();
    Ok(chain)
}

fn legacy_parent<'t>(turn: &Turn, chronological: &[&'t Turn]) -> Option<&'t Turn> {
    let earlier = chronological.partition_point(|candidate| candidate.created_at < turn.created_at);
    earlier.checked_sub(1).map(|index| chronological[index])
}

fn compare_recency(left: &ConversationSummary, right: &ConversationSummary) -> Ordering {
    right
        .last_active
        .cmp(&left.last_active)
        .then_with(|| right.id.cmp(&left.id))
}
