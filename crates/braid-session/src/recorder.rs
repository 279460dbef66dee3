//! Write path: derive the parent, persist the turn, advance the head.

use braid_core::{conversation_name, new_record_id, next_monotonic_timestamp, now_utc};
use tracing::info;

use crate::{
    BraidError, BraidResult, Conversation, ConversationGraph, HeadController, NewTurn, Turn,
    TurnStore,
};

#[derive(Debug)]
pub struct TurnRecorder<'a, S: TurnStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: TurnStore + ?Sized> TurnRecorder<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Persists a turn produced by the model engine and moves the head to it.
    ///
    /// With `explicit_parent` the turn branches from that turn (adopting its
    /// conversation when none is given); otherwise it continues after the
    /// newest earlier turn of its conversation. The head only moves once the
    /// turn is stored.
    pub fn record_turn(
        &self,
        new_turn: NewTurn,
        explicit_parent: Option<&str>,
    ) -> BraidResult<Turn> {
        validate_new_turn(&new_turn)?;

        let conversation_id = match (explicit_parent, new_turn.conversation_id.as_deref()) {
            (Some(parent_id), None) => self.store.get_turn(parent_id)?.conversation_id,
            (_, Some(conversation_id)) => conversation_id.to_string(),
            (None, None) => new_record_id(),
        };

        let created_at = match new_turn.created_at {
            Some(created_at) => created_at,
            None => {
                let newest = self
                    .store
                    .latest_turn(&conversation_id)?
                    .map(|turn| turn.created_at);
                next_monotonic_timestamp(now_utc(), newest)
            }
        };

        let parent_id = ConversationGraph::new(self.store).resolve_new_parent(
            &conversation_id,
            created_at,
            explicit_parent,
        )?;

        let name = new_turn.conversation_name.clone().unwrap_or_else(|| {
            let source = if new_turn.prompt.trim().is_empty() {
                new_turn.system.as_deref().unwrap_or_default()
            } else {
                new_turn.prompt.as_str()
            };
            conversation_name(source)
        });
        let conversation = Conversation {
            id: conversation_id.clone(),
            name,
            model: new_turn.model.clone(),
        };
        let turn = Turn {
            id: new_record_id(),
            conversation_id,
            parent_id,
            parent_tracked: true,
            created_at,
            sequence: 0,
            model: new_turn.model,
            prompt: new_turn.prompt,
            system: new_turn.system,
            response: new_turn.response,
            options: new_turn.options,
            input_tokens: new_turn.input_tokens,
            output_tokens: new_turn.output_tokens,
            duration_ms: new_turn.duration_ms,
        };
        let turn = self.store.append_turn(&conversation, &turn)?;
        info!(
            turn = %turn.id,
            conversation = %turn.conversation_id,
            parent = turn.parent_id.as_deref().unwrap_or("none"),
            "recorded turn"
        );

        HeadController::new(self.store).on_turn_logged(&turn.id)?;
        Ok(turn)
    }
}

fn validate_new_turn(new_turn: &NewTurn) -> BraidResult<()> {
    if new_turn.model.trim().is_empty() {
        return Err(BraidError::Validation("model is required".to_string()));
    }
    let has_system = new_turn
        .system
        .as_deref()
        .is_some_and(|system| !system.trim().is_empty());
    if new_turn.prompt.trim().is_empty() && !has_system {
        return Err(BraidError::Validation(
            "a prompt or system prompt is required".to_string(),
        ));
    }
    if matches!(new_turn.conversation_id.as_deref(), Some(id) if id.trim().is_empty()) {
        return Err(BraidError::Validation(
            "conversation_id must not be empty".to_string(),
        ));
    }
    Ok(())
}
