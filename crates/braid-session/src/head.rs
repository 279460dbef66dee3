//! The single head pointer: which turn is currently active.

use tracing::{info, warn};

use crate::{BraidError, BraidResult, ConversationGraph, Turn, TurnStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadState {
    Unset,
    At(String),
}

/// State machine over the store's head pointer.
#[derive(Debug)]
pub struct HeadController<'a, S: TurnStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: TurnStore + ?Sized> HeadController<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn state(&self) -> BraidResult<HeadState> {
        Ok(match self.store.get_head()? {
            Some(turn_id) => HeadState::At(turn_id),
            None => HeadState::Unset,
        })
    }

    /// Advances the head to a freshly persisted turn.
    pub fn on_turn_logged(&self, turn_id: &str) -> BraidResult<()> {
        self.store.set_head(turn_id)?;
        info!(head = turn_id, "head advanced to new turn");
        Ok(())
    }

    /// Moves the head to an existing turn.
    pub fn set(&self, turn_id: &str) -> BraidResult<Turn> {
        let turn = self.store.get_turn(turn_id)?;
        self.store.set_head(&turn.id)?;
        info!(head = %turn.id, "head set");
        Ok(turn)
    }

    /// Moves the head to the parent of the current head turn and returns the
    /// new head id.
    pub fn back(&self) -> BraidResult<String> {
        let head_id = self.store.get_head()?.ok_or(BraidError::HeadUnset)?;
        let current = self
            .store
            .find_turn(&head_id)?
            .ok_or_else(|| BraidError::NotFound {
                kind: "Current head response",
                id: head_id.clone(),
            })?;
        let parent_id = ConversationGraph::new(self.store)
            .parent_of(&current)?
            .ok_or_else(|| BraidError::NoParent(head_id.clone()))?;
        self.store.set_head(&parent_id)?;
        info!(from = %head_id, head = %parent_id, "head moved back");
        Ok(parent_id)
    }

    /// Returns the head turn, or `None` when no head is set. A head naming a
    /// turn that no longer exists is reported as unset.
    pub fn show(&self) -> BraidResult<Option<Turn>> {
        let Some(head_id) = self.store.get_head()? else {
            return Ok(None);
        };
        let turn = self.store.find_turn(&head_id)?;
        if turn.is_none() {
            warn!(head = %head_id, "head points at a missing turn");
        }
        Ok(turn)
    }

    /// Temporarily moves the head to `turn_id`. The previous head (or its
    /// absence) is restored when the guard is restored or dropped.
    pub fn override_to(&self, turn_id: &str) -> BraidResult<HeadOverride<'a, S>> {
        let target = self.store.get_turn(turn_id)?;
        let original = self.store.get_head()?;
        self.store.set_head(&target.id)?;
        Ok(HeadOverride {
            store: self.store,
            original,
            restored: false,
        })
    }

    /// Runs `read` with the head at `turn_id`, restoring the previous head on
    /// every exit path.
    pub fn with_override<T>(
        &self,
        turn_id: &str,
        read: impl FnOnce(&Self) -> BraidResult<T>,
    ) -> BraidResult<T> {
        let guard = self.override_to(turn_id)?;
        let result = read(self);
        let restored = guard.restore();
        let value = result?;
        restored?;
        Ok(value)
    }

    /// Runs `read` with the head at the newest turn of `conversation_id`.
    pub fn with_conversation_override<T>(
        &self,
        conversation_id: &str,
        read: impl FnOnce(&Self) -> BraidResult<T>,
    ) -> BraidResult<T> {
        let latest = self
            .store
            .latest_turn(conversation_id)?
            .ok_or_else(|| BraidError::EmptyConversation(conversation_id.to_string()))?;
        self.with_override(&latest.id, read)
    }
}

/// Guard restoring the head saved by `HeadController::override_to`.
#[derive(Debug)]
pub struct HeadOverride<'a, S: TurnStore + ?Sized> {
    store: &'a S,
    original: Option<String>,
    restored: bool,
}

impl<S: TurnStore + ?Sized> HeadOverride<'_, S> {
    pub fn original(&self) -> Option<&str> {
        self.original.as_deref()
    }

    /// Restores the saved head, reporting storage failures to the caller.
    pub fn restore(mut self) -> BraidResult<()> {
        self.restored = true;
        restore_head(self.store, self.original.as_deref())
    }
}

impl<S: TurnStore + ?Sized> Drop for HeadOverride<'_, S> {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        if let Err(error) = restore_head(self.store, self.original.as_deref()) {
            warn!(%error, "failed to restore head after temporary override");
        }
    }
}

fn restore_head<S: TurnStore + ?Sized>(store: &S, original: Option<&str>) -> BraidResult<()> {
    match original {
        Some(turn_id) => store.set_head(turn_id),
        None => store.clear_head(),
    }
}
