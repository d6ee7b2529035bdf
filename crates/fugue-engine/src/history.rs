//! Undo/redo stacks over executed commands.
//!
//! Each successful, reversible top-level command becomes a [`HistoryEntry`]
//! pairing the command (for redo) with its [`UndoToken`] (for undo). The
//! classic law applies: pushing a new entry clears the redo stack, so redo
//! is only valid immediately after an undo with no intervening command.
//!
//! Depth is bounded. When the stack is full, pushing evicts the oldest entry
//! -- its token is dropped and that command becomes permanently
//! irreversible, exactly as if its dependent state had moved on.
//!
//! A failed undo *drops* the entry rather than restoring it: once a command
//! reports [`UndoError::Irreversible`](crate::UndoError::Irreversible) it
//! will never become reversible again, so keeping it around would only let
//! the player grind on a dead entry.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::command::{Command, CommandResult};
use crate::pipeline::{CommandPipeline, UndoToken};
use crate::HistoryError;

// ---------------------------------------------------------------------------
// HistoryEntry
// ---------------------------------------------------------------------------

/// One undoable step: the command that ran and the capture that reverses it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub command: Command,
    pub token: UndoToken,
}

// ---------------------------------------------------------------------------
// CommandHistory
// ---------------------------------------------------------------------------

/// Bounded undo stack plus redo stack. Meta-operations (`undo`, `redo`) are
/// never themselves pushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandHistory {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: Vec<Command>,
    max_depth: usize,
}

impl CommandHistory {
    /// A history holding at most `max_depth` undoable entries.
    ///
    /// # Panics
    ///
    /// Panics if `max_depth` is zero -- a zero-depth history is a
    /// configuration error, not a runtime condition.
    pub fn new(max_depth: usize) -> Self {
        assert!(max_depth > 0, "history depth must be at least 1");
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_depth,
        }
    }

    /// Record a successful top-level execution. Clears the redo stack; at
    /// capacity, evicts the oldest entry (permanently irreversible).
    pub fn push(&mut self, entry: HistoryEntry) {
        if self.undo_stack.len() >= self.max_depth {
            self.undo_stack.pop_front();
        }
        self.undo_stack.push_back(entry);
        self.redo_stack.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Depth of the undo stack.
    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    /// Depth of the redo stack.
    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// Labels of undoable commands, most recent first.
    pub fn undo_labels(&self) -> Vec<&str> {
        self.undo_stack
            .iter()
            .rev()
            .map(|e| e.command.label())
            .collect()
    }

    /// Reverse the most recent entry. On success the entry's command moves
    /// to the redo stack and its label is returned. On failure the entry is
    /// gone -- surfaced, never retried.
    pub fn undo(&mut self, pipeline: &mut CommandPipeline<'_>) -> Result<String, HistoryError> {
        let entry = self
            .undo_stack
            .pop_back()
            .ok_or(HistoryError::NothingToUndo)?;
        let label = entry.command.label().to_owned();
        pipeline.undo(entry.token)?;
        self.redo_stack.push(entry.command);
        Ok(label)
    }

    /// Re-execute the most recently undone command as a fresh execution.
    /// On success the new entry goes back onto the undo stack; the returned
    /// result carries the (token-less) outcome. On precondition failure the
    /// command stays on the redo stack.
    pub fn redo(
        &mut self,
        pipeline: &mut CommandPipeline<'_>,
    ) -> Result<CommandResult, HistoryError> {
        let command = self
            .redo_stack
            .last()
            .cloned()
            .ok_or(HistoryError::NothingToRedo)?;

        let mut result = pipeline.execute(command);
        if !result.success {
            return Err(HistoryError::RedoFailed {
                message: std::mem::take(&mut result.message),
            });
        }

        let command = self
            .redo_stack
            .pop()
            .expect("redo stack checked non-empty above");
        if let Some(token) = result.undo_token.take() {
            // Push directly: a redo must not clear the rest of the redo stack.
            if self.undo_stack.len() >= self.max_depth {
                self.undo_stack.pop_front();
            }
            self.undo_stack.push_back(HistoryEntry { command, token });
        }
        Ok(result)
    }

    // -- snapshot -----------------------------------------------------------

    /// Capture both stacks. Everything inside is plain data.
    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            undo: self.undo_stack.iter().cloned().collect(),
            redo: self.redo_stack.clone(),
            max_depth: self.max_depth,
        }
    }

    /// Rebuild from a snapshot.
    pub fn from_snapshot(snapshot: HistorySnapshot) -> Self {
        Self {
            undo_stack: snapshot.undo.into(),
            redo_stack: snapshot.redo,
            max_depth: snapshot.max_depth,
        }
    }
}

// ---------------------------------------------------------------------------
// HistorySnapshot
// ---------------------------------------------------------------------------

/// Serializable history state: entries oldest-first, redo stack, depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    undo: Vec<HistoryEntry>,
    redo: Vec<Command>,
    max_depth: usize,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
