//! Linear undo/redo history for stack commands.
//!
//! Contract: immediate-apply-then-register. The stack executes a command
//! first and hands it over here only after it succeeded, so `push` never
//! runs anything, it just records (and possibly merges) the step.

use crate::config::UNDO_DEPTH;
use crate::entities::command::StackCommand;
use crate::entities::stack::StackCore;
use crate::error::ModelResult;

struct UndoEntry {
    command: StackCommand,
    description: String,
}

/// Undo manager for one stack.
#[derive(Default)]
pub struct UndoHistory {
    entries: Vec<UndoEntry>,
    /// Entries `[0, cursor)` are applied; `[cursor, len)` are undone.
    cursor: usize,
}

impl UndoHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an already-executed command. Any undone tail is dropped;
    /// merge-eligible commands collapse into the entry at the tip.
    pub fn push(&mut self, command: StackCommand, description: impl Into<String>) {
        self.entries.truncate(self.cursor);
        if let Some(last) = self.entries.last_mut() {
            if last.command.try_merge(&command) {
                return;
            }
        }
        self.entries.push(UndoEntry {
            command,
            description: description.into(),
        });
        if self.entries.len() > UNDO_DEPTH {
            let overflow = self.entries.len() - UNDO_DEPTH;
            self.entries.drain(..overflow);
        }
        self.cursor = self.entries.len();
    }

    /// Revert the entry below the cursor. `Ok(false)` when there is
    /// nothing to undo; on error the cursor stays put so the failure is
    /// not silently skipped over.
    pub fn undo(&mut self, core: &mut StackCore) -> ModelResult<bool> {
        if self.cursor == 0 {
            return Ok(false);
        }
        self.entries[self.cursor - 1].command.revert(core)?;
        self.cursor -= 1;
        log::debug!("undo: {}", self.entries[self.cursor].description);
        Ok(true)
    }

    /// Re-apply the entry at the cursor. `Ok(false)` when there is
    /// nothing to redo.
    pub fn redo(&mut self, core: &mut StackCore) -> ModelResult<bool> {
        if self.cursor == self.entries.len() {
            return Ok(false);
        }
        self.entries[self.cursor].command.apply(core)?;
        log::debug!("redo: {}", self.entries[self.cursor].description);
        self.cursor += 1;
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    /// Description of the step `undo` would revert.
    pub fn undo_description(&self) -> Option<&str> {
        self.cursor
            .checked_sub(1)
            .map(|i| self.entries[i].description.as_str())
    }

    /// Description of the step `redo` would re-apply.
    pub fn redo_description(&self) -> Option<&str> {
        self.entries.get(self.cursor).map(|e| e.description.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::service::MemoryService;
    use crate::entities::stack::EffectStack;
    use uuid::Uuid;

    fn stack() -> (EffectStack, std::sync::Arc<std::sync::RwLock<MemoryService>>) {
        let svc = MemoryService::new_ref();
        let stack = EffectStack::new(Uuid::new_v4(), MemoryService::weak(&svc));
        (stack, svc)
    }

    #[test]
    fn test_cursor_walk() {
        let (mut stack, _svc) = stack();
        stack.append_effect("sepia").unwrap();
        stack.append_effect("brightness").unwrap();
        assert_eq!(stack.history().len(), 2);
        assert!(stack.history().can_undo());
        assert!(!stack.history().can_redo());
        assert_eq!(
            stack.history().undo_description(),
            Some("Add effect Brightness")
        );

        assert!(stack.undo().unwrap());
        assert_eq!(stack.row_count(), 1);
        assert!(stack.history().can_redo());
        assert_eq!(
            stack.history().redo_description(),
            Some("Add effect Brightness")
        );

        assert!(stack.redo().unwrap());
        assert_eq!(stack.row_count(), 2);

        assert!(stack.undo().unwrap());
        assert!(stack.undo().unwrap());
        assert!(!stack.undo().unwrap());
        assert_eq!(stack.row_count(), 0);
    }

    #[test]
    fn test_new_step_drops_redo_tail() {
        let (mut stack, _svc) = stack();
        stack.append_effect("sepia").unwrap();
        stack.append_effect("brightness").unwrap();
        stack.undo().unwrap();

        // a fresh step while one entry is undone forks history
        stack.append_effect("gaussian_blur").unwrap();
        assert_eq!(stack.history().len(), 2);
        assert!(!stack.history().can_redo());
        assert_eq!(stack.row_count(), 2);
    }
}
