//! Reversible stack mutations as a closed command set.
//!
//! Every variant is executed immediately and only then registered with the
//! undo history (see [`UndoHistory`](crate::core::undo::UndoHistory)).
//! `apply`/`revert` move detached payloads between the command slot and
//! the model arena instead of cloning them, so replaying
//! `undo; redo; undo; …` always lands on the same two states and node ids
//! survive every round trip.

use std::time::Instant;

use crate::config::PARAM_MERGE_WINDOW;
use crate::entities::attrs::AttrValue;
use crate::entities::item::ItemKind;
use crate::entities::stack::StackCore;
use crate::entities::tree::{DetachedSubtree, NodeId};
use crate::error::{ModelError, ModelResult};

/// One reversible mutation of an effect stack.
#[derive(Debug)]
pub enum StackCommand {
    /// Plant a freshly built item and append it under `parent`.
    AppendEffect {
        parent: NodeId,
        node: NodeId,
        /// Holds the item while it is not part of the model (before the
        /// first apply, and between undo and redo).
        slot: Option<DetachedSubtree<ItemKind>>,
    },
    /// Unplant an item and detach it from the tree.
    RemoveEffect {
        node: NodeId,
        /// Original location, captured on first apply for the revert.
        parent: Option<NodeId>,
        old_row: Option<usize>,
        slot: Option<DetachedSubtree<ItemKind>>,
    },
    /// Reorder a sibling via the suffix-replant move.
    MoveEffect {
        node: NodeId,
        from_row: usize,
        to_row: usize,
    },
    /// Interactive parameter edit; merge-eligible.
    SetParameter {
        node: NodeId,
        param_index: usize,
        name: String,
        old: AttrValue,
        new: AttrValue,
        at: Instant,
    },
    /// Per-item enable toggle.
    SetEnabled {
        node: NodeId,
        enabled: bool,
        was: bool,
    },
}

impl StackCommand {
    pub fn append_effect(parent: NodeId, sub: DetachedSubtree<ItemKind>) -> Self {
        Self::AppendEffect {
            parent,
            node: sub.root_id(),
            slot: Some(sub),
        }
    }

    pub fn remove_effect(node: NodeId) -> Self {
        Self::RemoveEffect {
            node,
            parent: None,
            old_row: None,
            slot: None,
        }
    }

    pub fn move_effect(node: NodeId, from_row: usize, to_row: usize) -> Self {
        Self::MoveEffect {
            node,
            from_row,
            to_row,
        }
    }

    pub fn set_parameter(
        node: NodeId,
        param_index: usize,
        name: impl Into<String>,
        old: AttrValue,
        new: AttrValue,
        at: Instant,
    ) -> Self {
        Self::SetParameter {
            node,
            param_index,
            name: name.into(),
            old,
            new,
            at,
        }
    }

    pub fn set_enabled(node: NodeId, enabled: bool, was: bool) -> Self {
        Self::SetEnabled { node, enabled, was }
    }

    /// The node this command targets.
    pub fn target(&self) -> NodeId {
        match self {
            Self::AppendEffect { node, .. }
            | Self::RemoveEffect { node, .. }
            | Self::MoveEffect { node, .. }
            | Self::SetParameter { node, .. }
            | Self::SetEnabled { node, .. } => *node,
        }
    }

    /// Execute (or re-execute) the mutation.
    pub fn apply(&mut self, core: &mut StackCore) -> ModelResult<()> {
        match self {
            Self::AppendEffect { parent, slot, .. } => {
                let sub = slot.take().ok_or(ModelError::DanglingModelReference)?;
                core.append_planted(*parent, sub)?;
                Ok(())
            }
            Self::RemoveEffect {
                node,
                parent,
                old_row,
                slot,
            } => {
                let (row, old_parent, sub) = core.remove_unplanted(*node)?;
                *parent = Some(old_parent);
                *old_row = Some(row);
                *slot = Some(sub);
                Ok(())
            }
            Self::MoveEffect { node, to_row, .. } => core.move_effect_rows(*to_row, *node),
            Self::SetParameter {
                node, name, new, ..
            } => core.write_param(*node, name, new.clone()),
            Self::SetEnabled { node, enabled, .. } => core.set_item_enabled(*node, *enabled),
        }
    }

    /// Undo the mutation, restoring ids, order and payload exactly.
    pub fn revert(&mut self, core: &mut StackCore) -> ModelResult<()> {
        match self {
            Self::AppendEffect { node, slot, .. } => {
                let (_, _, sub) = core.remove_unplanted(*node)?;
                *slot = Some(sub);
                Ok(())
            }
            Self::RemoveEffect {
                node,
                parent,
                old_row,
                slot,
            } => {
                let sub = slot.take().ok_or(ModelError::DanglingModelReference)?;
                let parent = parent.ok_or(ModelError::DanglingModelReference)?;
                let row = old_row.ok_or(ModelError::DanglingModelReference)?;
                core.append_planted(parent, sub)?;
                // replanting appends at the tail; walk it back to where it was
                let last = core.tree().child_count(parent).saturating_sub(1);
                if row != last {
                    core.move_effect_rows(row, *node)?;
                }
                Ok(())
            }
            Self::MoveEffect { node, from_row, .. } => core.move_effect_rows(*from_row, *node),
            Self::SetParameter {
                node, name, old, ..
            } => core.write_param(*node, name, old.clone()),
            Self::SetEnabled { node, was, .. } => core.set_item_enabled(*node, *was),
        }
    }

    /// Collapse `other` into `self` if both edit the same parameter of the
    /// same node within the merge window. On success `self` keeps its
    /// original `old` value and takes `other`'s `new` value and timestamp;
    /// the caller discards `other`.
    pub fn try_merge(&mut self, other: &StackCommand) -> bool {
        let Self::SetParameter {
            node,
            param_index,
            new,
            at,
            ..
        } = self
        else {
            return false;
        };
        let Self::SetParameter {
            node: other_node,
            param_index: other_index,
            new: other_new,
            at: other_at,
            ..
        } = other
        else {
            return false;
        };
        if *node != *other_node || *param_index != *other_index {
            return false;
        }
        if other_at.duration_since(*at) > PARAM_MERGE_WINDOW {
            return false;
        }
        *new = other_new.clone();
        *at = *other_at;
        true
    }
}
