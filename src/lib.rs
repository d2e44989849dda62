//! EDITA - non-linear video editor core library
//!
//! The model half of the editor: an observable effect-stack tree with
//! stable ids, undo/redo and ordered render-graph synchronization. UI and
//! frame processing live elsewhere; this crate owns the bookkeeping that
//! keeps them honest.

// Core engine (signals, undo, render service)
pub mod core;

// Model modules
pub mod config;
pub mod entities;
pub mod error;

// Re-export commonly used types from core
pub use core::event_bus::{SignalBus, StackSignal};
pub use core::service::{MemoryService, ServiceHandle};
pub use core::undo::UndoHistory;

// Re-export entities
pub use entities::{
    AttrValue, Attrs, EffectItem, EffectKind, EffectStack, FilterInstance, GroupItem, ItemKind,
    NodeId, RenderService, StackCommand, TreeModel, TreeNode, TreePath,
};
pub use error::{ModelError, ModelResult};
