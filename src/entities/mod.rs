//! Entities module - the effect stack model and its building blocks.
//!
//! Business logic only; engine infrastructure (signal bus, undo history,
//! the in-memory render service) lives in `core/`. Traits the model needs
//! from the engine side are defined here (`traits`) and implemented there.

pub mod attrs;
pub mod catalog;
pub mod command;
pub mod item;
pub mod stack;
pub mod traits;
pub mod tree;

pub use attrs::{AttrValue, Attrs};
pub use catalog::EffectKind;
pub use command::StackCommand;
pub use item::{EffectItem, GroupItem, ItemKind};
pub use stack::{EffectStack, StackCore};
pub use traits::{FilterInstance, RenderService, ServiceRef, ServiceWeak};
pub use tree::{DetachedSubtree, NodeId, TreeModel, TreeNode, TreePath};
