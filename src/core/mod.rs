//! Core engine modules - signals, undo history, render service.
//!
//! Infrastructure the model plugs into, independent of any UI.

pub mod event_bus;
pub mod service;
pub mod undo;

// Re-exports for convenience
pub use event_bus::{SignalBus, StackSignal};
pub use service::{MemoryService, ServiceHandle};
pub use undo::UndoHistory;
