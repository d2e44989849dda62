//! Model-wide constants.

use std::time::Duration;

/// Interactive parameter edits on the same (node, parameter) closer than
/// this window collapse into a single undo step (slider drags).
pub const PARAM_MERGE_WINDOW: Duration = Duration::from_secs(3);

/// Undo history depth; oldest entries are dropped past this.
pub const UNDO_DEPTH: usize = 200;

/// Name of the invisible root group of every stack.
pub const ROOT_NAME: &str = "root";

/// Filter property carrying the derived disabled state ("1" = bypassed).
pub const PROP_DISABLE: &str = "disable";
