//! Stack item payloads: the `Effect` | `Group` tagged specialization.
//!
//! An `EffectItem` is one processing unit; it owns the handle that
//! projects it into the render graph. A `GroupItem` is a named composite
//! whose graph footprint is the concatenation of its children's.
//!
//! Enable state is two flags per item (own toggle + stack-wide toggle);
//! the *effective* state additionally cascades through the ancestor
//! chain and is computed by the stack on demand, never cached here.

use std::sync::Arc;

use crate::entities::attrs::{AttrValue, Attrs};
use crate::entities::catalog::EffectKind;
use crate::entities::traits::FilterInstance;

/// Leaf payload: one effect instance.
#[derive(Debug)]
pub struct EffectItem {
    pub name: String,
    pub kind_id: String,
    pub audio: bool,
    pub unique: bool,
    pub favorite: bool,
    pub own_enabled: bool,
    pub stack_enabled: bool,
    /// Render-graph handle; parameters live inside it, shared with the
    /// render side.
    pub filter: Arc<FilterInstance>,
}

impl EffectItem {
    /// Build a fresh instance of a catalog kind with default parameters.
    pub fn from_kind(kind: &EffectKind) -> Self {
        let params = Attrs::from_json(&kind.default_params);
        Self {
            name: kind.name.to_string(),
            kind_id: kind.id.to_string(),
            audio: kind.audio,
            unique: kind.unique,
            favorite: kind.favorite,
            own_enabled: true,
            stack_enabled: true,
            filter: FilterInstance::new(kind.id, params),
        }
    }

    /// Deep copy: independent filter instance, copied parameter values.
    /// The clone carries no graph attachment and no id; both are
    /// assigned when the copy is appended to a stack.
    pub fn clone_detached(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind_id: self.kind_id.clone(),
            audio: self.audio,
            unique: self.unique,
            favorite: self.favorite,
            own_enabled: self.own_enabled,
            stack_enabled: self.stack_enabled,
            filter: FilterInstance::new(self.kind_id.clone(), self.filter.params()),
        }
    }
}

/// Group payload: a named composite.
#[derive(Debug)]
pub struct GroupItem {
    pub name: String,
    pub own_enabled: bool,
    pub stack_enabled: bool,
}

impl GroupItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            own_enabled: true,
            stack_enabled: true,
        }
    }
}

/// Tagged node payload for the effect stack tree.
#[derive(Debug)]
pub enum ItemKind {
    Effect(EffectItem),
    Group(GroupItem),
}

impl ItemKind {
    pub fn is_effect(&self) -> bool {
        matches!(self, ItemKind::Effect(_))
    }

    pub fn is_group(&self) -> bool {
        matches!(self, ItemKind::Group(_))
    }

    pub fn name(&self) -> &str {
        match self {
            ItemKind::Effect(e) => &e.name,
            ItemKind::Group(g) => &g.name,
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        match self {
            ItemKind::Effect(e) => e.name = name.into(),
            ItemKind::Group(g) => g.name = name.into(),
        }
    }

    /// Catalog id; groups have none.
    pub fn kind_id(&self) -> Option<&str> {
        match self {
            ItemKind::Effect(e) => Some(&e.kind_id),
            ItemKind::Group(_) => None,
        }
    }

    /// Render-graph handle; groups project through their children instead.
    pub fn filter(&self) -> Option<&Arc<FilterInstance>> {
        match self {
            ItemKind::Effect(e) => Some(&e.filter),
            ItemKind::Group(_) => None,
        }
    }

    pub fn own_enabled(&self) -> bool {
        match self {
            ItemKind::Effect(e) => e.own_enabled,
            ItemKind::Group(g) => g.own_enabled,
        }
    }

    pub fn set_own_enabled(&mut self, enabled: bool) {
        match self {
            ItemKind::Effect(e) => e.own_enabled = enabled,
            ItemKind::Group(g) => g.own_enabled = enabled,
        }
    }

    pub fn stack_enabled(&self) -> bool {
        match self {
            ItemKind::Effect(e) => e.stack_enabled,
            ItemKind::Group(g) => g.stack_enabled,
        }
    }

    pub fn set_stack_enabled(&mut self, enabled: bool) {
        match self {
            ItemKind::Effect(e) => e.stack_enabled = enabled,
            ItemKind::Group(g) => g.stack_enabled = enabled,
        }
    }

    /// Some kinds forbid more than one instance per stack; groups never do.
    pub fn is_unique(&self) -> bool {
        match self {
            ItemKind::Effect(e) => e.unique,
            ItemKind::Group(_) => false,
        }
    }

    /// Intrinsic audio flag of a leaf. A group's audio state is an OR over
    /// its children and is computed by the stack.
    pub fn intrinsic_audio(&self) -> bool {
        match self {
            ItemKind::Effect(e) => e.audio,
            ItemKind::Group(_) => false,
        }
    }

    pub fn as_effect(&self) -> Option<&EffectItem> {
        match self {
            ItemKind::Effect(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_effect_mut(&mut self) -> Option<&mut EffectItem> {
        match self {
            ItemKind::Effect(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&GroupItem> {
        match self {
            ItemKind::Group(g) => Some(g),
            _ => None,
        }
    }

    /// Ordered field projection for views: [name, kind id, own-enabled].
    pub fn fields(&self) -> Vec<AttrValue> {
        vec![
            AttrValue::Str(self.name().to_string()),
            AttrValue::Str(self.kind_id().unwrap_or("").to_string()),
            AttrValue::Bool(self.own_enabled()),
        ]
    }
}
