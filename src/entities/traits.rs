//! Abstract traits for dependency inversion.
//!
//! `entities` defines the interfaces it needs from the engine side, so the
//! model never depends on a concrete render backend. Implementations live
//! in `core/` (see [`MemoryService`](crate::core::service::MemoryService)).

use std::sync::{Arc, RwLock, Weak};

use crate::config::PROP_DISABLE;
use crate::entities::attrs::{AttrValue, Attrs};
use crate::error::ModelResult;

/// One processing unit attached to a render service.
///
/// The model and the render side share the same instance: the effect item
/// holds it as its graph handle, the service keeps it in its ordered
/// attach list. Properties are interior-mutable so a parameter edit is
/// visible to a renderer without re-attaching.
#[derive(Debug)]
pub struct FilterInstance {
    kind_id: String,
    props: RwLock<Attrs>,
}

impl FilterInstance {
    pub fn new(kind_id: impl Into<String>, params: Attrs) -> Arc<Self> {
        Arc::new(Self {
            kind_id: kind_id.into(),
            props: RwLock::new(params),
        })
    }

    pub fn kind_id(&self) -> &str {
        &self.kind_id
    }

    /// Snapshot of the current parameter set.
    pub fn params(&self) -> Attrs {
        self.props.read().expect("filter props lock").clone()
    }

    pub fn get(&self, key: &str) -> Option<AttrValue> {
        self.props.read().expect("filter props lock").get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: AttrValue) {
        self.props.write().expect("filter props lock").set(key, value);
    }

    /// Position of a parameter in the ordered parameter set.
    pub fn param_index_of(&self, key: &str) -> Option<usize> {
        self.props.read().expect("filter props lock").index_of(key)
    }

    /// Derived bypass state, written by the enable cascade and read by the
    /// renderer.
    pub fn set_disabled(&self, disabled: bool) {
        self.set(PROP_DISABLE, AttrValue::Int(if disabled { 1 } else { 0 }));
    }

    pub fn is_disabled(&self) -> bool {
        self.props
            .read()
            .expect("filter props lock")
            .get_int(PROP_DISABLE)
            .unwrap_or(0)
            == 1
    }
}

/// Ordered external render graph.
///
/// The capability set is deliberately small: attach appends at the tail,
/// detach removes wherever the filter currently sits. There is no
/// positional insert, which is what forces the suffix-replant move in
/// [`EffectStack::move_effect`](crate::entities::stack::EffectStack::move_effect).
pub trait RenderService: Send + Sync {
    /// Append a filter at the tail of the processing order.
    fn attach(&mut self, filter: Arc<FilterInstance>) -> ModelResult<()>;

    /// Remove a filter from wherever it is attached.
    fn detach(&mut self, filter: &FilterInstance) -> ModelResult<()>;

    fn filter_count(&self) -> usize;

    /// Snapshot of the current attach order (consistency checks, render
    /// worker hand-off).
    fn attached(&self) -> Vec<Arc<FilterInstance>>;
}

/// Shared handle to a render service. Mutations on the stack take the
/// write half for the whole plant/unplant sequence; a render worker reads
/// under the shared half and never observes a torn attach order.
pub type ServiceRef = Arc<RwLock<dyn RenderService>>;

/// Non-owning handle kept by the stack; an expired weak surfaces as
/// [`ModelError::ServiceUnavailable`](crate::error::ModelError::ServiceUnavailable).
pub type ServiceWeak = Weak<RwLock<dyn RenderService>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_props_shared() {
        let filter = FilterInstance::new("sepia", Attrs::new());
        let render_side = Arc::clone(&filter);

        filter.set("u", AttrValue::Int(75));
        assert_eq!(render_side.get("u"), Some(AttrValue::Int(75)));

        filter.set_disabled(true);
        assert!(render_side.is_disabled());
        filter.set_disabled(false);
        assert!(!render_side.is_disabled());
    }
}
