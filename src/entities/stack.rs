//! The effect stack: a root-Group tree of effects applied, in order, to
//! one timeline object.
//!
//! Three representations stay synchronized through every mutation:
//! - the logical tree (order = application order),
//! - the id registry (the tree arena itself),
//! - the ordered attach list of each connected render service.
//!
//! Graph sync piggybacks on attachment: planting happens when an item
//! enters the model, unplanting when it leaves. Because the graph can
//! only append, reordering replants the affected tail (see
//! [`move_effect`](EffectStack::move_effect)).
//!
//! Mutations run synchronously on the caller's thread and hold every
//! service's write lock for their full duration, so a render worker
//! reading under the shared lock never observes a torn attach order.

use std::sync::{Arc, RwLockWriteGuard};
use std::time::Instant;

use uuid::Uuid;

use crate::config::ROOT_NAME;
use crate::core::event_bus::SignalBus;
use crate::core::undo::UndoHistory;
use crate::entities::attrs::AttrValue;
use crate::entities::catalog;
use crate::entities::command::StackCommand;
use crate::entities::item::{EffectItem, GroupItem, ItemKind};
use crate::entities::traits::{FilterInstance, RenderService, ServiceRef, ServiceWeak};
use crate::entities::tree::{DetachedSubtree, NodeId, TreeModel, TreeNode};
use crate::error::{ModelError, ModelResult};

/// Mutable substrate the undo commands operate on: the tree, the service
/// handles and the stack-wide enable flag. Kept separate from the undo
/// history so a command can borrow it while the history drives replay.
pub struct StackCore {
    tree: TreeModel<ItemKind>,
    services: Vec<ServiceWeak>,
    stack_enabled: bool,
    owner: Uuid,
}

impl StackCore {
    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    pub fn tree(&self) -> &TreeModel<ItemKind> {
        &self.tree
    }

    pub fn owner(&self) -> Uuid {
        self.owner
    }

    pub fn stack_enabled(&self) -> bool {
        self.stack_enabled
    }

    /// Effective enabled state: own toggle AND stack toggle AND the whole
    /// ancestor chain. Recomputed on every call; stacks are shallow.
    pub fn is_enabled(&self, node: NodeId) -> bool {
        let Some(n) = self.tree.get(node) else {
            return false;
        };
        let own = n.data.own_enabled() && n.data.stack_enabled();
        match n.parent() {
            Some(parent) => own && self.is_enabled(parent),
            None => own,
        }
    }

    /// Leaf: intrinsic kind flag. Group: OR over children, recomputed on
    /// every call.
    pub fn is_audio(&self, node: NodeId) -> bool {
        let Some(n) = self.tree.get(node) else {
            return false;
        };
        match &n.data {
            ItemKind::Effect(e) => e.audio,
            ItemKind::Group(_) => n.children().iter().any(|&c| self.is_audio(c)),
        }
    }

    pub fn has_kind(&self, kind_id: &str) -> bool {
        let mut found = false;
        self.tree.visit_subtree(self.root(), &mut |n| {
            if n.data.kind_id() == Some(kind_id) {
                found = true;
            }
        });
        found
    }

    fn upgrade_services(&self) -> ModelResult<Vec<ServiceRef>> {
        let mut out = Vec::with_capacity(self.services.len());
        for weak in &self.services {
            match weak.upgrade() {
                Some(svc) => out.push(svc),
                None => {
                    log::error!("stack {}: render service is gone", self.owner);
                    return Err(ModelError::ServiceUnavailable);
                }
            }
        }
        Ok(out)
    }

    fn write_guards<'a>(
        services: &'a [ServiceRef],
    ) -> Vec<RwLockWriteGuard<'a, dyn RenderService + 'static>> {
        services
            .iter()
            .map(|s| s.write().expect("render service lock"))
            .collect()
    }

    /// Filter handles of the given nodes' leaves, pre-order, in the order
    /// the nodes are listed. Groups contribute their children's handles.
    fn filters_of(&self, ids: &[NodeId]) -> Vec<Arc<FilterInstance>> {
        let mut out = Vec::new();
        for &id in ids {
            self.tree.visit_subtree(id, &mut |n| {
                if n.is_leaf() {
                    if let Some(filter) = n.data.filter() {
                        out.push(Arc::clone(filter));
                    }
                }
            });
        }
        out
    }

    fn filters_of_detached(sub: &DetachedSubtree<ItemKind>) -> Vec<Arc<FilterInstance>> {
        sub.nodes()
            .iter()
            .filter(|n| n.is_leaf())
            .filter_map(|n| n.data.filter().cloned())
            .collect()
    }

    /// Plant a detached subtree's leaves (append position) and attach it
    /// under `parent`. Validation happens before any service is touched.
    pub(crate) fn append_planted(
        &mut self,
        parent: NodeId,
        sub: DetachedSubtree<ItemKind>,
    ) -> ModelResult<NodeId> {
        if !self.tree.contains(parent) {
            return Err(ModelError::NotFound(parent));
        }
        if self.tree.contains(sub.root_id()) {
            return Err(ModelError::AlreadyParented(sub.root_id()));
        }
        let services = self.upgrade_services()?;
        let mut guards = Self::write_guards(&services);
        let filters = Self::filters_of_detached(&sub);
        for guard in guards.iter_mut() {
            for filter in &filters {
                guard.attach(Arc::clone(filter))?;
            }
        }
        let id = self.tree.attach_subtree(parent, sub)?;
        self.refresh_disabled(id);
        Ok(id)
    }

    /// Unplant a subtree's leaves and detach it from the tree. Returns the
    /// original (row, parent) so the caller can restore the exact slot.
    pub(crate) fn remove_unplanted(
        &mut self,
        node: NodeId,
    ) -> ModelResult<(usize, NodeId, DetachedSubtree<ItemKind>)> {
        let n = self.tree.get(node).ok_or(ModelError::NotFound(node))?;
        let parent = n.parent().ok_or_else(|| {
            ModelError::InvalidArgument("the root cannot be removed".into())
        })?;
        let row = self.tree.row(node).ok_or(ModelError::DanglingModelReference)?;
        let filters = self.filters_of(&[node]);
        let services = self.upgrade_services()?;
        let mut guards = Self::write_guards(&services);
        for gi in 0..guards.len() {
            for filter in &filters {
                if let Err(err) = guards[gi].detach(filter) {
                    log::error!(
                        "stack {}: unplant failed during remove, rolling back: {err}",
                        self.owner
                    );
                    self.rebuild_graphs(&mut guards);
                    return Err(err);
                }
            }
        }
        let sub = self.tree.detach_subtree(node)?;
        Ok((row, parent, sub))
    }

    /// Suffix-replant move. The graph only appends, so the affected set is
    /// the moved node plus every sibling at row >= `dest_row`; leading
    /// siblings keep their graph slots untouched.
    pub(crate) fn move_effect_rows(&mut self, dest_row: usize, node: NodeId) -> ModelResult<()> {
        let parent = self
            .tree
            .get(node)
            .ok_or(ModelError::NotFound(node))?
            .parent()
            .ok_or_else(|| ModelError::InvalidArgument("the root cannot be moved".into()))?;
        let siblings = self.tree.children(parent).to_vec();
        let count = siblings.len();
        if dest_row > count {
            return Err(ModelError::InvalidArgument(format!(
                "move row {dest_row} out of range 0..={count}"
            )));
        }
        let old_row = self.tree.row(node).ok_or(ModelError::DanglingModelReference)?;
        if dest_row.min(count - 1) == old_row {
            return Ok(());
        }

        let mut affected = vec![node];
        for &sib in &siblings[dest_row.min(count)..] {
            if sib != node {
                affected.push(sib);
            }
        }
        let mut by_old_row = affected.clone();
        by_old_row.sort_by_key(|&id| self.tree.row(id).unwrap_or(usize::MAX));
        let old_order = self.filters_of(&by_old_row);

        let services = self.upgrade_services()?;
        let mut guards = Self::write_guards(&services);

        // 1. unplant the affected tail
        for gi in 0..guards.len() {
            for filter in &old_order {
                if let Err(err) = guards[gi].detach(filter) {
                    log::error!(
                        "stack {}: unplant failed during move, rolling back: {err}",
                        self.owner
                    );
                    self.rebuild_graphs(&mut guards);
                    return Err(err);
                }
            }
        }
        // 2. structural move
        self.tree.move_child(parent, dest_row, node)?;
        // 3. replant the affected set in its new sibling order
        let mut by_new_row = affected;
        by_new_row.sort_by_key(|&id| self.tree.row(id).unwrap_or(usize::MAX));
        let new_order = self.filters_of(&by_new_row);
        for gi in 0..guards.len() {
            for filter in &new_order {
                if let Err(err) = guards[gi].attach(Arc::clone(filter)) {
                    log::error!(
                        "stack {}: replant failed during move, rolling back: {err}",
                        self.owner
                    );
                    let _ = self.tree.move_child(parent, old_row, node);
                    self.rebuild_graphs(&mut guards);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Last-resort graph resync: clear each service and reattach every
    /// leaf in tree order. Only reached when a service rejected a step in
    /// the middle of a multi-step sync.
    fn rebuild_graphs(&self, guards: &mut [RwLockWriteGuard<'_, dyn RenderService + 'static>]) {
        let filters = self.filters_of(&[self.root()]);
        for guard in guards.iter_mut() {
            for attached in guard.attached() {
                let _ = guard.detach(&attached);
            }
            for filter in &filters {
                let _ = guard.attach(Arc::clone(filter));
            }
        }
    }

    /// Write one filter parameter and announce the field change.
    pub(crate) fn write_param(&self, node: NodeId, name: &str, value: AttrValue) -> ModelResult<()> {
        let n = self.tree.get(node).ok_or(ModelError::NotFound(node))?;
        let filter = n.data.filter().ok_or_else(|| {
            ModelError::InvalidArgument(format!("node {node} has no parameters"))
        })?;
        filter.set(name, value);
        self.tree.notify_fields_changed(node, vec![name.to_string()])
    }

    /// Flip one item's own toggle and push the derived bypass state into
    /// every leaf of its subtree.
    pub(crate) fn set_item_enabled(&mut self, node: NodeId, enabled: bool) -> ModelResult<()> {
        self.tree
            .get_mut(node)
            .ok_or(ModelError::NotFound(node))?
            .data
            .set_own_enabled(enabled);
        self.refresh_disabled(node);
        self.tree.notify_fields_changed(node, vec!["enabled".into()])
    }

    /// Stack-wide toggle: flag first, children next, own projection last.
    fn cascade_stack_enabled(&mut self, node: NodeId, enabled: bool) {
        if let Some(n) = self.tree.get_mut(node) {
            n.data.set_stack_enabled(enabled);
        }
        for child in self.tree.children(node).to_vec() {
            self.cascade_stack_enabled(child, enabled);
        }
        if let Some(n) = self.tree.get(node) {
            if let Some(filter) = n.data.filter() {
                filter.set_disabled(!self.is_enabled(node));
            }
        }
        let _ = self.tree.notify_fields_changed(node, vec!["enabled".into()]);
    }

    fn refresh_disabled(&self, node: NodeId) {
        for leaf in self.tree.leaves(node) {
            if let Some(filter) = self.tree.get(leaf).and_then(|n| n.data.filter()) {
                filter.set_disabled(!self.is_enabled(leaf));
            }
        }
    }
}

/// The undo-capable stack model handed to views and the timeline.
pub struct EffectStack {
    core: StackCore,
    history: UndoHistory,
}

impl EffectStack {
    /// Stack bound to one render service.
    pub fn new(owner: Uuid, service: ServiceWeak) -> Self {
        let mut stack = Self::detached(owner);
        stack.core.services.push(service);
        stack
    }

    /// Stack without a render side (import sources, headless tests).
    pub fn detached(owner: Uuid) -> Self {
        Self {
            core: StackCore {
                tree: TreeModel::new(ItemKind::Group(GroupItem::new(ROOT_NAME))),
                services: Vec::new(),
                stack_enabled: true,
                owner,
            },
            history: UndoHistory::new(),
        }
    }

    pub fn owner(&self) -> Uuid {
        self.core.owner
    }

    pub fn root(&self) -> NodeId {
        self.core.root()
    }

    /// Number of immediate children of the root.
    pub fn row_count(&self) -> usize {
        self.core.tree.child_count(self.core.root())
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Registry lookup; a miss is a `None`, never a panic.
    pub fn get_item(&self, id: NodeId) -> Option<&TreeNode<ItemKind>> {
        self.core.tree.get(id)
    }

    pub fn effect_at_row(&self, row: usize) -> Option<NodeId> {
        self.core.tree.children(self.core.root()).get(row).copied()
    }

    pub fn signals(&self) -> SignalBus {
        self.core.tree.signals()
    }

    pub fn history(&self) -> &UndoHistory {
        &self.history
    }

    pub fn is_enabled(&self, node: NodeId) -> bool {
        self.core.is_enabled(node)
    }

    pub fn is_audio(&self, node: NodeId) -> bool {
        self.core.is_audio(node)
    }

    pub fn has_kind(&self, kind_id: &str) -> bool {
        self.core.has_kind(kind_id)
    }

    pub fn stack_enabled(&self) -> bool {
        self.core.stack_enabled
    }

    // === Service wiring ===

    /// Attach every current leaf to an additional service (a timeline
    /// clone of the owner gets the same processing chain).
    pub fn add_service(&mut self, service: ServiceWeak) -> ModelResult<()> {
        let svc = service.upgrade().ok_or(ModelError::ServiceUnavailable)?;
        {
            let mut guard = svc.write().expect("render service lock");
            for filter in self.core.filters_of(&[self.core.root()]) {
                guard.attach(filter)?;
            }
        }
        self.core.services.push(service);
        Ok(())
    }

    /// Swap the render side out entirely and replant into the new one.
    pub fn reset_service(&mut self, service: ServiceWeak) -> ModelResult<()> {
        self.core.services.clear();
        self.add_service(service)
    }

    // === Mutations (immediate-apply, then undo-registered) ===

    /// Build a new effect from the catalog and append it under the root.
    pub fn append_effect(&mut self, kind_id: &str) -> ModelResult<NodeId> {
        let kind = catalog::get(kind_id)
            .ok_or_else(|| ModelError::UnknownKind(kind_id.to_string()))?;
        if kind.unique && self.core.has_kind(kind_id) {
            return Err(ModelError::InvalidArgument(format!(
                "effect {kind_id} allows a single instance per stack"
            )));
        }
        let mut item = EffectItem::from_kind(kind);
        item.stack_enabled = self.core.stack_enabled;
        self.append_item(item, "Add")
    }

    /// Deep-clone one effect into this stack: independent id, independent
    /// graph handle, copied parameter values.
    pub fn copy_effect(&mut self, source: &EffectItem) -> ModelResult<NodeId> {
        if source.unique && self.core.has_kind(&source.kind_id) {
            return Err(ModelError::InvalidArgument(format!(
                "effect {} allows a single instance per stack",
                source.kind_id
            )));
        }
        let mut item = source.clone_detached();
        item.stack_enabled = self.core.stack_enabled;
        self.append_item(item, "Copy")
    }

    fn append_item(&mut self, item: EffectItem, verb: &str) -> ModelResult<NodeId> {
        let name = item.name.clone();
        let sub = self.core.tree.new_detached(ItemKind::Effect(item));
        let node = sub.root_id();
        let mut cmd = StackCommand::append_effect(self.core.root(), sub);
        cmd.apply(&mut self.core)?;
        self.history.push(cmd, format!("{verb} effect {name}"));
        log::debug!("stack {}: {verb} {name} as {node}", self.core.owner);
        Ok(node)
    }

    /// Unplant and remove an item (groups go with their whole subtree).
    pub fn remove_effect(&mut self, node: NodeId) -> ModelResult<()> {
        let name = self
            .core
            .tree
            .get(node)
            .ok_or(ModelError::NotFound(node))?
            .data
            .name()
            .to_string();
        let mut cmd = StackCommand::remove_effect(node);
        cmd.apply(&mut self.core)?;
        self.history.push(cmd, format!("Delete effect {name}"));
        log::debug!("stack {}: removed {name} ({node})", self.core.owner);
        Ok(())
    }

    /// Move an item to `dest_row` among its siblings (`dest_row` is the
    /// final row). Graph churn is bounded to the affected tail.
    pub fn move_effect(&mut self, dest_row: usize, node: NodeId) -> ModelResult<()> {
        let parent = self
            .core
            .tree
            .get(node)
            .ok_or(ModelError::NotFound(node))?
            .parent()
            .ok_or_else(|| ModelError::InvalidArgument("the root cannot be moved".into()))?;
        let count = self.core.tree.child_count(parent);
        if dest_row > count {
            return Err(ModelError::InvalidArgument(format!(
                "move row {dest_row} out of range 0..={count}"
            )));
        }
        let from_row = self.core.tree.row(node).ok_or(ModelError::DanglingModelReference)?;
        if dest_row.min(count - 1) == from_row {
            return Ok(());
        }
        let name = self.core.tree.get(node).map(|n| n.data.name().to_string());
        let mut cmd = StackCommand::move_effect(node, from_row, dest_row);
        cmd.apply(&mut self.core)?;
        self.history
            .push(cmd, format!("Move effect {}", name.unwrap_or_default()));
        Ok(())
    }

    /// Edit one parameter. Consecutive edits of the same parameter within
    /// the merge window collapse into a single undo step.
    pub fn set_parameter(&mut self, node: NodeId, name: &str, value: AttrValue) -> ModelResult<()> {
        let n = self.core.tree.get(node).ok_or(ModelError::NotFound(node))?;
        let filter = n.data.filter().ok_or_else(|| {
            ModelError::InvalidArgument(format!("node {node} has no parameters"))
        })?;
        let index = filter.param_index_of(name).ok_or_else(|| {
            ModelError::InvalidArgument(format!("unknown parameter {name}"))
        })?;
        let old = filter.get(name).ok_or(ModelError::DanglingModelReference)?;
        let mut cmd =
            StackCommand::set_parameter(node, index, name, old, value, Instant::now());
        cmd.apply(&mut self.core)?;
        self.history.push(cmd, format!("Edit {name}"));
        Ok(())
    }

    /// Per-item enable toggle; disabling a group bypasses every
    /// descendant without touching their own flags.
    pub fn set_effect_enabled(&mut self, node: NodeId, enabled: bool) -> ModelResult<()> {
        let n = self.core.tree.get(node).ok_or(ModelError::NotFound(node))?;
        let was = n.data.own_enabled();
        if was == enabled {
            return Ok(());
        }
        let name = n.data.name().to_string();
        let mut cmd = StackCommand::set_enabled(node, enabled, was);
        cmd.apply(&mut self.core)?;
        let verb = if enabled { "Enable" } else { "Disable" };
        self.history.push(cmd, format!("{verb} {name}"));
        Ok(())
    }

    /// Stack-wide toggle; cascades into every immediate child (and from
    /// there through groups). Not an undo step.
    pub fn set_stack_enabled(&mut self, enabled: bool) {
        self.core.stack_enabled = enabled;
        for child in self.core.tree.children(self.core.root()).to_vec() {
            self.core.cascade_stack_enabled(child, enabled);
        }
        log::debug!(
            "stack {}: stack-wide enable set to {enabled}",
            self.core.owner
        );
    }

    /// Clone every leaf of `source` into this stack via the same
    /// undo-registered append path. No structural sharing.
    pub fn import_effects(&mut self, source: &EffectStack) -> ModelResult<()> {
        for leaf in source.core.tree.leaves(source.core.root()) {
            let Some(node) = source.core.tree.get(leaf) else {
                continue;
            };
            // an empty group is its own leaf; nothing to import from it
            if let ItemKind::Effect(effect) = &node.data {
                self.copy_effect(effect)?;
            }
        }
        Ok(())
    }

    /// Wrap an item in a fresh group under the root. The group is appended
    /// at the last row, so the item's leaves stay at the tail of the
    /// graph after the reparent.
    pub fn create_group(&mut self, child: NodeId) -> ModelResult<NodeId> {
        if !self.core.tree.contains(child) {
            return Err(ModelError::NotFound(child));
        }
        if child == self.core.root() {
            return Err(ModelError::InvalidArgument(
                "the root cannot be grouped".into(),
            ));
        }
        let services = self.core.upgrade_services()?;
        let filters = self.core.filters_of(&[child]);
        let mut guards = StackCore::write_guards(&services);
        for guard in guards.iter_mut() {
            for filter in &filters {
                guard.detach(filter)?;
            }
        }
        let group = self
            .core
            .tree
            .append_child(self.core.root(), ItemKind::Group(GroupItem::new("group")))?;
        self.core.tree.change_parent(child, group)?;
        for guard in guards.iter_mut() {
            for filter in &filters {
                guard.attach(Arc::clone(filter))?;
            }
        }
        drop(guards);
        self.core.refresh_disabled(group);
        Ok(group)
    }

    // === Undo / redo ===

    pub fn undo(&mut self) -> ModelResult<bool> {
        let Self { core, history } = self;
        history.undo(core)
    }

    pub fn redo(&mut self) -> ModelResult<bool> {
        let Self { core, history } = self;
        history.redo(core)
    }

    // === Invariants ===

    /// Tree audit plus graph sync audit: every connected service must
    /// carry exactly the stack's leaves, in pre-order.
    pub fn check_consistency(&self) -> bool {
        if !self.core.tree.check_consistency() {
            return false;
        }
        let mut effects_are_leaves = true;
        self.core.tree.visit_subtree(self.core.root(), &mut |n| {
            if n.data.is_effect() && !n.is_leaf() {
                effects_are_leaves = false;
            }
        });
        if !effects_are_leaves {
            log::error!("stack {}: found an effect with children", self.core.owner);
            return false;
        }
        let expected = self.core.filters_of(&[self.core.root()]);
        for weak in &self.core.services {
            let Some(svc) = weak.upgrade() else {
                log::error!("stack {}: unavailable service", self.core.owner);
                return false;
            };
            let attached = svc.read().expect("render service lock").attached();
            if attached.len() != expected.len() {
                log::error!("stack {}: wrong filter count in service", self.core.owner);
                return false;
            }
            for (a, b) in attached.iter().zip(&expected) {
                if !Arc::ptr_eq(a, b) {
                    log::error!("stack {}: filter order differs in service", self.core.owner);
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::RwLock;

    use crate::core::service::{MemoryService, ServiceHandle};

    fn stack() -> (EffectStack, Arc<RwLock<MemoryService>>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let svc = MemoryService::new_ref();
        let stack = EffectStack::new(Uuid::new_v4(), MemoryService::weak(&svc));
        (stack, svc)
    }

    fn graph_kinds(svc: &Arc<RwLock<MemoryService>>) -> Vec<String> {
        svc.read().unwrap().attached_kinds()
    }

    fn tree_kinds(stack: &EffectStack) -> Vec<String> {
        stack
            .core
            .tree
            .children(stack.root())
            .iter()
            .map(|&id| {
                stack
                    .get_item(id)
                    .and_then(|n| n.data.kind_id())
                    .unwrap_or("<group>")
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn test_append_keeps_tree_and_graph_in_step() {
        let (mut stack, svc) = stack();
        stack.append_effect("sepia").unwrap();
        stack.append_effect("brightness").unwrap();

        assert_eq!(stack.row_count(), 2);
        assert_eq!(tree_kinds(&stack), vec!["sepia", "brightness"]);
        assert_eq!(graph_kinds(&svc), vec!["sepia", "brightness"]);
        assert!(stack.check_consistency());
    }

    #[test]
    fn test_end_to_end_scenario() {
        let (mut stack, svc) = stack();
        assert!(stack.is_empty());

        let _sepia = stack.append_effect("sepia").unwrap();
        assert_eq!(stack.row_count(), 1);
        assert_eq!(graph_kinds(&svc), vec!["sepia"]);

        let brightness = stack.append_effect("brightness").unwrap();
        assert_eq!(stack.row_count(), 2);
        assert_eq!(graph_kinds(&svc), vec!["sepia", "brightness"]);

        stack.move_effect(0, brightness).unwrap();
        assert_eq!(tree_kinds(&stack), vec!["brightness", "sepia"]);
        assert_eq!(graph_kinds(&svc), vec!["brightness", "sepia"]);

        assert!(stack.undo().unwrap());
        assert_eq!(tree_kinds(&stack), vec!["sepia", "brightness"]);
        assert_eq!(graph_kinds(&svc), vec!["sepia", "brightness"]);

        assert!(stack.undo().unwrap());
        assert_eq!(stack.row_count(), 1);
        assert!(stack.undo().unwrap());
        assert_eq!(stack.row_count(), 0);
        assert!(graph_kinds(&svc).is_empty());
        assert!(stack.check_consistency());
    }

    #[test]
    fn test_move_replants_only_the_affected_tail() {
        let (mut stack, svc) = stack();
        let a = stack.append_effect("sepia").unwrap();
        stack.append_effect("brightness").unwrap();
        stack.append_effect("gaussian_blur").unwrap();
        svc.write().unwrap().reset_ops();

        stack.move_effect(2, a).unwrap();

        assert_eq!(tree_kinds(&stack), vec!["brightness", "gaussian_blur", "sepia"]);
        assert_eq!(
            graph_kinds(&svc),
            vec!["brightness", "gaussian_blur", "sepia"]
        );
        // only the moved node and the tail were touched; the leading
        // sibling kept its slot
        assert_eq!(svc.read().unwrap().ops(), (2, 2));
        assert!(stack.check_consistency());
    }

    #[test]
    fn test_move_rejects_out_of_range() {
        let (mut stack, _svc) = stack();
        let a = stack.append_effect("sepia").unwrap();
        stack.append_effect("brightness").unwrap();

        assert!(matches!(
            stack.move_effect(3, a),
            Err(ModelError::InvalidArgument(_))
        ));
        // a no-op move is not an undo step
        let steps = stack.history().len();
        stack.move_effect(0, a).unwrap();
        assert_eq!(stack.history().len(), steps);
    }

    #[test]
    fn test_undo_roundtrip_restores_everything() {
        let (mut stack, svc) = stack();
        let sepia = stack.append_effect("sepia").unwrap();
        let brightness = stack.append_effect("brightness").unwrap();
        let blur = stack.append_effect("gaussian_blur").unwrap();

        let ids_before: Vec<NodeId> = stack.core.tree.children(stack.root()).to_vec();
        let graph_before = graph_kinds(&svc);
        let level_before = stack
            .get_item(brightness)
            .unwrap()
            .data
            .filter()
            .unwrap()
            .get("level");

        stack.move_effect(0, blur).unwrap();
        stack.remove_effect(sepia).unwrap();
        stack
            .set_parameter(brightness, "level", AttrValue::Float(0.3))
            .unwrap();

        for _ in 0..3 {
            assert!(stack.undo().unwrap());
        }

        assert_eq!(stack.core.tree.children(stack.root()), &ids_before[..]);
        assert_eq!(graph_kinds(&svc), graph_before);
        assert_eq!(
            stack
                .get_item(brightness)
                .unwrap()
                .data
                .filter()
                .unwrap()
                .get("level"),
            level_before
        );
        assert!(stack.check_consistency());

        // idempotent replay: undo/redo cycles land on the same two states
        for _ in 0..3 {
            assert!(stack.redo().unwrap());
        }
        for _ in 0..3 {
            assert!(stack.undo().unwrap());
            assert!(stack.redo().unwrap());
        }
        assert_eq!(tree_kinds(&stack), vec!["gaussian_blur", "brightness"]);
        assert!(stack.check_consistency());
    }

    #[test]
    fn test_remove_middle_undo_restores_row_and_graph() {
        let (mut stack, svc) = stack();
        stack.append_effect("sepia").unwrap();
        let brightness = stack.append_effect("brightness").unwrap();
        stack.append_effect("gaussian_blur").unwrap();

        stack.remove_effect(brightness).unwrap();
        assert_eq!(graph_kinds(&svc), vec!["sepia", "gaussian_blur"]);
        assert!(stack.get_item(brightness).is_none());

        assert!(stack.undo().unwrap());
        // same id, same row, same graph slot
        assert_eq!(stack.core.tree.row(brightness), Some(1));
        assert_eq!(
            graph_kinds(&svc),
            vec!["sepia", "brightness", "gaussian_blur"]
        );
        assert!(stack.check_consistency());
    }

    #[test]
    fn test_group_cascade_enable() {
        let (mut stack, _svc) = stack();
        let sepia = stack.append_effect("sepia").unwrap();
        let brightness = stack.append_effect("brightness").unwrap();
        let group = stack.create_group(sepia).unwrap();
        assert!(stack.check_consistency());

        assert!(stack.is_enabled(sepia));
        stack.set_effect_enabled(group, false).unwrap();

        // the leaf's own flag is untouched, the cascade disables it
        assert!(stack.get_item(sepia).unwrap().data.own_enabled());
        assert!(!stack.is_enabled(sepia));
        assert!(stack
            .get_item(sepia)
            .unwrap()
            .data
            .filter()
            .unwrap()
            .is_disabled());
        assert!(stack.is_enabled(brightness));

        stack.set_effect_enabled(group, true).unwrap();
        assert!(stack.is_enabled(sepia));
        assert!(!stack
            .get_item(sepia)
            .unwrap()
            .data
            .filter()
            .unwrap()
            .is_disabled());

        // the toggles are undo steps
        assert!(stack.undo().unwrap());
        assert!(!stack.is_enabled(sepia));
        assert!(stack.undo().unwrap());
        assert!(stack.is_enabled(sepia));
    }

    #[test]
    fn test_stack_wide_enable_cascade() {
        let (mut stack, _svc) = stack();
        let sepia = stack.append_effect("sepia").unwrap();
        let brightness = stack.append_effect("brightness").unwrap();

        stack.set_stack_enabled(false);
        assert!(!stack.stack_enabled());
        assert!(!stack.is_enabled(sepia));
        assert!(!stack.is_enabled(brightness));
        // own toggles survive the stack-wide bypass
        assert!(stack.get_item(sepia).unwrap().data.own_enabled());

        // effects appended while bypassed come up bypassed
        let blur = stack.append_effect("gaussian_blur").unwrap();
        assert!(!stack.is_enabled(blur));
        assert!(stack
            .get_item(blur)
            .unwrap()
            .data
            .filter()
            .unwrap()
            .is_disabled());

        stack.set_stack_enabled(true);
        assert!(stack.is_enabled(sepia));
        assert!(stack.is_enabled(blur));
    }

    #[test]
    fn test_unique_and_unknown_kinds() {
        let (mut stack, _svc) = stack();
        stack.append_effect("fade_from_black").unwrap();
        assert!(matches!(
            stack.append_effect("fade_from_black"),
            Err(ModelError::InvalidArgument(_))
        ));
        assert_eq!(
            stack.append_effect("no_such_effect"),
            Err(ModelError::UnknownKind("no_such_effect".into()))
        );
        assert_eq!(stack.row_count(), 1);
    }

    #[test]
    fn test_import_deep_clones_without_sharing() {
        let (mut dest, svc) = stack();
        let mut source = EffectStack::detached(Uuid::new_v4());
        let src_sepia = source.append_effect("sepia").unwrap();
        source.append_effect("brightness").unwrap();
        source
            .set_parameter(src_sepia, "u", AttrValue::Int(99))
            .unwrap();

        dest.import_effects(&source).unwrap();
        assert_eq!(tree_kinds(&dest), vec!["sepia", "brightness"]);
        assert_eq!(graph_kinds(&svc), vec!["sepia", "brightness"]);

        let dest_sepia = dest.effect_at_row(0).unwrap();
        let dest_filter = dest
            .get_item(dest_sepia)
            .unwrap()
            .data
            .filter()
            .unwrap()
            .clone();
        // parameter values came across
        assert_eq!(dest_filter.get("u"), Some(AttrValue::Int(99)));
        // but storage is independent
        let src_filter = source
            .get_item(src_sepia)
            .unwrap()
            .data
            .filter()
            .unwrap()
            .clone();
        assert!(!Arc::ptr_eq(&src_filter, &dest_filter));
        source
            .set_parameter(src_sepia, "u", AttrValue::Int(1))
            .unwrap();
        assert_eq!(dest_filter.get("u"), Some(AttrValue::Int(99)));
        assert!(dest.check_consistency());
    }

    #[test]
    fn test_audio_is_an_or_over_children() {
        let (mut stack, _svc) = stack();
        let volume = stack.append_effect("volume").unwrap();
        let sepia = stack.append_effect("sepia").unwrap();
        let group = stack.create_group(volume).unwrap();

        assert!(stack.is_audio(volume));
        assert!(stack.is_audio(group));
        assert!(!stack.is_audio(sepia));
        // the root sees the audio leaf too
        assert!(stack.is_audio(stack.root()));
    }

    #[test]
    fn test_parameter_merge_window_collapses_drags() {
        let (mut stack, _svc) = stack();
        let sepia = stack.append_effect("sepia").unwrap();

        // a quick burst of edits: one undo step
        stack.set_parameter(sepia, "u", AttrValue::Int(80)).unwrap();
        stack.set_parameter(sepia, "u", AttrValue::Int(90)).unwrap();
        stack.set_parameter(sepia, "u", AttrValue::Int(95)).unwrap();
        assert_eq!(stack.history().len(), 2); // append + merged edit

        assert!(stack.undo().unwrap());
        let filter = stack.get_item(sepia).unwrap().data.filter().unwrap().clone();
        // back to the catalog default in one hop
        assert_eq!(filter.get("u"), Some(AttrValue::Int(75)));
        assert!(stack.redo().unwrap());
        assert_eq!(filter.get("u"), Some(AttrValue::Int(95)));
    }

    #[test]
    fn test_dead_service_rejects_mutation_cleanly() {
        let handle = ServiceHandle::new();
        let mut stack = EffectStack::new(Uuid::new_v4(), handle.weak());
        stack.append_effect("sepia").unwrap();
        drop(handle);

        assert_eq!(stack.append_effect("brightness"), Err(ModelError::ServiceUnavailable));
        let sepia = stack.effect_at_row(0).unwrap();
        assert_eq!(stack.move_effect(0, sepia), Ok(()));
        assert_eq!(stack.remove_effect(sepia), Err(ModelError::ServiceUnavailable));

        // the tree is exactly as before the failed calls
        assert_eq!(stack.row_count(), 1);
        assert_eq!(tree_kinds(&stack), vec!["sepia"]);
        assert_eq!(stack.history().len(), 1);
    }

    #[test]
    fn test_reset_service_replants_in_order() {
        let (mut stack, _old) = stack();
        stack.append_effect("sepia").unwrap();
        stack.append_effect("brightness").unwrap();

        let fresh = MemoryService::new_ref();
        stack.reset_service(MemoryService::weak(&fresh)).unwrap();
        assert_eq!(graph_kinds(&fresh), vec!["sepia", "brightness"]);
        assert!(stack.check_consistency());
    }

    #[test]
    fn test_get_item_miss_is_none() {
        let (stack, _svc) = stack();
        assert!(stack.get_item(NodeId(404)).is_none());
        assert!(stack.effect_at_row(0).is_none());
    }
}
