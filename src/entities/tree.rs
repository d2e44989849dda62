//! Generic observable tree model: stable-id nodes, ordered children,
//! change-notification brackets.
//!
//! The arena IS the id registry (nodes are stored in one `IndexMap` keyed
//! by id), so registry membership and reachability-from-root are the same
//! thing by construction. All relations (parent, children) are id lookups,
//! never live pointers, which rules out reference cycles and dangling
//! parents.
//!
//! Lifecycle: a node starts detached inside a [`DetachedSubtree`] (its id
//! is already allocated from the model-scoped counter); it becomes
//! registered (addressable via [`TreeModel::get`]) only once attached
//! under the root. Detaching deregisters the whole subtree immediately and
//! hands ownership back as a `DetachedSubtree`; undo commands keep removed
//! payloads alive exactly this way. The root is the one exception: always
//! registered, never detachable.
//!
//! Every structural mutation is wrapped in a begin/end bracket that emits
//! paired signals on the [`SignalBus`]. Brackets are not reentrant:
//! starting a second structural change before the first completes is an
//! invariant violation and panics.

use indexmap::IndexMap;

use crate::core::event_bus::{SignalBus, StackSignal};
use crate::error::{ModelError, ModelResult};

/// Stable node identifier. Unique per model for the lifetime of the model
/// (the counter is model-scoped, so two models may reuse the same ids).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Row-path from the root ("/" = root, "/2/0" = first child of the root's
/// third child). Recomputed on demand, never cached.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TreePath(Vec<usize>);

impl TreePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(rows: Vec<usize>) -> Self {
        Self(rows)
    }

    pub fn rows(&self) -> &[usize] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for TreePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for row in &self.0 {
            write!(f, "/{row}")?;
        }
        Ok(())
    }
}

/// One arena entry. Structure fields (id, parent, children, depth) are
/// private; only the model mutates them. Payload is open.
#[derive(Debug)]
pub struct TreeNode<D> {
    id: NodeId,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    depth: usize,
    pub data: D,
}

impl<D> TreeNode<D> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A subtree that is not (or no longer) part of a model. Ids inside are
/// preserved, so reattaching restores the exact pre-detach identity.
#[derive(Debug)]
pub struct DetachedSubtree<D> {
    /// Pre-order; first entry is the subtree root (parent = None).
    nodes: Vec<TreeNode<D>>,
}

impl<D> DetachedSubtree<D> {
    pub fn root_id(&self) -> NodeId {
        self.nodes[0].id
    }

    pub fn root_data(&self) -> &D {
        &self.nodes[0].data
    }

    /// All carried nodes, pre-order (first entry is the subtree root).
    pub fn nodes(&self) -> &[TreeNode<D>] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChangeKind {
    Insert,
    Remove,
}

struct PendingChange {
    seq: u64,
    kind: ChangeKind,
    parent: TreePath,
    first: usize,
    last: usize,
}

/// Token returned by a bracket `begin_*`; the matching `end_*` consumes
/// and validates it. A mismatched or nested pair panics instead of
/// corrupting observers.
#[must_use]
pub(crate) struct ChangeToken {
    seq: u64,
}

/// The observable tree model.
pub struct TreeModel<D> {
    nodes: IndexMap<NodeId, TreeNode<D>>,
    root: NodeId,
    next_id: u32,
    pending: Option<PendingChange>,
    change_seq: u64,
    signals: SignalBus,
}

impl<D> TreeModel<D> {
    /// Create a model owning a freshly registered root node.
    pub fn new(root_data: D) -> Self {
        let mut model = Self {
            nodes: IndexMap::new(),
            root: NodeId(0),
            next_id: 0,
            pending: None,
            change_seq: 0,
            signals: SignalBus::new(),
        };
        let root = model.alloc_id();
        model.root = root;
        model.nodes.insert(
            root,
            TreeNode {
                id: root,
                parent: None,
                children: Vec::new(),
                depth: 0,
                data: root_data,
            },
        );
        model
    }

    fn alloc_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Shared handle to the notification bus.
    pub fn signals(&self) -> SignalBus {
        self.signals.clone()
    }

    /// Number of registered nodes (root included).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Registry lookup; a miss is a `None`, never a panic.
    pub fn get(&self, id: NodeId) -> Option<&TreeNode<D>> {
        self.nodes.get(&id)
    }

    /// Mutable payload access. Structure fields stay private.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut TreeNode<D>> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.children(id).len()
    }

    /// Position of a node among its parent's children. `None` for the
    /// root and for unregistered ids. Cost is proportional to the
    /// position.
    pub fn row(&self, id: NodeId) -> Option<usize> {
        let parent = self.get(id)?.parent?;
        self.get(parent)?.children.iter().position(|&c| c == id)
    }

    /// Row-path from the root, recomputed by walking ancestors.
    pub fn path_of(&self, id: NodeId) -> ModelResult<TreePath> {
        if !self.contains(id) {
            return Err(ModelError::NotFound(id));
        }
        let mut rows = Vec::new();
        let mut cur = id;
        while cur != self.root {
            let row = self.row(cur).ok_or(ModelError::DanglingModelReference)?;
            rows.push(row);
            cur = self
                .get(cur)
                .and_then(|n| n.parent)
                .ok_or(ModelError::DanglingModelReference)?;
        }
        rows.reverse();
        Ok(TreePath(rows))
    }

    /// Inverse of [`path_of`](Self::path_of).
    pub fn node_at_path(&self, path: &TreePath) -> Option<NodeId> {
        let mut cur = self.root;
        for &row in path.rows() {
            cur = *self.get(cur)?.children.get(row)?;
        }
        Some(cur)
    }

    /// True if `ancestor` is `id` itself or sits on its ancestor chain.
    pub fn has_ancestor(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.get(c).and_then(|n| n.parent);
        }
        false
    }

    /// Pre-order visit of the subtree rooted at `from` (inclusive).
    pub fn visit_subtree(&self, from: NodeId, visit: &mut impl FnMut(&TreeNode<D>)) {
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            let Some(node) = self.get(id) else { continue };
            visit(node);
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
        }
    }

    /// Leaves of the subtree rooted at `from`, in pre-order. A node
    /// without children is its own (sole) leaf.
    pub fn leaves(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.visit_subtree(from, &mut |n| {
            if n.is_leaf() {
                out.push(n.id);
            }
        });
        out
    }

    // === Construction / attachment ===

    /// Allocate a detached single-node subtree. The id is taken from the
    /// model counter now; the node is registered only on attach.
    pub fn new_detached(&mut self, data: D) -> DetachedSubtree<D> {
        let id = self.alloc_id();
        DetachedSubtree {
            nodes: vec![TreeNode {
                id,
                parent: None,
                children: Vec::new(),
                depth: 0,
                data,
            }],
        }
    }

    /// Construct a new child from payload and append it under `parent`.
    pub fn append_child(&mut self, parent: NodeId, data: D) -> ModelResult<NodeId> {
        let sub = self.new_detached(data);
        self.attach_subtree(parent, sub)
    }

    /// Reattach a detached subtree at the end of `parent`'s children,
    /// preserving ids. A subtree whose root id is still registered has a
    /// live parent and is rejected.
    pub fn attach_subtree(
        &mut self,
        parent: NodeId,
        mut sub: DetachedSubtree<D>,
    ) -> ModelResult<NodeId> {
        let sub_root = sub.root_id();
        if !self.contains(parent) {
            return Err(ModelError::NotFound(parent));
        }
        if self.contains(sub_root) {
            return Err(ModelError::AlreadyParented(sub_root));
        }
        debug_assert!(
            sub.nodes.iter().all(|n| !self.nodes.contains_key(&n.id)),
            "detached subtree id collides with a registered node"
        );

        let row = self.child_count(parent);
        let parent_path = self.path_of(parent)?;
        let token = self.begin_change(ChangeKind::Insert, parent_path, row, row);

        sub.nodes[0].parent = Some(parent);
        for node in sub.nodes.drain(..) {
            self.nodes.insert(node.id, node);
        }
        self.nodes
            .get_mut(&parent)
            .expect("parent registered")
            .children
            .push(sub_root);
        let base = self.get(parent).expect("parent registered").depth + 1;
        self.update_depths(sub_root, base);

        self.end_change(token);
        Ok(sub_root)
    }

    /// Detach a subtree, deregistering every node in it. The detached
    /// root's parent/depth are reset to orphan state.
    pub fn detach_subtree(&mut self, id: NodeId) -> ModelResult<DetachedSubtree<D>> {
        if id == self.root {
            return Err(ModelError::InvalidArgument(
                "the root cannot be detached".into(),
            ));
        }
        let node = self.get(id).ok_or(ModelError::NotFound(id))?;
        let parent = node.parent.ok_or(ModelError::DanglingModelReference)?;
        let row = self.row(id).ok_or(ModelError::DanglingModelReference)?;
        let parent_path = self.path_of(parent)?;

        let token = self.begin_change(ChangeKind::Remove, parent_path, row, row);

        self.nodes
            .get_mut(&parent)
            .expect("parent registered")
            .children
            .remove(row);
        let mut ids = Vec::new();
        self.visit_subtree(id, &mut |n| ids.push(n.id));
        let mut nodes = Vec::with_capacity(ids.len());
        for sid in ids {
            let node = self
                .nodes
                .shift_remove(&sid)
                .expect("subtree node registered");
            nodes.push(node);
        }
        nodes[0].parent = None;
        nodes[0].depth = 0;

        self.end_change(token);
        Ok(DetachedSubtree { nodes })
    }

    /// Move `node` to row `index` among its current siblings. `index` is
    /// the node's final row: `[A,B,C]` + `move_child(root, 2, A)` →
    /// `[B,C,A]`. Bracketed as a remove+insert pair.
    pub fn move_child(&mut self, parent: NodeId, index: usize, node: NodeId) -> ModelResult<()> {
        let count = self.get(parent).ok_or(ModelError::NotFound(parent))?.child_count();
        if index > count {
            return Err(ModelError::InvalidArgument(format!(
                "move index {index} out of range 0..={count}"
            )));
        }
        if self.get(node).ok_or(ModelError::NotFound(node))?.parent != Some(parent) {
            return Err(ModelError::InvalidArgument(format!(
                "node {node} is not a child of {parent}"
            )));
        }
        let old_row = self.row(node).ok_or(ModelError::DanglingModelReference)?;
        let dest = index.min(count - 1);
        if dest == old_row {
            return Ok(());
        }
        let parent_path = self.path_of(parent)?;

        let token = self.begin_change(ChangeKind::Remove, parent_path.clone(), old_row, old_row);
        self.nodes
            .get_mut(&parent)
            .expect("parent registered")
            .children
            .remove(old_row);
        self.end_change(token);

        let token = self.begin_change(ChangeKind::Insert, parent_path, dest, dest);
        self.nodes
            .get_mut(&parent)
            .expect("parent registered")
            .children
            .insert(dest, node);
        self.end_change(token);
        Ok(())
    }

    /// Detach `node` from its current parent and append it under
    /// `new_parent`. Appending a node under its own descendant is a cycle
    /// and is rejected before anything is mutated.
    pub fn change_parent(&mut self, node: NodeId, new_parent: NodeId) -> ModelResult<()> {
        if node == self.root {
            return Err(ModelError::InvalidArgument(
                "the root cannot be reparented".into(),
            ));
        }
        if !self.contains(new_parent) {
            return Err(ModelError::NotFound(new_parent));
        }
        if !self.contains(node) {
            return Err(ModelError::NotFound(node));
        }
        if self.has_ancestor(new_parent, node) {
            return Err(ModelError::CycleRejected(node));
        }
        if self.get(node).and_then(|n| n.parent) == Some(new_parent) {
            // no change needed
            return Ok(());
        }
        let sub = self.detach_subtree(node)?;
        self.attach_subtree(new_parent, sub)?;
        Ok(())
    }

    /// Announce a non-structural in-place update of `id`'s payload.
    pub fn notify_fields_changed(&self, id: NodeId, fields: Vec<String>) -> ModelResult<()> {
        let path = self.path_of(id)?;
        self.signals.emit(StackSignal::FieldsChanged { path, fields });
        Ok(())
    }

    fn update_depths(&mut self, from: NodeId, depth: usize) {
        let mut stack = vec![(from, depth)];
        while let Some((id, d)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&id) else { continue };
            node.depth = d;
            for &child in &node.children {
                stack.push((child, d + 1));
            }
        }
    }

    // === Bracket protocol ===

    fn begin_change(
        &mut self,
        kind: ChangeKind,
        parent: TreePath,
        first: usize,
        last: usize,
    ) -> ChangeToken {
        assert!(
            self.pending.is_none(),
            "re-entrant structural change: begin issued before the previous end"
        );
        self.change_seq += 1;
        let signal = match kind {
            ChangeKind::Insert => StackSignal::RowsAboutToInsert {
                parent: parent.clone(),
                first,
                last,
            },
            ChangeKind::Remove => StackSignal::RowsAboutToRemove {
                parent: parent.clone(),
                first,
                last,
            },
        };
        self.pending = Some(PendingChange {
            seq: self.change_seq,
            kind,
            parent,
            first,
            last,
        });
        self.signals.emit(signal);
        ChangeToken {
            seq: self.change_seq,
        }
    }

    fn end_change(&mut self, token: ChangeToken) {
        let pending = self
            .pending
            .take()
            .expect("end_change without a pending bracket");
        assert!(
            pending.seq == token.seq,
            "mismatched change bracket: stale token"
        );
        let signal = match pending.kind {
            ChangeKind::Insert => StackSignal::RowsInserted {
                parent: pending.parent,
                first: pending.first,
                last: pending.last,
            },
            ChangeKind::Remove => StackSignal::RowsRemoved {
                parent: pending.parent,
                first: pending.first,
                last: pending.last,
            },
        };
        self.signals.emit(signal);
    }

    // === Invariant checking ===

    /// Full structural audit: depth bookkeeping, parent/child links,
    /// registry membership. Logs the first violation and returns false.
    pub fn check_consistency(&self) -> bool {
        let Some(root) = self.get(self.root) else {
            log::error!("tree: root {} is not registered", self.root);
            return false;
        };
        if root.parent.is_some() || root.depth != 0 {
            log::error!("tree: root has a parent or non-zero depth");
            return false;
        }
        let mut seen = 0usize;
        let mut queue = vec![self.root];
        while let Some(id) = queue.pop() {
            let Some(node) = self.get(id) else {
                log::error!("tree: node {id} reachable but not registered");
                return false;
            };
            seen += 1;
            for (row, &child) in node.children.iter().enumerate() {
                let Some(c) = self.get(child) else {
                    log::error!("tree: child {child} of {id} not registered");
                    return false;
                };
                if c.parent != Some(id) {
                    log::error!("tree: invalid parent link on {child}");
                    return false;
                }
                if c.depth != node.depth + 1 {
                    log::error!("tree: invalid depth on {child}");
                    return false;
                }
                if self.row(child) != Some(row) {
                    log::error!("tree: invalid child ordering under {id}");
                    return false;
                }
                queue.push(child);
            }
        }
        if seen != self.nodes.len() {
            log::error!(
                "tree: registry holds {} nodes but only {seen} are reachable",
                self.nodes.len()
            );
            return false;
        }
        true
    }
}
