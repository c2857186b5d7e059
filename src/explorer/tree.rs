//! This module contains the arena-backed symbolic execution tree.
//!
//! # Ownership
//!
//! The tree exclusively owns its nodes in a dense table indexed by
//! [`NodeId`]; parents and children reference each other by id only, so no
//! reference cycles can form and no node can outlive the tree.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;

use crate::solver::Predicate;

/// The identifier of a node in the tree.
///
/// Ids are allocated monotonically and never reused; a node allocated later
/// always has a strictly greater id. The root always has id `0`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct NodeId(u32);

impl NodeId {
    /// The id of the root node.
    pub const ROOT: NodeId = NodeId(0);

    /// Gets the raw integer value of the id.
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// The resolution status of a node's accumulated path.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum NodeStatus {
    /// The node is pending on the exploration frontier. A tree returned to
    /// the caller never contains open nodes; cancellation resolves them to
    /// [`Self::UnknownBounded`].
    Open,

    /// The node forked at a conditional jump and its feasible children are
    /// recorded beneath it.
    Branched,

    /// The path to this node is feasible and execution along it halted, or
    /// no further successor could be followed.
    FeasibleLeaf,

    /// Expansion below this node was given up: the solver answered unknown
    /// or timed out, a bound was exceeded, or the exploration was cancelled.
    UnknownBounded,
}

/// A single node of the symbolic execution tree.
///
/// The conjunction of the constraints along the path from the root to a node
/// is the precondition under which that node is reached. Branches whose
/// constraint the solver refuted are not represented at all; their count is
/// recorded in the exploration statistics.
#[derive(Clone, Debug)]
pub struct SymbolicNode {
    /// The node's identifier.
    id: NodeId,

    /// The parent's identifier, absent only for the root.
    parent: Option<NodeId>,

    /// The path constraint contributed at this node, absent only for the
    /// root.
    constraint: Option<Predicate>,

    /// The resolution status of the node's accumulated path.
    status: NodeStatus,

    /// The node's children, in the order they were allocated.
    children: Vec<NodeId>,
}

impl SymbolicNode {
    /// Gets the node's identifier.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Gets the parent's identifier, absent for the root.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Gets the path constraint contributed at this node, absent for the
    /// root.
    #[must_use]
    pub fn constraint(&self) -> Option<Predicate> {
        self.constraint
    }

    /// Gets the resolution status of the node's accumulated path.
    #[must_use]
    pub fn status(&self) -> NodeStatus {
        self.status
    }

    /// Gets the node's children in allocation order.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        self.children.as_slice()
    }
}

/// The tree recording which explored paths are feasible, which were given up
/// on, and under which constraints each is reached.
#[derive(Debug)]
pub struct SymbolicExecutionTree {
    /// The dense node table; a node's id equals its index here.
    nodes: Vec<SymbolicNode>,

    /// The next id to allocate. Incremented atomically so that the
    /// strictly-increasing, never-reused invariant holds even when sibling
    /// subtrees are grown from independent worker tasks.
    next_id: AtomicU32,
}

impl SymbolicExecutionTree {
    /// Creates a new tree containing only the root node (id `0`) in the
    /// [`NodeStatus::Open`] state.
    #[must_use]
    pub fn new() -> Self {
        let root = SymbolicNode {
            id: NodeId::ROOT,
            parent: None,
            constraint: None,
            status: NodeStatus::Open,
            children: Vec::new(),
        };
        Self {
            nodes:   vec![root],
            next_id: AtomicU32::new(1),
        }
    }

    /// Allocates a new child of `parent` carrying `constraint`, in the
    /// provided initial `status`, and returns its id.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is not a node of this tree. Ids are only ever
    /// handed out by the tree itself, so this is a programmer bug.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        constraint: Predicate,
        status: NodeStatus,
    ) -> NodeId {
        let id = NodeId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let node = SymbolicNode {
            id,
            parent: Some(parent),
            constraint: Some(constraint),
            status,
            children: Vec::new(),
        };
        self.nodes.push(node);
        self.node_mut(parent).children.push(id);
        id
    }

    /// Sets the status of the node `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a node of this tree; see [`Self::add_child`].
    pub fn set_status(&mut self, id: NodeId, status: NodeStatus) {
        self.node_mut(id).status = status;
    }

    /// Gets the node with the provided `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a node of this tree; see [`Self::add_child`].
    #[must_use]
    pub fn node(&self, id: NodeId) -> &SymbolicNode {
        &self.nodes[id.0 as usize]
    }

    /// Gets the root node.
    #[must_use]
    pub fn root(&self) -> &SymbolicNode {
        self.node(NodeId::ROOT)
    }

    /// Gets all nodes in id order.
    #[must_use]
    pub fn nodes(&self) -> &[SymbolicNode] {
        self.nodes.as_slice()
    }

    /// Gets the number of nodes in the tree.
    #[allow(clippy::len_without_is_empty)] // The tree always contains the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Gets the constraints along the path from the root to the node `id`,
    /// in root-to-node order. Their conjunction is the precondition under
    /// which the node is reached.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a node of this tree; see [`Self::add_child`].
    #[must_use]
    pub fn path_constraints(&self, id: NodeId) -> Vec<Predicate> {
        let mut constraints = Vec::new();
        let mut current = self.node(id);
        loop {
            if let Some(constraint) = current.constraint {
                constraints.push(constraint);
            }
            match current.parent {
                Some(parent) => current = self.node(parent),
                None => break,
            }
        }
        constraints.reverse();
        constraints
    }

    /// Produces the serializable node table: one row per node with its id,
    /// parent id, constraint description, and status, sufficient for an
    /// external reporting layer to render paths.
    #[must_use]
    pub fn node_table(&self) -> Vec<NodeRecord> {
        self.nodes
            .iter()
            .map(|node| NodeRecord {
                id:         node.id.as_u32(),
                parent:     node.parent.map(NodeId::as_u32),
                constraint: node.constraint.map(|c| c.to_string()),
                status:     node.status,
            })
            .collect()
    }

    fn node_mut(&mut self, id: NodeId) -> &mut SymbolicNode {
        &mut self.nodes[id.0 as usize]
    }
}

impl Default for SymbolicExecutionTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloning snapshots the allocation counter; the clone continues numbering
/// where the original left off.
impl Clone for SymbolicExecutionTree {
    fn clone(&self) -> Self {
        Self {
            nodes:   self.nodes.clone(),
            next_id: AtomicU32::new(self.next_id.load(Ordering::SeqCst)),
        }
    }
}

/// One row of the exported node table.
#[derive(Clone, Debug, Serialize)]
pub struct NodeRecord {
    /// The node's id.
    pub id: u32,

    /// The parent's id, absent for the root.
    pub parent: Option<u32>,

    /// The human-readable description of the constraint contributed at the
    /// node, absent for the root.
    pub constraint: Option<String>,

    /// The node's resolution status.
    pub status: NodeStatus,
}

#[cfg(test)]
mod test {
    use ethnum::U256;

    use crate::{
        explorer::tree::{NodeId, NodeStatus, SymbolicExecutionTree},
        solver::Predicate,
        value::AbstractValue,
    };

    fn predicate(site: u32) -> Predicate {
        Predicate::truthy(site, AbstractValue::Known(U256::ONE))
    }

    #[test]
    fn starts_with_an_open_root() {
        let tree = SymbolicExecutionTree::new();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root().id(), NodeId::ROOT);
        assert_eq!(tree.root().status(), NodeStatus::Open);
        assert!(tree.root().parent().is_none());
        assert!(tree.root().constraint().is_none());
    }

    #[test]
    fn allocates_strictly_increasing_ids() {
        let mut tree = SymbolicExecutionTree::new();
        let first = tree.add_child(NodeId::ROOT, predicate(1), NodeStatus::Open);
        let second = tree.add_child(NodeId::ROOT, predicate(1), NodeStatus::Open);
        let grandchild = tree.add_child(first, predicate(2), NodeStatus::Open);

        assert!(first < second);
        assert!(second < grandchild);
        assert_eq!(tree.root().children(), &[first, second]);
        assert_eq!(tree.node(first).children(), &[grandchild]);
    }

    #[test]
    fn every_non_root_node_has_exactly_one_parent() {
        let mut tree = SymbolicExecutionTree::new();
        let child = tree.add_child(NodeId::ROOT, predicate(1), NodeStatus::Open);
        let grandchild = tree.add_child(child, predicate(2), NodeStatus::FeasibleLeaf);

        assert_eq!(tree.node(child).parent(), Some(NodeId::ROOT));
        assert_eq!(tree.node(grandchild).parent(), Some(child));
    }

    #[test]
    fn accumulates_path_constraints_from_the_root() {
        let mut tree = SymbolicExecutionTree::new();
        let child = tree.add_child(NodeId::ROOT, predicate(1), NodeStatus::Open);
        let grandchild = tree.add_child(child, predicate(2), NodeStatus::Open);

        let path = tree.path_constraints(grandchild);
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].branch_site, 1);
        assert_eq!(path[1].branch_site, 2);
        assert!(tree.path_constraints(NodeId::ROOT).is_empty());
    }

    #[test]
    fn exports_a_serializable_node_table() {
        let mut tree = SymbolicExecutionTree::new();
        let child = tree.add_child(NodeId::ROOT, predicate(4), NodeStatus::FeasibleLeaf);
        tree.set_status(NodeId::ROOT, NodeStatus::Branched);

        let table = tree.node_table();
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].id, 0);
        assert!(table[0].parent.is_none());
        assert_eq!(table[1].parent, Some(0));
        assert_eq!(table[1].id, child.as_u32());
        assert!(table[1].constraint.as_ref().unwrap().contains("cond@4"));

        let json = serde_json::to_string(&table).expect("Serialization failed");
        assert!(json.contains("FeasibleLeaf"));
    }
}
