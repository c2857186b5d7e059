//! This module contains the bounded symbolic exploration of a control-flow
//! graph.
//!
//! The explorer walks the graph from its entry block with an
//! [`crate::value::AbstractStack`] as its machine state, forking at every
//! conditional jump. Each fork asks the injected [`crate::solver::Solver`]
//! whether the accumulated path constraints remain satisfiable with the new
//! branch predicate conjoined; refuted branches are pruned and counted,
//! while branches the solver cannot decide are retained as unknown-bounded
//! leaves. The result is a [`SymbolicExecutionTree`] in which every node is
//! resolved, alongside the [`ExplorationStats`] accounting for everything
//! that was pruned or given up on.
//!
//! Exploration is deterministic for a deterministic solver: blocks are
//! walked in a fixed order, the taken branch of a fork is always examined
//! before the not-taken branch, and node ids record that order.

pub mod tree;

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;

use crate::{
    cfg::{
        block::{EdgeKind, JumpTarget, Terminator},
        ControlFlowGraph,
    },
    constant::{DEFAULT_BRANCH_DEPTH_BOUND, DEFAULT_LOOP_VISIT_BOUND},
    explorer::tree::{NodeId, NodeStatus, SymbolicExecutionTree},
    opcode::{Category, Opcode},
    solver::{DynSolver, Predicate, SolverOutcome},
    value::{AbstractStack, AbstractValue},
    watchdog::DynWatchdog,
};

/// The configuration for the bounds the explorer enforces.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    /// The maximum number of branch decisions along any single path before
    /// the path is abandoned as unknown-bounded.
    pub branch_depth_bound: usize,

    /// The maximum number of times any single path may enter the same
    /// `JUMPDEST`-led block before the path is abandoned as
    /// unknown-bounded. This is what guarantees termination in the presence
    /// of loops.
    pub loop_visit_bound: usize,
}

impl Config {
    /// Sets the branch depth bound to `bound`.
    #[must_use]
    pub fn with_branch_depth_bound(mut self, bound: usize) -> Self {
        self.branch_depth_bound = bound;
        self
    }

    /// Sets the per-`JUMPDEST` loop visit bound to `bound`.
    #[must_use]
    pub fn with_loop_visit_bound(mut self, bound: usize) -> Self {
        self.loop_visit_bound = bound;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            branch_depth_bound: DEFAULT_BRANCH_DEPTH_BOUND,
            loop_visit_bound:   DEFAULT_LOOP_VISIT_BOUND,
        }
    }
}

/// Counters for everything the exploration pruned, abandoned, or asked of
/// the solver.
///
/// Pruned branches leave no node behind in the tree, so these counters are
/// the only record that they were considered at all.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ExplorationStats {
    /// The number of satisfiability queries issued to the solver.
    pub solver_queries: usize,

    /// The number of branches refuted by the solver and hence not
    /// represented in the tree.
    pub pruned_branches: usize,

    /// The number of branches the solver could not decide, retained as
    /// unknown-bounded leaves.
    pub solver_unknowns: usize,

    /// The number of paths abandoned because the branch depth bound or the
    /// loop visit bound was exceeded.
    pub bound_exceeded: usize,

    /// The number of pending paths converted to unknown-bounded leaves when
    /// the watchdog demanded a stop.
    pub cancelled_paths: usize,
}

/// The result of an exploration: the resolved tree and the accounting for
/// what was left out of it.
#[derive(Clone, Debug)]
pub struct Exploration {
    /// The tree of explored paths. Every node in it is resolved.
    pub tree: SymbolicExecutionTree,

    /// The counters accumulated during the exploration.
    pub stats: ExplorationStats,
}

/// A pending path on the exploration frontier: the tree node it will
/// resolve, and the machine state with which execution resumes.
#[derive(Clone, Debug)]
struct FrontierEntry {
    /// The tree node this path resolves when it completes.
    node: NodeId,

    /// The start offset of the next block to execute.
    block: u32,

    /// The abstract machine stack at the start of that block.
    stack: AbstractStack,

    /// The path constraints accumulated from the root, in order.
    constraints: Vec<Predicate>,

    /// The number of branch decisions taken along this path.
    depth: usize,

    /// How many times this path has entered each `JUMPDEST`-led block.
    visits: BTreeMap<u32, usize>,
}

/// The driver for a single bounded exploration of one control-flow graph.
#[derive(Debug)]
pub struct SymbolicExplorer<'g> {
    /// The graph being explored.
    graph: &'g ControlFlowGraph,

    /// The bounds enforced on every path.
    config: Config,

    /// The decision procedure consulted at every fork.
    solver: DynSolver,

    /// The watchdog polled to decide whether to wind down early.
    watchdog: DynWatchdog,

    /// The queue of pending paths.
    frontier: VecDeque<FrontierEntry>,

    /// The tree under construction.
    tree: SymbolicExecutionTree,

    /// The counters under accumulation.
    stats: ExplorationStats,

    /// The number of poll opportunities seen so far.
    polls: usize,

    /// Set once the watchdog has demanded a stop; never cleared.
    cancelled: bool,
}

impl<'g> SymbolicExplorer<'g> {
    /// Constructs a new explorer over `graph` using the provided `config`,
    /// branch-predicate `solver`, and `watchdog`.
    #[must_use]
    pub fn new(
        graph: &'g ControlFlowGraph,
        config: Config,
        solver: DynSolver,
        watchdog: DynWatchdog,
    ) -> Self {
        Self {
            graph,
            config,
            solver,
            watchdog,
            frontier: VecDeque::new(),
            tree: SymbolicExecutionTree::new(),
            stats: ExplorationStats::default(),
            polls: 0,
            cancelled: false,
        }
    }

    /// Runs the exploration to completion and returns the resolved tree and
    /// its statistics.
    ///
    /// The call always terminates: every path is cut off by the branch depth
    /// bound and the loop visit bound, and the watchdog can additionally
    /// force an early stop, in which case the pending portion of the
    /// frontier is reported as unknown-bounded leaves in a still-valid
    /// partial tree.
    #[must_use]
    pub fn explore(mut self) -> Exploration {
        self.frontier.push_back(FrontierEntry {
            node:        NodeId::ROOT,
            block:       self.graph.entry_block().start(),
            stack:       AbstractStack::new(),
            constraints: Vec::new(),
            depth:       0,
            visits:      BTreeMap::new(),
        });

        while let Some(entry) = self.frontier.pop_front() {
            if self.poll() {
                self.cancel(entry.node);
                continue;
            }
            self.run_path(entry);
        }

        Exploration {
            tree:  self.tree,
            stats: self.stats,
        }
    }

    /// Executes one pending path until it halts, forks, or is abandoned.
    fn run_path(&mut self, mut entry: FrontierEntry) {
        let mut offset = entry.block;

        loop {
            if self.poll() {
                self.cancel(entry.node);
                return;
            }

            let Some(block) = self.graph.block_at(offset) else {
                self.tree.set_status(entry.node, NodeStatus::FeasibleLeaf);
                return;
            };

            if block.instructions()[0].opcode() == Opcode::JumpDest {
                let visits = entry.visits.entry(offset).or_insert(0);
                *visits += 1;
                if *visits > self.config.loop_visit_bound {
                    self.tree.set_status(entry.node, NodeStatus::UnknownBounded);
                    self.stats.bound_exceeded += 1;
                    return;
                }
            }

            // The popped jump target and, for JUMPI, the branch condition
            // with the offset of the jump itself.
            let mut jump_target = AbstractValue::Unknown;
            let mut branch = None;
            for instruction in block.instructions() {
                match instruction.opcode().category() {
                    Category::UnconditionalJump => {
                        jump_target = entry.stack.pop();
                    }
                    Category::ConditionalJump => {
                        jump_target = entry.stack.pop();
                        branch = Some((instruction.offset(), entry.stack.pop()));
                    }
                    _ => {
                        let _event = entry.stack.apply(instruction);
                    }
                }
            }

            match block.terminator() {
                Terminator::Halt => {
                    self.tree.set_status(entry.node, NodeStatus::FeasibleLeaf);
                    return;
                }
                Terminator::Fallthrough => {
                    match self.edge_target(offset, EdgeKind::Fallthrough) {
                        Some(JumpTarget::Block(next)) => offset = next,
                        _ => {
                            // Execution ran off the end of the bytecode.
                            self.tree.set_status(entry.node, NodeStatus::FeasibleLeaf);
                            return;
                        }
                    }
                }
                Terminator::UnconditionalJump => {
                    let static_edge = self.edge_target(offset, EdgeKind::Unconditional);
                    let next = match static_edge {
                        Some(JumpTarget::Block(next)) => Some(next),
                        _ => self.dynamic_target(jump_target),
                    };
                    match next {
                        Some(next) => offset = next,
                        None => {
                            // The destination is beyond what this path can
                            // determine; the path is feasible up to here and
                            // the graph records the edge as unresolved.
                            self.tree.set_status(entry.node, NodeStatus::FeasibleLeaf);
                            return;
                        }
                    }
                }
                Terminator::ConditionalJump => {
                    let taken = match self.edge_target(offset, EdgeKind::CondTrue) {
                        Some(JumpTarget::Block(next)) => Some(next),
                        _ => self.dynamic_target(jump_target),
                    };
                    let not_taken = match self.edge_target(offset, EdgeKind::CondFalse) {
                        Some(JumpTarget::Block(next)) => Some(next),
                        _ => None,
                    };
                    match branch {
                        Some(branch) => self.fork(entry, branch, taken, not_taken),
                        // A JUMPI-terminated block always pops its condition
                        // during the walk above.
                        None => self.tree.set_status(entry.node, NodeStatus::FeasibleLeaf),
                    }
                    return;
                }
            }
        }
    }

    /// Forks the path `entry` at a conditional jump, consulting the solver
    /// for the taken branch first and the not-taken branch second.
    fn fork(
        &mut self,
        entry: FrontierEntry,
        branch: (u32, AbstractValue),
        taken: Option<u32>,
        not_taken: Option<u32>,
    ) {
        if entry.depth >= self.config.branch_depth_bound {
            self.tree.set_status(entry.node, NodeStatus::UnknownBounded);
            self.stats.bound_exceeded += 1;
            return;
        }

        let (site, condition) = branch;
        let truthy = Predicate::truthy(site, condition);
        let mut children = 0;
        for (predicate, target) in [(truthy, taken), (truthy.negated(), not_taken)] {
            let mut constraints = entry.constraints.clone();
            constraints.push(predicate);

            self.stats.solver_queries += 1;
            match self.solver.check(&constraints) {
                SolverOutcome::Unsatisfiable => {
                    self.stats.pruned_branches += 1;
                }
                SolverOutcome::Unknown => {
                    self.tree
                        .add_child(entry.node, predicate, NodeStatus::UnknownBounded);
                    self.stats.solver_unknowns += 1;
                    children += 1;
                }
                SolverOutcome::Satisfiable => {
                    children += 1;
                    match target {
                        Some(block) => {
                            let node =
                                self.tree.add_child(entry.node, predicate, NodeStatus::Open);
                            self.frontier.push_back(FrontierEntry {
                                node,
                                block,
                                stack: entry.stack.clone(),
                                constraints,
                                depth: entry.depth + 1,
                                visits: entry.visits.clone(),
                            });
                        }
                        None => {
                            // Satisfiable, but the branch destination cannot
                            // be followed.
                            self.tree.add_child(
                                entry.node,
                                predicate,
                                NodeStatus::FeasibleLeaf,
                            );
                        }
                    }
                }
            }
        }

        // With both branches refuted the path cannot continue, making the
        // fork point itself the end of a feasible path.
        let status = if children == 0 {
            NodeStatus::FeasibleLeaf
        } else {
            NodeStatus::Branched
        };
        self.tree.set_status(entry.node, status);
    }

    /// Resolves a pending path to an unknown-bounded leaf after the watchdog
    /// has demanded a stop.
    fn cancel(&mut self, node: NodeId) {
        self.tree.set_status(node, NodeStatus::UnknownBounded);
        self.stats.cancelled_paths += 1;
    }

    /// Polls the watchdog at its requested cadence, returning true once a
    /// stop has been demanded.
    fn poll(&mut self) -> bool {
        if !self.cancelled
            && self.polls % self.watchdog.poll_every().max(1) == 0
            && self.watchdog.should_stop()
        {
            self.cancelled = true;
        }
        self.polls = self.polls.wrapping_add(1);
        self.cancelled
    }

    /// Gets the target of the edge of `kind` leaving the block at `source`,
    /// if the graph has one.
    fn edge_target(&self, source: u32, kind: EdgeKind) -> Option<JumpTarget> {
        self.graph
            .edges_from(source)
            .find(|edge| edge.kind == kind)
            .map(|edge| edge.target)
    }

    /// Resolves a jump target the graph could not: the popped target value
    /// may be a literal pushed in an earlier block along this path.
    fn dynamic_target(&self, target: AbstractValue) -> Option<u32> {
        let word = target.as_known()?;
        if crate::cfg::builder::is_jump_destination(word, self.graph.blocks()) {
            u32::try_from(word).ok()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use crate::{
        cfg::ControlFlowGraph,
        disassembly::InstructionStream,
        explorer::{
            tree::{NodeId, NodeStatus},
            Config, Exploration, SymbolicExplorer,
        },
        solver::{ConstantFoldingSolver, DynSolver, Predicate, Solver, SolverOutcome},
        watchdog::{FlagWatchdog, LazyWatchdog},
    };

    /// PUSH1 0x00; CALLDATALOAD; PUSH1 0x07; JUMPI; STOP; JUMPDEST; STOP —
    /// a single fork on a genuinely symbolic condition.
    const SYMBOLIC_FORK: &[u8] = &[0x60, 0x00, 0x35, 0x60, 0x07, 0x57, 0x00, 0x5b, 0x00];

    /// PUSH1 0x00; PUSH1 0x06; JUMPI; STOP; JUMPDEST; STOP — a fork whose
    /// condition is the literal zero.
    const LITERAL_FALSE_FORK: &[u8] = &[0x60, 0x00, 0x60, 0x06, 0x57, 0x00, 0x5b, 0x00];

    /// JUMPDEST; PUSH1 0x00; JUMP — an unconditional self-loop.
    const SELF_LOOP: &[u8] = &[0x5b, 0x60, 0x00, 0x56];

    fn explore(bytes: &[u8], config: Config, solver: DynSolver) -> Exploration {
        let stream = InstructionStream::try_from(bytes).expect("Parsing failed");
        let graph = ControlFlowGraph::new(&stream);
        SymbolicExplorer::new(&graph, config, solver, LazyWatchdog.in_arc()).explore()
    }

    #[test]
    fn straight_line_code_yields_a_single_feasible_leaf() {
        // PUSH1 0x2a; POP; STOP
        let result = explore(
            &[0x60, 0x2a, 0x50, 0x00],
            Config::default(),
            ConstantFoldingSolver.in_arc(),
        );

        assert_eq!(result.tree.len(), 1);
        assert_eq!(result.tree.root().status(), NodeStatus::FeasibleLeaf);
        assert_eq!(result.stats.solver_queries, 0);
        assert_eq!(result.stats.pruned_branches, 0);
    }

    #[test]
    fn a_symbolic_fork_produces_two_children_and_prunes_nothing() {
        let result = explore(
            SYMBOLIC_FORK,
            Config::default(),
            ConstantFoldingSolver.in_arc(),
        );

        let root = result.tree.root();
        assert_eq!(root.status(), NodeStatus::Branched);
        assert_eq!(root.children().len(), 2);
        for child in root.children() {
            assert_eq!(result.tree.node(*child).status(), NodeStatus::FeasibleLeaf);
        }
        assert_eq!(result.stats.solver_queries, 2);
        assert_eq!(result.stats.pruned_branches, 0);
    }

    #[test]
    fn the_taken_branch_is_examined_before_the_not_taken_branch() {
        let result = explore(
            SYMBOLIC_FORK,
            Config::default(),
            ConstantFoldingSolver.in_arc(),
        );

        let children = result.tree.root().children();
        let first = result.tree.node(children[0]).constraint().unwrap();
        let second = result.tree.node(children[1]).constraint().unwrap();
        assert!(first.assert_true);
        assert!(!second.assert_true);
        assert!(children[0] < children[1]);
    }

    #[test]
    fn a_literal_false_condition_prunes_the_taken_branch() {
        let result = explore(
            LITERAL_FALSE_FORK,
            Config::default(),
            ConstantFoldingSolver.in_arc(),
        );

        let root = result.tree.root();
        assert_eq!(root.status(), NodeStatus::Branched);
        assert_eq!(root.children().len(), 1);

        let survivor = result.tree.node(root.children()[0]);
        assert!(!survivor.constraint().unwrap().assert_true);
        assert_eq!(survivor.status(), NodeStatus::FeasibleLeaf);
        assert_eq!(result.stats.pruned_branches, 1);
        assert_eq!(result.stats.solver_queries, 2);
    }

    #[test]
    fn a_loop_terminates_under_the_visit_bound() {
        let result = explore(
            SELF_LOOP,
            Config::default().with_loop_visit_bound(0),
            ConstantFoldingSolver.in_arc(),
        );

        assert_eq!(result.tree.len(), 1);
        assert_eq!(result.tree.root().status(), NodeStatus::UnknownBounded);
        assert_eq!(result.stats.bound_exceeded, 1);
    }

    #[test]
    fn a_loop_terminates_under_the_default_bounds_too() {
        let result = explore(SELF_LOOP, Config::default(), ConstantFoldingSolver.in_arc());

        assert_eq!(result.tree.root().status(), NodeStatus::UnknownBounded);
        assert_eq!(result.stats.bound_exceeded, 1);
    }

    #[test]
    fn the_depth_bound_abandons_paths_before_they_fork() {
        let result = explore(
            SYMBOLIC_FORK,
            Config::default().with_branch_depth_bound(0),
            ConstantFoldingSolver.in_arc(),
        );

        assert_eq!(result.tree.len(), 1);
        assert_eq!(result.tree.root().status(), NodeStatus::UnknownBounded);
        assert_eq!(result.stats.bound_exceeded, 1);
        assert_eq!(result.stats.solver_queries, 0);
    }

    #[test]
    fn an_undecided_solver_degrades_branches_to_unknown_bounded() {
        #[derive(Debug)]
        struct UndecidedSolver;

        impl Solver for UndecidedSolver {
            fn check(&self, _predicates: &[Predicate]) -> SolverOutcome {
                SolverOutcome::Unknown
            }
        }

        let result = explore(
            SYMBOLIC_FORK,
            Config::default(),
            Arc::new(UndecidedSolver),
        );

        let root = result.tree.root();
        assert_eq!(root.status(), NodeStatus::Branched);
        assert_eq!(root.children().len(), 2);
        for child in root.children() {
            assert_eq!(
                result.tree.node(*child).status(),
                NodeStatus::UnknownBounded
            );
        }
        assert_eq!(result.stats.solver_unknowns, 2);
        assert_eq!(result.stats.pruned_branches, 0);
    }

    #[test]
    fn cancellation_resolves_the_pending_frontier() {
        let flag = Arc::new(AtomicBool::new(true));
        let watchdog = FlagWatchdog::new(flag.clone()).polling_every(1).in_arc();

        let stream = InstructionStream::try_from(SYMBOLIC_FORK).expect("Parsing failed");
        let graph = ControlFlowGraph::new(&stream);
        let result =
            SymbolicExplorer::new(&graph, Config::default(), ConstantFoldingSolver.in_arc(), watchdog)
                .explore();

        assert_eq!(result.tree.root().status(), NodeStatus::UnknownBounded);
        assert_eq!(result.stats.cancelled_paths, 1);
        for node in result.tree.nodes() {
            assert_ne!(node.status(), NodeStatus::Open);
        }

        flag.store(false, Ordering::SeqCst);
    }

    #[test]
    fn exploration_is_deterministic() {
        let first = explore(
            SYMBOLIC_FORK,
            Config::default(),
            ConstantFoldingSolver.in_arc(),
        );
        let second = explore(
            SYMBOLIC_FORK,
            Config::default(),
            ConstantFoldingSolver.in_arc(),
        );

        let first_table =
            serde_json::to_string(&first.tree.node_table()).expect("Serialization failed");
        let second_table =
            serde_json::to_string(&second.tree.node_table()).expect("Serialization failed");
        assert_eq!(first_table, second_table);
        assert_eq!(first.stats, second.stats);
    }

    #[test]
    fn a_jump_through_a_path_carried_literal_resolves_dynamically() {
        // PUSH1 0x07; PUSH1 0x05; JUMP; JUMPDEST; JUMP; JUMPDEST; STOP —
        // the second JUMP consumes the literal pushed before the first, so
        // the graph records its edge as unresolved but the path can follow
        // it.
        let bytes = [0x60, 0x07, 0x60, 0x05, 0x56, 0x5b, 0x56, 0x5b, 0x00];
        let stream = InstructionStream::try_from(bytes.as_slice()).expect("Parsing failed");
        let graph = ControlFlowGraph::new(&stream);
        assert!(graph.has_unresolved_edges());

        let result = SymbolicExplorer::new(
            &graph,
            Config::default(),
            ConstantFoldingSolver.in_arc(),
            LazyWatchdog.in_arc(),
        )
        .explore();

        assert_eq!(result.tree.len(), 1);
        assert_eq!(result.tree.root().status(), NodeStatus::FeasibleLeaf);
        assert_eq!(result.stats.bound_exceeded, 0);
    }

    #[test]
    fn the_node_table_of_a_fork_round_trips_to_json() {
        let result = explore(
            LITERAL_FALSE_FORK,
            Config::default(),
            ConstantFoldingSolver.in_arc(),
        );

        let table = result.tree.node_table();
        let json = serde_json::to_string(&table).expect("Serialization failed");
        assert!(json.contains("Branched"));
        assert!(json.contains("cond@4"));
        assert_eq!(result.tree.root().id(), NodeId::ROOT);
    }
}
