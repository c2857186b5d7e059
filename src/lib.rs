//! This library implements an analysis of [EVM](https://ethereum.org/en/developers/docs/evm/)-style
//! stack-machine bytecode that recovers its control-flow structure, the
//! storage slots it touches, and a bounded symbolic execution tree over its
//! branches. It is a _best effort_ analysis: wherever a fact cannot be
//! established statically, the analysis says so explicitly rather than
//! guessing.
//!
//! Note that this library is not intended to be nor expected to evolve into a
//! full decompiler for EVM bytecode.
//!
//! # How it Works
//!
//! From a very high level, the analysis is performed as follows:
//!
//! 1. Bytecode is ingested and turned into a
//!    [`disassembly::InstructionStream`]. This is a sequence of
//!    [`opcode::Opcode`]s that is equivalent to the bytecode, with every
//!    byte accounted for.
//! 2. The stream of instructions is partitioned into basic blocks and the
//!    typed edges between them are derived, giving a
//!    [`cfg::ControlFlowGraph`]. Jumps whose destination cannot be
//!    determined statically appear as first-class unresolved edges.
//! 3. Each block's storage accesses are classified into a
//!    [`storage::StorageAccessSet`]: slot addresses that are provably
//!    literal are recorded exactly, and everything else is flagged as an
//!    unknown access rather than dropped.
//! 4. The graph is explored symbolically by the
//!    [`explorer::SymbolicExplorer`] within configurable depth and loop
//!    bounds, consulting an injected [`solver::Solver`] at every conditional
//!    jump to prune infeasible branches. The result is a
//!    [`explorer::tree::SymbolicExecutionTree`] in which every node is
//!    resolved, together with the counts of everything pruned or given up
//!    on.
//!
//! # Basic Usage
//!
//! For the most basic usage of the library, it is sufficient to construct an
//! `Analyzer` and call the `.analyze` method, passing your bytecode.
//!
//! ```
//! use bytecode_path_analyzer as bpa;
//! use bytecode_path_analyzer::{
//!     explorer::{tree::NodeStatus, Config},
//!     solver::ConstantFoldingSolver,
//!     watchdog::LazyWatchdog,
//! };
//!
//! // PUSH1 0x00; CALLDATALOAD; PUSH1 0x07; JUMPI; STOP; JUMPDEST; STOP
//! let bytes = vec![0x60, 0x00, 0x35, 0x60, 0x07, 0x57, 0x00, 0x5b, 0x00];
//!
//! let analyzer = bpa::new(bytes)
//!     .analyze(
//!         Config::default(),
//!         ConstantFoldingSolver.in_arc(),
//!         LazyWatchdog.in_arc(),
//!     )
//!     .unwrap();
//! let results = analyzer.state();
//!
//! assert_eq!(results.graph.block_count(), 3);
//! assert_eq!(results.exploration.tree.root().status(), NodeStatus::Branched);
//! ```

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming

pub mod analyzer;
pub mod cfg;
pub mod constant;
pub mod disassembly;
pub mod error;
pub mod explorer;
pub mod opcode;
pub mod solver;
pub mod storage;
pub mod utility;
pub mod value;
pub mod watchdog;

// Re-exports to provide the library interface.
pub use analyzer::new;
pub use cfg::ControlFlowGraph;
pub use disassembly::InstructionStream;
pub use explorer::tree::SymbolicExecutionTree;
