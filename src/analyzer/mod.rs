//! This module contains the definition of the analyzer itself.

pub mod state;

use crate::{
    analyzer::state::State,
    cfg::ControlFlowGraph,
    disassembly::InstructionStream,
    error,
    explorer,
    explorer::SymbolicExplorer,
    solver::DynSolver,
    storage,
    watchdog::DynWatchdog,
};

/// Creates a new analyzer wrapping the provided `bytecode`.
pub fn new(bytecode: Vec<u8>) -> Analyzer<state::HasBytecode> {
    let state = state::HasBytecode;
    Analyzer { bytecode, state }
}

/// The core of the bytecode analysis, the `Analyzer` is responsible for
/// ingesting raw bytecode and outputting the control-flow graph, the
/// per-block storage access classification, and the symbolic execution tree.
///
/// # Basic Usage
///
/// For the most basic usage of the library, it is sufficient to construct an
/// `Analyzer` and call the `.analyze` method, passing the solver and
/// watchdog to use.
///
/// # Enforcing Valid State Transitions
///
/// The analyzer enforces that only correct state transitions can occur
/// through use of structs that implement the exact state required by it at
/// any given point.
///
/// There is the [`Self::state`] function that provides access to the state
/// data of whichever state it is in.
pub struct Analyzer<S: State> {
    /// The bytecode that is being analyzed.
    bytecode: Vec<u8>,

    /// The internal state of the analyzer.
    state: S,
}

/// Safe operations available in all states.
impl<S: State> Analyzer<S> {
    /// Gets a reference to the bytecode being analyzed.
    pub fn bytecode(&self) -> &[u8] {
        self.bytecode.as_slice()
    }

    /// Gets a reference to the current state of the analyzer.
    pub fn state(&self) -> &S {
        &self.state
    }
}

/// Unsafe operations available in all states.
///
/// These operations are capable of **violating the state invariants** of the
/// analyzer, and must be used with the _utmost_ care.
impl<S: State> Analyzer<S> {
    /// Gets a mutable reference to the current state of the analyzer.
    ///
    /// # Safety
    ///
    /// Do not mutate the state instance unless you totally understand the
    /// state that the analyzer is in, and the implications of doing so.
    pub unsafe fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Forces the analyzer into `new_state`, disregarding any safety with
    /// regards to state transitions.
    ///
    /// # Safety
    ///
    /// Do not force a state transition for the analyzer unless you totally
    /// understand the state that the analyzer is in, and the implications
    /// of doing so.
    pub unsafe fn set_state<NS: State>(self, new_state: NS) -> Analyzer<NS> {
        Analyzer {
            bytecode: self.bytecode,
            state:    new_state,
        }
    }

    /// Forces the analyzer into the state `NS`, with the value of the state
    /// created by applying `transform` to the analyzer's current state and
    /// disregarding any safety with regard to state transitions.
    ///
    /// # Safety
    ///
    /// Do not force a state transition for the analyzer unless you totally
    /// understand the state that the analyzer is in, and the implications
    /// of doing so.
    pub unsafe fn transform_state<NS: State>(
        self,
        transform: impl FnOnce(S) -> error::Result<NS>,
    ) -> error::Result<Analyzer<NS>> {
        let state = transform(self.state)?;
        let bytecode = self.bytecode;

        Ok(Analyzer { state, bytecode })
    }
}

/// Operations available on a newly-created analyzer.
impl Analyzer<state::HasBytecode> {
    /// Executes the analysis process from beginning to end, performing all
    /// the intermediate steps automatically.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the bytecode cannot be disassembled. Conditions
    /// arising later in the pipeline are represented in the returned data
    /// structures instead.
    pub fn analyze(
        self,
        config: explorer::Config,
        solver: DynSolver,
        watchdog: DynWatchdog,
    ) -> error::Result<Analyzer<state::ExplorationComplete>> {
        let analyzer = self.disassemble()?;
        let analyzer = analyzer.build_cfg()?;
        let analyzer = analyzer.analyze_accesses()?;
        let analyzer = analyzer.explore(config, solver, watchdog)?;

        Ok(analyzer)
    }

    /// Performs the disassembly process to turn the input bytes into a
    /// contiguous instruction stream.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the bytecode is empty or exceeds the maximum
    /// representable size.
    pub fn disassemble(self) -> error::Result<Analyzer<state::DisassemblyComplete>> {
        let instructions = InstructionStream::try_from(self.bytecode.as_slice())?;
        let state = state::DisassemblyComplete { instructions };
        Ok(unsafe { self.set_state(state) })
    }
}

/// Operations available on an analyzer that has completed the disassembly of
/// the bytecode.
impl Analyzer<state::DisassemblyComplete> {
    /// Partitions the instruction stream into basic blocks and derives the
    /// typed edges between them.
    ///
    /// # Errors
    ///
    /// This transition cannot currently fail; unresolvable jumps are
    /// recorded in the graph itself as unresolved edges.
    pub fn build_cfg(self) -> error::Result<Analyzer<state::CfgComplete>> {
        unsafe {
            self.transform_state(|old_state| {
                let graph = ControlFlowGraph::new(&old_state.instructions);
                Ok(state::CfgComplete {
                    instructions: old_state.instructions,
                    graph,
                })
            })
        }
    }
}

/// Operations available on an analyzer that has built the control-flow
/// graph.
impl Analyzer<state::CfgComplete> {
    /// Classifies the storage accesses of every block in the graph.
    ///
    /// # Errors
    ///
    /// This transition cannot currently fail; accesses whose slot cannot be
    /// determined are classified as unknown rather than rejected.
    pub fn analyze_accesses(self) -> error::Result<Analyzer<state::AccessAnalysisComplete>> {
        unsafe {
            self.transform_state(|old_state| {
                let accesses = storage::analyze(&old_state.graph);
                Ok(state::AccessAnalysisComplete {
                    instructions: old_state.instructions,
                    graph: old_state.graph,
                    accesses,
                })
            })
        }
    }
}

/// Operations available on an analyzer that has classified the storage
/// accesses of the graph.
impl Analyzer<state::AccessAnalysisComplete> {
    /// Symbolically explores the graph within the bounds in `config`,
    /// consulting `solver` at every fork and polling `watchdog` to allow an
    /// early wind-down.
    ///
    /// # Errors
    ///
    /// This transition cannot currently fail; paths the exploration gives up
    /// on are recorded as unknown-bounded leaves in the returned tree.
    pub fn explore(
        self,
        config: explorer::Config,
        solver: DynSolver,
        watchdog: DynWatchdog,
    ) -> error::Result<Analyzer<state::ExplorationComplete>> {
        unsafe {
            self.transform_state(|old_state| {
                let exploration =
                    SymbolicExplorer::new(&old_state.graph, config, solver, watchdog).explore();
                Ok(state::ExplorationComplete {
                    instructions: old_state.instructions,
                    graph: old_state.graph,
                    accesses: old_state.accesses,
                    exploration,
                })
            })
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        explorer::{tree::NodeStatus, Config},
        solver::ConstantFoldingSolver,
        utility::U256Wrapper,
        watchdog::LazyWatchdog,
    };

    /// PUSH1 0x00; CALLDATALOAD; PUSH1 0x0a; JUMPI; PUSH1 0x00; SSTORE;
    /// STOP; JUMPDEST; STOP — one symbolic fork, with a write to slot zero
    /// on the not-taken branch.
    const FORKING_WRITER: &[u8] = &[
        0x60, 0x00, 0x35, 0x60, 0x0a, 0x57, 0x60, 0x00, 0x55, 0x00, 0x5b, 0x00,
    ];

    #[test]
    fn runs_the_whole_pipeline() -> anyhow::Result<()> {
        let analyzer = crate::new(FORKING_WRITER.to_vec()).analyze(
            Config::default(),
            ConstantFoldingSolver.in_arc(),
            LazyWatchdog.in_arc(),
        )?;
        let results = analyzer.state();

        assert_eq!(results.instructions.byte_len() as usize, FORKING_WRITER.len());
        assert_eq!(results.graph.block_count(), 3);

        // The not-taken branch starts at 6 and writes slot zero.
        let writer = results.accesses.get(&6).expect("Block missing");
        assert!(writer.known_writes().contains(&U256Wrapper::from(0u32)));

        let root = results.exploration.tree.root();
        assert_eq!(root.status(), NodeStatus::Branched);
        assert_eq!(root.children().len(), 2);

        Ok(())
    }

    #[test]
    fn can_be_driven_one_transition_at_a_time() -> anyhow::Result<()> {
        let analyzer = crate::new(FORKING_WRITER.to_vec());
        let analyzer = analyzer.disassemble()?;
        assert_eq!(
            analyzer.state().instructions.byte_len() as usize,
            FORKING_WRITER.len()
        );

        let analyzer = analyzer.build_cfg()?;
        assert_eq!(analyzer.state().graph.entry_block().start(), 0);

        let analyzer = analyzer.analyze_accesses()?;
        assert_eq!(analyzer.state().accesses.len(), 3);

        let analyzer = analyzer.explore(
            Config::default(),
            ConstantFoldingSolver.in_arc(),
            LazyWatchdog.in_arc(),
        )?;
        assert!(analyzer.state().exploration.tree.len() >= 3);

        Ok(())
    }

    #[test]
    fn rejects_empty_bytecode() {
        let result = crate::new(Vec::new()).disassemble();
        assert!(result.is_err());
    }
}
