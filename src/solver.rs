//! This module contains the type definitions for the constraint-solver
//! capability consumed by the symbolic explorer.
//!
//! # An Injected Oracle
//!
//! The solver is never a concrete dependency baked into the explorer: it is
//! an interface the caller injects, allowing any compatible backend to be
//! substituted. The explorer treats it as opaque and potentially slow or
//! unreliable—a call that cannot produce an answer (including one that runs
//! past whatever internal time budget the implementation enforces) must
//! report [`SolverOutcome::Unknown`] rather than blocking forever or
//! panicking; the explorer degrades the affected subtree instead of failing
//! the analysis.

use std::{fmt::Debug, sync::Arc};

use crate::value::AbstractValue;

/// A dynamically dispatched [`Solver`] instance.
///
/// It is shared via [`Arc`] so that sibling subtrees can be explored from
/// independent worker tasks against the same oracle.
pub type DynSolver = Arc<dyn Solver + Send + Sync>;

/// The answer an oracle gives for a conjunction of predicates.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SolverOutcome {
    /// The conjunction has at least one satisfying assignment.
    Satisfiable,

    /// The conjunction has no satisfying assignment.
    Unsatisfiable,

    /// The oracle could not decide within its budget; the caller must treat
    /// the conjunction as undetermined, never as unsatisfiable.
    Unknown,
}

/// A single branch predicate: the assertion that the condition observed at a
/// conditional jump is truthy (non-zero) or falsy (zero).
///
/// The conjunction of the predicates from the tree root to a node is the
/// precondition under which that node's code path executes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Predicate {
    /// The byte offset of the conditional jump that contributed this
    /// predicate.
    pub branch_site: u32,

    /// The abstract value of the condition operand at the branch.
    pub condition: AbstractValue,

    /// The asserted polarity: `true` asserts the condition is non-zero (the
    /// jump is taken), `false` that it is zero.
    pub assert_true: bool,
}

impl Predicate {
    /// Constructs the predicate asserting that `condition`, observed at the
    /// jump at `branch_site`, is non-zero.
    #[must_use]
    pub fn truthy(branch_site: u32, condition: AbstractValue) -> Self {
        Self {
            branch_site,
            condition,
            assert_true: true,
        }
    }

    /// Gets the predicate with the opposite polarity at the same branch.
    #[must_use]
    pub fn negated(&self) -> Self {
        Self {
            branch_site: self.branch_site,
            condition:   self.condition,
            assert_true: !self.assert_true,
        }
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let relation = if self.assert_true { "!=" } else { "==" };
        write!(
            f,
            "cond@{} ({}) {relation} 0",
            self.branch_site, self.condition
        )
    }
}

/// The interface to an external decision procedure for branch predicates.
///
/// Implementations wrapping a real SMT backend should enforce their own
/// per-call timeout and map expiry to [`SolverOutcome::Unknown`].
pub trait Solver
where
    Self: Debug,
{
    /// Decides the satisfiability of the conjunction of `predicates`.
    #[must_use]
    fn check(&self, predicates: &[Predicate]) -> SolverOutcome;
}

/// The built-in default oracle.
///
/// It decides exactly those conjunctions whose conditions are known
/// literals: a predicate over a known word is evaluated directly, and a
/// conjunction containing a violated literal predicate is unsatisfiable.
/// Predicates over genuinely symbolic conditions are assumed satisfiable,
/// the same over-approximation the storage-access classification makes for
/// unknown slots. It never answers [`SolverOutcome::Unknown`], which makes
/// explorations using it fully deterministic.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ConstantFoldingSolver;

impl ConstantFoldingSolver {
    /// Wraps `self` into a [`DynSolver`].
    #[must_use]
    pub fn in_arc(self) -> DynSolver {
        Arc::new(self)
    }
}

impl Solver for ConstantFoldingSolver {
    fn check(&self, predicates: &[Predicate]) -> SolverOutcome {
        for predicate in predicates {
            if let Some(word) = predicate.condition.as_known() {
                let truthy = word != ethnum::U256::ZERO;
                if truthy != predicate.assert_true {
                    return SolverOutcome::Unsatisfiable;
                }
            }
        }

        SolverOutcome::Satisfiable
    }
}
