//! This module contains the type definitions necessary to support
//! cancellation of a running analysis.
//!
//! # Cooperative Cancellation
//!
//! The watchdog is polled at intervals by the symbolic explorer. When it
//! reports that the analysis should stop, the explorer does not error:
//! every pending frontier entry is converted into an `UnknownBounded` leaf
//! and the partially built tree is returned with every node carrying a
//! resolved status. A caller wanting a wall-clock budget implements it as a
//! watchdog that flips once the deadline passes.

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::constant::DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS;

/// A dynamically dispatched [`Watchdog`] instance.
///
/// It is shared via [`Arc`] so the same cancellation signal can be observed
/// from independent worker tasks.
pub type DynWatchdog = Arc<dyn Watchdog + Send + Sync>;

/// The interface to an object that can be polled to see if the analysis
/// needs to wind down.
///
/// The interface is simple, but it can encapsulate arbitrary logic as far as
/// the analyzer is concerned, allowing the client to implement complex stop
/// logic.
pub trait Watchdog
where
    Self: Debug,
{
    /// Checks if the analysis should halt and return its partial results.
    #[must_use]
    fn should_stop(&self) -> bool;

    /// Gets the number of loop iterations the analysis should wait before
    /// polling the watchdog.
    #[must_use]
    fn poll_every(&self) -> usize;
}

/// An implementation of the [`Watchdog`] trait that does not place any
/// restrictions on the execution of the analysis.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LazyWatchdog;

impl LazyWatchdog {
    /// Wraps `self` into an [`Arc`].
    #[must_use]
    pub fn in_arc(self) -> DynWatchdog {
        Arc::new(self)
    }
}

impl Watchdog for LazyWatchdog {
    fn should_stop(&self) -> bool {
        false
    }

    fn poll_every(&self) -> usize {
        // Something ridiculously huge so it basically never gets checked.
        1_000_000_000_000
    }
}

/// A watchdog that tells the analysis when to stop based on a flag in the
/// form of an atomic boolean.
///
/// By default, it requests that the analysis poll for watchdog status every
/// [`DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS`]. This is configurable by
/// calling [`Self::polling_every`].
#[derive(Clone, Debug)]
pub struct FlagWatchdog {
    /// The flag that should be mutated externally to stop the analysis by
    /// this watchdog.
    flag: Arc<AtomicBool>,

    /// The number of loop iterations the analysis should wait before polling
    /// the watchdog.
    poll_loop_iterations: usize,
}

impl FlagWatchdog {
    /// Constructs a new `FlagWatchdog` wrapping the provided `flag`.
    #[must_use]
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        let poll_loop_iterations = DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS;
        Self {
            flag,
            poll_loop_iterations,
        }
    }

    /// Specifies the number of loop iterations that the analysis should wait
    /// before polling the watchdog for status.
    #[must_use]
    pub fn polling_every(mut self, iterations: usize) -> Self {
        self.poll_loop_iterations = iterations;
        self
    }

    /// Wraps the watchdog into an [`Arc`].
    #[must_use]
    pub fn in_arc(self) -> DynWatchdog {
        Arc::new(self)
    }
}

impl Watchdog for FlagWatchdog {
    fn should_stop(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn poll_every(&self) -> usize {
        self.poll_loop_iterations
    }
}
