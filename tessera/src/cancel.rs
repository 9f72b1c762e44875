//! Cooperative cancellation and time limits.
//!
//! Long-running operations receive a [`Cancel`] token and
//! poll it at their checkpoints; nothing is ever aborted from the outside.

use core::fmt::{self, Display};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation flag.
///
/// All clones of a token observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct Cancel(Arc<AtomicBool>);

/// Signal that an operation was cancelled.
///
/// This is not a failure: the operation left all state it committed intact.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Cancelled;

impl Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        "operation was cancelled".fmt(f)
    }
}

impl Cancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Checkpoint: fail if the token was cancelled.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Reason why typechecking of a definition stopped before it finished.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    /// The time limit, which was exceeded.
    TimedOut(Duration),
}

impl From<Cancelled> for Interrupt {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Cancelled => Cancelled.fmt(f),
            Self::TimedOut(limit) => write!(f, "time limit of {:?} exceeded", limit),
        }
    }
}

/// Cancellation token combined with a wall-clock limit.
///
/// A checker polls [`Checkpoint::check`] inside long-running computations.
pub struct Checkpoint<'a> {
    cancel: &'a Cancel,
    start: Instant,
    limit: Option<Duration>,
}

impl<'a> Checkpoint<'a> {
    /// Start the clock now.
    pub fn new(cancel: &'a Cancel, limit: Option<Duration>) -> Self {
        let start = Instant::now();
        Self {
            cancel,
            start,
            limit,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Fail if the token was cancelled or the time limit was exceeded.
    ///
    /// Cancellation takes precedence over the time limit.
    pub fn check(&self) -> Result<(), Interrupt> {
        self.cancel.check()?;
        match self.limit {
            Some(limit) if self.elapsed() > limit => Err(Interrupt::TimedOut(limit)),
            _ => Ok(()),
        }
    }
}

#[test]
fn clones_share_flag() {
    let cancel = Cancel::new();
    let other = cancel.clone();
    assert_eq!(other.check(), Ok(()));
    cancel.cancel();
    assert_eq!(other.check(), Err(Cancelled));
}

#[test]
fn checkpoint() {
    let cancel = Cancel::new();
    let point = Checkpoint::new(&cancel, Some(Duration::ZERO));
    std::thread::sleep(Duration::from_millis(2));
    assert_eq!(point.check(), Err(Interrupt::TimedOut(Duration::ZERO)));

    let unlimited = Checkpoint::new(&cancel, None);
    assert_eq!(unlimited.check(), Ok(()));
    cancel.cancel();
    assert_eq!(point.check(), Err(Interrupt::Cancelled));
}
