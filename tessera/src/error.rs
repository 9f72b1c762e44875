//! Common error type.

use crate::cancel::Cancelled;
use core::fmt::{self, Display};

/// Common error type.
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// The operation was cancelled by its caller.
    Cancelled,
    /// The task queue no longer accepts tasks.
    QueueClosed,
}

impl From<Cancelled> for Error {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Cancelled => Cancelled.fmt(f),
            Self::QueueClosed => "task queue is closed".fmt(f),
        }
    }
}

impl std::error::Error for Error {}
