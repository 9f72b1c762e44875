//! Configuration of the analysis engine.

use core::fmt::{self, Display};
use std::time::Duration;

/// How much checking happens after an edit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Only resolve names.
    Off,
    /// Resolve names and run shallow checks on the editing thread.
    Dumb,
    /// Resolve names and typecheck incrementally in the background.
    Smart,
}

impl core::str::FromStr for Mode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(Self::Off),
            "dumb" => Ok(Self::Dumb),
            "smart" => Ok(Self::Smart),
            _ => Err("unknown mode: ".to_owned() + s),
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Off => "off",
            Self::Dumb => "dumb",
            Self::Smart => "smart",
        }
        .fmt(f)
    }
}

/// Engine configuration.
///
/// ~~~
/// # use tessera::{Config, Mode};
/// let config = Config::default();
/// assert_eq!(config.mode, Mode::Smart);
/// assert_eq!(config.retry_budget, 3);
/// assert_eq!("dumb".parse(), Ok(Mode::Dumb));
/// ~~~
#[derive(Clone, Debug)]
pub struct Config {
    pub mode: Mode,
    /// maximal time to typecheck one group of definitions
    pub time_limit: Option<Duration>,
    /// number of timeouts after which a definition is blacklisted
    /// (zero disables blacklisting)
    pub retry_budget: u32,
    /// typecheck the rest of a batch only if
    /// the last modified definition has no errors
    pub typecheck_only_last: bool,
    /// number of background workers
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Smart,
            time_limit: Some(Duration::from_secs(5)),
            retry_budget: 3,
            typecheck_only_last: false,
            workers: 1,
        }
    }
}
