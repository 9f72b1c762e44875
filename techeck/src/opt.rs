use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tessera::{Config, Mode};

/// New contents for a file that was loaded before.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Revision {
    /// the file to edit
    pub file: PathBuf,
    /// the file that contains the new contents
    pub with: PathBuf,
}

impl core::str::FromStr for Revision {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((file, with)) if !file.is_empty() && !with.is_empty() => Ok(Self {
                file: file.into(),
                with: with.into(),
            }),
            _ => Err("expected FILE=NEW, got: ".to_owned() + s),
        }
    }
}

#[derive(Clone, Debug, Parser)]
/// Replay edits of source files and report incremental typechecking results
pub struct Opt {
    /// Amount of checking after every edit
    ///
    /// Possible values are: off, dumb, smart.
    #[clap(long, default_value = "smart")]
    pub mode: Mode,

    /// Maximal number of seconds to typecheck a group of definitions
    ///
    /// A value of 0 disables the time limit.
    #[clap(long, value_name = "SECS", default_value_t = 5)]
    pub time_limit: u64,

    /// Number of timeouts after which a definition is not typechecked any more
    ///
    /// A value of 0 disables blacklisting.
    #[clap(long, default_value_t = 3)]
    pub retry_budget: u32,

    /// Typecheck definitions after the last modified one only if it has no errors
    #[clap(long)]
    pub only_last: bool,

    /// Typecheck concurrently
    ///
    /// If this option is given with a number n, then
    /// n background workers typecheck and
    /// the members of a group are checked by n threads.
    /// If this option is given without an extra argument, then
    /// the number of threads is determined automatically from the number of CPUs.
    #[clap(long, short = 'j')]
    pub jobs: Option<Option<usize>>,

    /// Print resolution and typechecking events
    #[clap(long)]
    pub echo: bool,

    /// Print the dependency graph of all definitions in DOT format
    #[clap(long)]
    pub dot: bool,

    /// Edit a loaded file, replacing its contents by those of another file
    ///
    /// Revisions are applied in the given order, after all files were loaded.
    #[clap(long, short = 'r', value_name = "FILE=NEW")]
    pub revision: Vec<Revision>,

    /// Files to load
    ///
    /// Every file is opened as an editing session of a module
    /// corresponding to the file path.
    #[clap(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,
}

impl Opt {
    /// Number of background workers.
    pub fn workers(&self) -> usize {
        match self.jobs {
            None => 1,
            Some(Some(jobs)) => jobs,
            Some(None) => rayon::current_num_threads(),
        }
    }

    pub fn config(&self) -> Config {
        Config {
            mode: self.mode,
            time_limit: (self.time_limit > 0).then(|| Duration::from_secs(self.time_limit)),
            retry_budget: self.retry_budget,
            typecheck_only_last: self.only_last,
            workers: self.workers(),
        }
    }
}

#[test]
fn options() {
    let args = ["techeck", "A.te", "-r", "A.te=A2.te", "-j", "--mode", "dumb"];
    let opt = Opt::parse_from(args);
    assert_eq!(opt.mode, Mode::Dumb);
    assert_eq!(opt.jobs, Some(None));
    assert_eq!(opt.files, [PathBuf::from("A.te")]);
    let revision = Revision {
        file: "A.te".into(),
        with: "A2.te".into(),
    };
    assert_eq!(opt.revision, [revision]);

    let config = Opt::parse_from(["techeck", "--time-limit", "0", "A.te"]).config();
    assert_eq!(config.time_limit, None);
    assert_eq!(config.workers, 1);
    assert!("A.te".parse::<Revision>().is_err());
}
