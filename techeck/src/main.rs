//! Replay edits of source files and report incremental typechecking results.

use clap::Parser;
use techeck::{run, Error, Opt};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env("LOG").init();

    let opt = Opt::parse();

    // if a precise number of parallel jobs has been given
    if let Some(Some(jobs)) = opt.jobs {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(jobs).build_global() {
            log::warn!("Could not configure thread pool: {}", e)
        }
    }

    let failed = run(&opt)?;
    if failed > 0 {
        log::info!("{} definitions with errors", failed);
        std::process::exit(1)
    }
    Ok(())
}
