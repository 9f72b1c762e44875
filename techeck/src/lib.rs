//! Replay edits of source files and report incremental typechecking results.

mod echo;
mod error;
mod opt;
mod path_read;
pub mod report;

pub use echo::Echo;
pub use error::Error;
pub use opt::{Opt, Revision};
pub use path_read::PathRead;

use std::path::PathBuf;
use std::sync::Arc;
use tessera::check::Shallow;
use tessera::observe::{Ignore, Observer};
use tessera::{Cancel, Engine, Session, Update};

/// Wait for the typechecking of an update and log its outcome.
fn settle(update: Update) {
    let stamp = update.stamp;
    match update.wait() {
        Some(Ok(report)) => log::info!(
            "Typechecked {} definitions at stamp {} with {} checker calls",
            report.outcomes.len(),
            stamp,
            report.invocations
        ),
        Some(Err(cancelled)) => log::warn!("Typechecking at stamp {}: {}", stamp, cancelled),
        None => log::debug!("Nothing typechecked at stamp {}", stamp),
    }
}

/// Load all files, apply all revisions and print the results.
///
/// Return the number of definitions with errors.
pub fn run(opt: &Opt) -> Result<usize, Error> {
    let observer: Arc<dyn Observer> = if opt.echo {
        Arc::new(Echo)
    } else {
        Arc::new(Ignore)
    };
    let shallow = |store: &Arc<tessera::Store>| -> Arc<dyn tessera::check::Checker> {
        Arc::new(Shallow::new(store.clone()))
    };
    let engine = Engine::with(opt.config(), shallow, observer);

    let mut sessions: Vec<(PathBuf, Session)> = Vec::new();
    for file in &opt.files {
        let pr = PathRead::from_path(file)?;
        log::info!("Open {}", file.display());
        let mut session = engine.session(pr.path);
        let group = tessera_syntax::parse(&pr.text);
        settle(session.update(&group, &Cancel::new())?);
        sessions.push((file.clone(), session))
    }

    for rev in &opt.revision {
        let session = sessions.iter_mut().find(|(file, _)| *file == rev.file);
        let (_, session) = session.ok_or_else(|| Error::Revision(rev.file.display().to_string()))?;
        log::info!("Revise {} with {}", rev.file.display(), rev.with.display());
        let text = std::fs::read_to_string(&rev.with)?;
        let group = tessera_syntax::parse(&text);
        settle(session.update(&group, &Cancel::new())?);
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut failed = 0;
    for (_, session) in &sessions {
        failed += report::session(&mut out, &engine, session)?;
    }
    if opt.dot {
        report::dot(&mut out, &engine)?;
    }
    Ok(failed)
}
