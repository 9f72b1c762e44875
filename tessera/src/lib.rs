#![forbid(unsafe_code)]

//! Incremental name resolution, dependency ordering and background typechecking.
//!
//! This library keeps the definitions of a set of edited source files
//! resolved and typechecked while they change.
//!
//! # Usage
//!
//! Every edited file is an editing [`Session`] of an [`Engine`].
//! Whenever the text of a file changes, the new version is parsed and
//! passed to [`Session::update`], which
//! resolves names of changed definitions,
//! invalidates the results of everything that depends on them, and
//! schedules the typechecking of all definitions that need it.
//! Typechecking runs on background workers;
//! its results are stored per definition and
//! never overwrite results of newer edits.
//!
//! ~~~
//! use tessera::{Cancel, Config, Engine, Status};
//!
//! let engine = Engine::new(Config::default());
//! let mut session = engine.session(vec!["Main".to_string()]);
//!
//! let src = "data Nat | zero | suc Nat. def two : Nat := suc (suc zero).";
//! let group = tessera_syntax::parse(src);
//! let update = session.update(&group, &Cancel::new())?;
//! assert_eq!(update.changed.len(), 4);
//! update.wait();
//!
//! let two = engine.find("Main.two").unwrap();
//! assert_eq!(engine.status(two), Status::TypecheckedOk);
//!
//! // nothing to do for unchanged text
//! let update = session.update(&group, &Cancel::new())?;
//! assert!(update.changed.is_empty() && !update.is_scheduled());
//! # Ok::<_, tessera::Error>(())
//! ~~~
//!
//! # Organisation
//!
//! The data flows through the modules as follows:
//! * [`concrete`] desugars syntax into drafts,
//! * [`resolve`] turns drafts into concrete definitions using a [`namespace`],
//! * [`provider`] caches concrete definitions and detects changes,
//! * [`order`] sorts definitions into groups of mutually recursive definitions,
//! * [`typecheck`] runs a [`check::Checker`] on these groups and
//!   commits the results to the [`store`].
//!
//! Events of resolution and typechecking are reported to [`observe::Observer`]s,
//! one of which collects [`Diagnostics`].

pub mod blacklist;
pub mod cancel;
pub mod check;
pub mod concrete;
mod config;
pub mod diagnostics;
mod error;
mod locals;
pub mod namespace;
pub mod observe;
pub mod order;
pub mod provider;
pub mod queue;
pub mod resolve;
mod session;
pub mod store;
pub mod typecheck;

pub use cancel::{Cancel, Cancelled, Interrupt};
pub use config::{Config, Mode};
pub use diagnostics::{Diagnostic, Diagnostics, Phase, Severity};
pub use error::Error;
pub use session::{Checked, Engine, Session, Update};
pub use store::{CoreResult, DefId, FullName, Kind, Stamp, Status, Store};
pub use typecheck::{Outcome, Report};
