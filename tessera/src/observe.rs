//! Observation of resolution and typechecking events.
//!
//! The resolver and the typechecker never write diagnostics or
//! presentation data themselves; they report what they find to an [`Observer`].
//! Several observers can be combined with tuples:
//!
//! ~~~
//! use std::sync::Arc;
//! use tessera::observe::{Collect, Observer};
//! use tessera::Diagnostics;
//!
//! let both = (Arc::new(Diagnostics::default()), Arc::new(Collect::default()));
//! both.progress(1, 2);
//! assert_eq!(both.1.events().len(), 1);
//! ~~~

use crate::cancel::Interrupt;
use crate::concrete::Concrete;
use crate::resolve::Resolution;
use crate::store::{CoreResult, DefId, Status};
use parking_lot::Mutex;
use std::sync::Arc;
use tessera_syntax::Ident;

/// Receiver of events, one method per event kind.
///
/// All methods do nothing by default.
/// Observers are shared with background workers, so they take `&self`.
pub trait Observer: Send + Sync {
    fn before_definition_resolved(&self, _def: DefId) {}

    fn definition_resolved(&self, _concrete: &Concrete) {}

    /// A binder introduced a local name.
    fn binding_resolved(&self, _def: DefId, _binder: &Ident) {}

    /// A reference was resolved, possibly only partially.
    fn reference_resolved(&self, _def: DefId, _resolution: &Resolution) {}

    /// A constructor name in a pattern was resolved, possibly only partially.
    fn pattern_resolved(&self, _def: DefId, _resolution: &Resolution) {}

    fn typechecking_started(&self, _concrete: &Concrete) {}

    /// A result was committed to the definition store.
    fn typechecking_finished(&self, _concrete: &Concrete, _result: &CoreResult) {}

    fn typechecking_interrupted(&self, _concrete: &Concrete, _interrupt: Interrupt) {}

    /// A definition timed out too often and
    /// is excluded from automatic typechecking.
    fn blacklisted(&self, _concrete: &Concrete) {}

    /// Number of definitions of a batch that were processed so far.
    fn progress(&self, _done: usize, _total: usize) {}
}

/// Observer that ignores all events.
pub struct Ignore;

impl Observer for Ignore {}

impl<T: Observer + ?Sized> Observer for Arc<T> {
    fn before_definition_resolved(&self, def: DefId) {
        (**self).before_definition_resolved(def)
    }

    fn definition_resolved(&self, concrete: &Concrete) {
        (**self).definition_resolved(concrete)
    }

    fn binding_resolved(&self, def: DefId, binder: &Ident) {
        (**self).binding_resolved(def, binder)
    }

    fn reference_resolved(&self, def: DefId, resolution: &Resolution) {
        (**self).reference_resolved(def, resolution)
    }

    fn pattern_resolved(&self, def: DefId, resolution: &Resolution) {
        (**self).pattern_resolved(def, resolution)
    }

    fn typechecking_started(&self, concrete: &Concrete) {
        (**self).typechecking_started(concrete)
    }

    fn typechecking_finished(&self, concrete: &Concrete, result: &CoreResult) {
        (**self).typechecking_finished(concrete, result)
    }

    fn typechecking_interrupted(&self, concrete: &Concrete, interrupt: Interrupt) {
        (**self).typechecking_interrupted(concrete, interrupt)
    }

    fn blacklisted(&self, concrete: &Concrete) {
        (**self).blacklisted(concrete)
    }

    fn progress(&self, done: usize, total: usize) {
        (**self).progress(done, total)
    }
}

impl<A: Observer, B: Observer> Observer for (A, B) {
    fn before_definition_resolved(&self, def: DefId) {
        self.0.before_definition_resolved(def);
        self.1.before_definition_resolved(def)
    }

    fn definition_resolved(&self, concrete: &Concrete) {
        self.0.definition_resolved(concrete);
        self.1.definition_resolved(concrete)
    }

    fn binding_resolved(&self, def: DefId, binder: &Ident) {
        self.0.binding_resolved(def, binder);
        self.1.binding_resolved(def, binder)
    }

    fn reference_resolved(&self, def: DefId, resolution: &Resolution) {
        self.0.reference_resolved(def, resolution);
        self.1.reference_resolved(def, resolution)
    }

    fn pattern_resolved(&self, def: DefId, resolution: &Resolution) {
        self.0.pattern_resolved(def, resolution);
        self.1.pattern_resolved(def, resolution)
    }

    fn typechecking_started(&self, concrete: &Concrete) {
        self.0.typechecking_started(concrete);
        self.1.typechecking_started(concrete)
    }

    fn typechecking_finished(&self, concrete: &Concrete, result: &CoreResult) {
        self.0.typechecking_finished(concrete, result);
        self.1.typechecking_finished(concrete, result)
    }

    fn typechecking_interrupted(&self, concrete: &Concrete, interrupt: Interrupt) {
        self.0.typechecking_interrupted(concrete, interrupt);
        self.1.typechecking_interrupted(concrete, interrupt)
    }

    fn blacklisted(&self, concrete: &Concrete) {
        self.0.blacklisted(concrete);
        self.1.blacklisted(concrete)
    }

    fn progress(&self, done: usize, total: usize) {
        self.0.progress(done, total);
        self.1.progress(done, total)
    }
}

/// Event as recorded by [`Collect`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Resolved(DefId),
    Binding(DefId, String),
    Reference(DefId, Resolution),
    Pattern(DefId, Resolution),
    Started(DefId),
    Finished(DefId, Status),
    Interrupted(DefId, Interrupt),
    Blacklisted(DefId),
    Progress(usize, usize),
}

/// Observer that records all events.
#[derive(Default)]
pub struct Collect(Mutex<Vec<Event>>);

impl Collect {
    pub fn events(&self) -> Vec<Event> {
        self.0.lock().clone()
    }

    /// Remove and return all events recorded so far.
    pub fn take(&self) -> Vec<Event> {
        core::mem::take(&mut *self.0.lock())
    }

    fn push(&self, event: Event) {
        self.0.lock().push(event)
    }
}

impl Observer for Collect {
    fn definition_resolved(&self, concrete: &Concrete) {
        self.push(Event::Resolved(concrete.def))
    }

    fn binding_resolved(&self, def: DefId, binder: &Ident) {
        self.push(Event::Binding(def, binder.name.clone()))
    }

    fn reference_resolved(&self, def: DefId, resolution: &Resolution) {
        self.push(Event::Reference(def, resolution.clone()))
    }

    fn pattern_resolved(&self, def: DefId, resolution: &Resolution) {
        self.push(Event::Pattern(def, resolution.clone()))
    }

    fn typechecking_started(&self, concrete: &Concrete) {
        self.push(Event::Started(concrete.def))
    }

    fn typechecking_finished(&self, concrete: &Concrete, result: &CoreResult) {
        self.push(Event::Finished(concrete.def, result.status))
    }

    fn typechecking_interrupted(&self, concrete: &Concrete, interrupt: Interrupt) {
        self.push(Event::Interrupted(concrete.def, interrupt))
    }

    fn blacklisted(&self, concrete: &Concrete) {
        self.push(Event::Blacklisted(concrete.def))
    }

    fn progress(&self, done: usize, total: usize) {
        self.push(Event::Progress(done, total))
    }
}
