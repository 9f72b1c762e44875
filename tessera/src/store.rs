//! Registry of definitions and cache of their typechecking results.
//!
//! All writes go through one lock.
//! Readers that need a consistent view of many results take a [`Snapshot`],
//! which is an immutable map that can be read without any locking.

use crate::concrete::Concrete;
use crate::diagnostics::{Diagnostic, Severity};
use core::fmt::{self, Display};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tessera_syntax::DeclKind;

/// Immutable HashMap for fast cloning of the result cache.
type ImMap<K, V> = im::hashmap::HashMap<K, V, fnv::FnvBuildHasher>;

/// Value of the modification counter.
pub type Stamp = u64;

/// Stable identity of a definition.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefId(usize);

impl DefId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for DefId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Function,
    Data,
    Constructor,
    Class,
    Field,
    Instance,
}

impl Kind {
    /// Return true for constructors and fields,
    /// which live in the namespace of their data type or class.
    pub fn is_part(self) -> bool {
        matches!(self, Self::Constructor | Self::Field)
    }
}

impl From<DeclKind> for Kind {
    fn from(k: DeclKind) -> Self {
        match k {
            DeclKind::Def => Self::Function,
            DeclKind::Data => Self::Data,
            DeclKind::Class => Self::Class,
            DeclKind::Instance => Self::Instance,
        }
    }
}

/// Module path and name of a definition.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FullName {
    pub module: Vec<String>,
    pub name: String,
}

impl FullName {
    pub fn new(module: Vec<String>, name: String) -> Self {
        Self { module, name }
    }

    /// Split a dotted name at its last dot.
    ///
    /// ~~~
    /// # use tessera::FullName;
    /// let name = FullName::parse("Main.Nat.suc");
    /// assert_eq!(name.module, ["Main", "Nat"]);
    /// assert_eq!(name.to_string(), "Main.Nat.suc");
    /// ~~~
    pub fn parse(s: &str) -> Self {
        let mut module: Vec<String> = s.split('.').map(String::from).collect();
        let name = module.pop().unwrap_or_default();
        Self { module, name }
    }
}

impl Display for FullName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.module.iter().try_for_each(|m| write!(f, "{}.", m))?;
        self.name.fmt(f)
    }
}

#[derive(Clone, Debug)]
pub struct Definition {
    pub id: DefId,
    pub name: FullName,
    pub kind: Kind,
    pub infix: bool,
    /// the declaring syntax disappeared
    pub stale: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    NotTypechecked,
    TypeChecking,
    TypecheckedOk,
    TypecheckedWithErrors,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::TypecheckedOk | Self::TypecheckedWithErrors)
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NotTypechecked => "not typechecked",
            Self::TypeChecking => "typechecking",
            Self::TypecheckedOk => "ok",
            Self::TypecheckedWithErrors => "with errors",
        }
        .fmt(f)
    }
}

/// Outcome of typechecking one definition.
#[derive(Clone, Debug)]
pub struct CoreResult {
    pub status: Status,
    /// modification counter of the batch that produced the result
    pub stamp: Stamp,
    /// concrete definition that was typechecked
    pub concrete: Option<Arc<Concrete>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CoreResult {
    fn typechecking(stamp: Stamp) -> Self {
        Self {
            status: Status::TypeChecking,
            stamp,
            concrete: None,
            diagnostics: Vec::new(),
        }
    }

    /// Terminal result, with errors if any diagnostic is an error.
    pub fn checked(concrete: Arc<Concrete>, diagnostics: Vec<Diagnostic>, stamp: Stamp) -> Self {
        let errors = diagnostics.iter().any(|d| d.severity == Severity::Error);
        let status = if errors {
            Status::TypecheckedWithErrors
        } else {
            Status::TypecheckedOk
        };
        Self {
            status,
            stamp,
            concrete: Some(concrete),
            diagnostics,
        }
    }
}

/// Immutable view of all results at one point in time.
#[derive(Clone, Default)]
pub struct Snapshot(ImMap<DefId, Arc<CoreResult>>);

impl Snapshot {
    pub fn get(&self, def: DefId) -> Option<&Arc<CoreResult>> {
        self.0.get(&def)
    }

    pub fn status(&self, def: DefId) -> Status {
        self.get(def).map_or(Status::NotTypechecked, |r| r.status)
    }

    /// Return the result if it is terminal.
    pub fn terminal(&self, def: DefId) -> Option<&Arc<CoreResult>> {
        self.get(def).filter(|r| r.status.is_terminal())
    }
}

#[derive(Default)]
struct Inner {
    counter: Stamp,
    defs: Vec<Definition>,
    names: FnvHashMap<FullName, DefId>,
    /// newest stamp observed per definition
    stamps: FnvHashMap<DefId, Stamp>,
    results: ImMap<DefId, Arc<CoreResult>>,
}

impl Inner {
    fn observe(&mut self, def: DefId, stamp: Stamp) {
        let last = self.stamps.entry(def).or_default();
        *last = (*last).max(stamp)
    }

    fn stamp(&self, def: DefId) -> Stamp {
        self.stamps.get(&def).copied().unwrap_or_default()
    }
}

/// Definition store, shared by the editing thread and the background workers.
#[derive(Default)]
pub struct Store {
    inner: Mutex<Inner>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, or revive it if it was declared before.
    ///
    /// A definition keeps its identity as long as its full name does not change.
    pub fn declare(&self, name: FullName, kind: Kind, infix: bool) -> DefId {
        let mut inner = self.inner.lock();
        if let Some(&id) = inner.names.get(&name) {
            let def = &mut inner.defs[id.0];
            def.kind = kind;
            def.infix = infix;
            def.stale = false;
            return id;
        }
        let id = DefId(inner.defs.len());
        log::debug!("Declare {} as {}", name, id);
        inner.names.insert(name.clone(), id);
        let stale = false;
        inner.defs.push(Definition {
            id,
            name,
            kind,
            infix,
            stale,
        });
        id
    }

    /// Mark a definition as stale and drop its result.
    pub fn retire(&self, def: DefId) {
        let mut inner = self.inner.lock();
        if let Some(d) = inner.defs.get_mut(def.0) {
            log::debug!("Retire {}", d.name);
            d.stale = true;
        }
        inner.results.remove(&def);
    }

    pub fn definition(&self, def: DefId) -> Option<Definition> {
        self.inner.lock().defs.get(def.0).cloned()
    }

    pub fn lookup(&self, name: &FullName) -> Option<DefId> {
        self.inner.lock().names.get(name).copied()
    }

    /// All definitions that are not stale.
    pub fn live(&self) -> Vec<Definition> {
        let inner = self.inner.lock();
        inner.defs.iter().filter(|d| !d.stale).cloned().collect()
    }

    pub fn is_live(&self, def: DefId) -> bool {
        let inner = self.inner.lock();
        inner.defs.get(def.0).map_or(false, |d| !d.stale)
    }

    /// Current value of the modification counter.
    pub fn counter(&self) -> Stamp {
        self.inner.lock().counter
    }

    /// Count one accepted edit and return the new counter value.
    pub fn edit(&self) -> Stamp {
        let mut inner = self.inner.lock();
        inner.counter += 1;
        inner.counter
    }

    /// Newest stamp observed for a definition.
    pub fn stamp(&self, def: DefId) -> Stamp {
        self.inner.lock().stamp(def)
    }

    /// Observe a stamp for definitions without touching their results.
    pub fn touch(&self, defs: impl IntoIterator<Item = DefId>, stamp: Stamp) {
        let mut inner = self.inner.lock();
        defs.into_iter().for_each(|def| inner.observe(def, stamp))
    }

    /// Observe a stamp for definitions and drop their results.
    pub fn invalidate(&self, defs: impl IntoIterator<Item = DefId>, stamp: Stamp) {
        let mut inner = self.inner.lock();
        for def in defs {
            inner.observe(def, stamp);
            inner.results.remove(&def);
        }
    }

    /// Mark definitions as being typechecked by a batch.
    ///
    /// This fails without changing anything if
    /// a newer stamp has been observed for any of the definitions or
    /// any of them is already being typechecked for the same stamp.
    pub fn begin(&self, defs: &[DefId], stamp: Stamp) -> bool {
        let mut inner = self.inner.lock();
        let running = |r: &Arc<CoreResult>| r.status == Status::TypeChecking && r.stamp >= stamp;
        let taken = |def: &DefId| inner.results.get(def).map_or(false, &running);
        if defs.iter().any(|def| inner.stamp(*def) > stamp || taken(def)) {
            return false;
        }
        let result = Arc::new(CoreResult::typechecking(stamp));
        for def in defs {
            inner.observe(*def, stamp);
            inner.results.insert(*def, result.clone());
        }
        true
    }

    /// Undo [`Store::begin`] for definitions whose typechecking did not finish.
    pub fn abandon(&self, defs: &[DefId], stamp: Stamp) {
        let mut inner = self.inner.lock();
        for def in defs {
            let ours = inner.results.get(def).map_or(false, |r| {
                r.status == Status::TypeChecking && r.stamp == stamp
            });
            if ours {
                inner.results.remove(def);
            }
        }
    }

    /// Store a result unless a newer stamp has been observed for its definition.
    ///
    /// Return whether the result was stored.
    pub fn commit(&self, def: DefId, result: Arc<CoreResult>) -> bool {
        let mut inner = self.inner.lock();
        let last = inner.stamp(def);
        let live = inner.defs.get(def.0).map_or(false, |d| !d.stale);
        if !live || result.stamp < last {
            log::debug!("Discard result for {} ({} < {})", def, result.stamp, last);
            return false;
        }
        inner.observe(def, result.stamp);
        inner.results.insert(def, result);
        true
    }

    pub fn status(&self, def: DefId) -> Status {
        let inner = self.inner.lock();
        inner.results.get(&def).map_or(Status::NotTypechecked, |r| r.status)
    }

    /// Return the result of a definition if it is terminal.
    pub fn result(&self, def: DefId) -> Option<Arc<CoreResult>> {
        let inner = self.inner.lock();
        let result = inner.results.get(&def)?;
        result.status.is_terminal().then(|| result.clone())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.inner.lock().results.clone())
    }
}

#[cfg(test)]
fn result(stamp: Stamp) -> Arc<CoreResult> {
    let concrete = Arc::new(Concrete::degenerate(DefId(0), Default::default(), "".into()));
    Arc::new(CoreResult::checked(concrete, Vec::new(), stamp))
}

#[test]
fn declare() {
    let store = Store::new();
    let name = FullName::parse("M.f");
    let f = store.declare(name.clone(), Kind::Function, false);
    let g = store.declare(FullName::parse("M.g"), Kind::Function, false);
    assert_ne!(f, g);
    store.retire(f);
    assert!(!store.is_live(f));
    assert_eq!(store.live().len(), 1);
    assert_eq!(store.declare(name, Kind::Function, true), f);
    assert!(store.is_live(f));
    assert!(store.definition(f).map_or(false, |d| d.infix));
}

#[test]
fn commit_monotonicity() {
    let store = Store::new();
    let f = store.declare(FullName::parse("f"), Kind::Function, false);
    let (c1, c2) = (store.edit(), store.edit());
    assert!(c1 < c2);

    // newer first, then older
    assert!(store.commit(f, result(c2)));
    assert!(!store.commit(f, result(c1)));
    assert_eq!(store.result(f).map(|r| r.stamp), Some(c2));

    // older first, then newer
    let g = store.declare(FullName::parse("g"), Kind::Function, false);
    assert!(store.commit(g, result(c1)));
    assert!(store.commit(g, result(c2)));
    assert_eq!(store.result(g).map(|r| r.stamp), Some(c2));
}

#[test]
fn begin_and_abandon() {
    let store = Store::new();
    let f = store.declare(FullName::parse("f"), Kind::Function, false);
    let c1 = store.edit();
    assert!(store.begin(&[f], c1));
    assert_eq!(store.status(f), Status::TypeChecking);
    assert!(store.result(f).is_none());
    // a second batch with the same stamp does not check `f` again
    assert!(!store.begin(&[f], c1));

    // a newer edit invalidates and supersedes the running batch
    let c2 = store.edit();
    store.invalidate([f], c2);
    assert_eq!(store.status(f), Status::NotTypechecked);
    assert!(!store.begin(&[f], c1));
    assert!(!store.commit(f, result(c1)));

    assert!(store.begin(&[f], c2));
    store.abandon(&[f], c2);
    assert_eq!(store.status(f), Status::NotTypechecked);

    let snapshot = store.snapshot();
    assert!(store.commit(f, result(c2)));
    assert_eq!(snapshot.status(f), Status::NotTypechecked);
    assert!(store.snapshot().terminal(f).is_some());
}
