//! Cache of resolved definitions.

use crate::concrete::{Concrete, Draft};
use crate::namespace::Namespace;
use crate::observe::Ignore;
use crate::resolve::resolve;
use crate::store::{DefId, Store};
use fnv::{FnvHashMap, FnvHashSet};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    drafts: FnvHashMap<DefId, Arc<Draft>>,
    cache: FnvHashMap<DefId, Arc<Concrete>>,
    /// definitions whose draft changed since they were last resolved
    dirty: FnvHashSet<DefId>,
}

/// Provider of concrete definitions.
///
/// The provider holds the current draft of every declared definition and
/// the concrete definition last resolved from it.
#[derive(Default)]
pub struct Provider {
    inner: Mutex<Inner>,
}

impl Provider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the draft of a definition, returning true if it differs from the previous one.
    pub fn set_draft(&self, def: DefId, draft: Arc<Draft>) -> bool {
        let mut inner = self.inner.lock();
        if inner.drafts.get(&def).map_or(false, |old| **old == *draft) {
            return false;
        }
        inner.drafts.insert(def, draft);
        inner.dirty.insert(def);
        true
    }

    pub fn draft(&self, def: DefId) -> Option<Arc<Draft>> {
        self.inner.lock().drafts.get(&def).cloned()
    }

    /// Forget everything about a definition.
    pub fn remove(&self, def: DefId) {
        let mut inner = self.inner.lock();
        inner.drafts.remove(&def);
        inner.cache.remove(&def);
        inner.dirty.remove(&def);
    }

    /// Concrete definition as last stored with [`Provider::replace`].
    pub fn cached(&self, def: DefId) -> Option<Arc<Concrete>> {
        self.inner.lock().cache.get(&def).cloned()
    }

    /// Mark a definition to be resolved again.
    pub fn invalidate(&self, def: DefId) {
        self.inner.lock().dirty.insert(def);
    }

    pub fn is_dirty(&self, def: DefId) -> bool {
        self.inner.lock().dirty.contains(&def)
    }

    /// All definitions to be resolved again.
    pub fn dirty(&self) -> FnvHashSet<DefId> {
        self.inner.lock().dirty.clone()
    }

    /// Store a newly resolved definition.
    ///
    /// Return true if it differs structurally from the previously stored one.
    pub fn replace(&self, concrete: Arc<Concrete>) -> bool {
        let mut inner = self.inner.lock();
        let def = concrete.def;
        inner.dirty.remove(&def);
        let old = inner.cache.insert(def, concrete.clone());
        old.map_or(true, |old| *old != *concrete)
    }

    /// Return the concrete definition, resolving it from its draft if necessary.
    ///
    /// Returns `None` if the definition has no draft.
    /// A definition resolved here is only cached if its draft is not dirty,
    /// so that change detection in [`Provider::replace`] is not bypassed.
    pub fn get(&self, def: DefId, store: &Store) -> Option<Arc<Concrete>> {
        let draft = {
            let inner = self.inner.lock();
            if !inner.dirty.contains(&def) {
                if let Some(c) = inner.cache.get(&def) {
                    return Some(c.clone());
                }
            }
            inner.drafts.get(&def)?.clone()
        };
        let mut ns = Namespace::from_definitions(&store.live());
        let concrete = Arc::new(resolve(def, &draft, &mut ns, &Ignore));
        let mut inner = self.inner.lock();
        if !inner.dirty.contains(&def) {
            inner.cache.insert(def, concrete.clone());
        }
        Some(concrete)
    }

    /// All cached concrete definitions, ordered by identifier.
    pub fn concretes(&self) -> Vec<Arc<Concrete>> {
        let inner = self.inner.lock();
        let mut all: Vec<_> = inner.cache.values().cloned().collect();
        all.sort_by_key(|c| c.def);
        all
    }

    /// Definitions that transitively refer to any of the given ones,
    /// excluding the given ones.
    pub fn dependents(&self, defs: &FnvHashSet<DefId>) -> FnvHashSet<DefId> {
        let inner = self.inner.lock();
        let mut users: FnvHashMap<DefId, Vec<DefId>> = FnvHashMap::default();
        for c in inner.cache.values() {
            for r in &c.refs {
                users.entry(*r).or_default().push(c.def)
            }
        }
        let mut todo: Vec<DefId> = defs.iter().copied().collect();
        let mut seen = FnvHashSet::default();
        while let Some(def) = todo.pop() {
            for user in users.get(&def).into_iter().flatten() {
                if !defs.contains(user) && seen.insert(*user) {
                    todo.push(*user)
                }
            }
        }
        seen
    }

    /// Definitions that may resolve differently once the set of declared names changes.
    ///
    /// These are the definitions that refer to names that are out of scope or retired.
    /// If names were added, any reference to a definition may now be shadowed,
    /// so all definitions with references are included.
    pub fn stale_users(&self, store: &Store, added: bool) -> Vec<DefId> {
        let inner = self.inner.lock();
        let is_stale = |c: &Concrete| {
            (added && !c.refs.is_empty())
                || !c.unresolved().is_empty()
                || c.refs.iter().any(|r| !store.is_live(*r))
        };
        let mut stale: Vec<_> = inner.cache.values().filter(|c| is_stale(c)).map(|c| c.def).collect();
        stale.sort_unstable();
        stale
    }
}

#[cfg(test)]
fn declare(store: &Store, src: &str) -> Vec<(DefId, Arc<Draft>)> {
    let drafts = crate::concrete::drafts(&[], &tessera_syntax::parse(src));
    let declare = |d: Draft| (store.declare(d.name.clone(), d.kind, d.infix), Arc::new(d));
    drafts.into_iter().map(declare).collect()
}

#[test]
fn lazy_and_dirty() {
    let store = Store::new();
    let provider = Provider::new();
    let defs = declare(&store, "def a := 1. def b := a.");
    let (a, b) = (defs[0].0, defs[1].0);
    assert!(provider.get(a, &store).is_none());

    for (def, draft) in defs.clone() {
        assert!(provider.set_draft(def, draft))
    }
    assert!(!provider.set_draft(a, defs[0].1.clone()));
    assert_eq!(provider.dirty().len(), 2);

    // dirty definitions are resolved, but not cached
    assert_eq!(provider.get(b, &store).map(|c| c.refs.clone()), Some(vec![a]));
    assert!(provider.cached(b).is_none());

    let c = provider.get(b, &store).unwrap();
    assert!(provider.replace(c.clone()));
    assert!(!provider.replace(c));
    assert!(!provider.is_dirty(b));
    assert!(provider.cached(b).is_some());
}

#[test]
fn dependents() {
    let store = Store::new();
    let provider = Provider::new();
    let defs = declare(&store, "def a := 1. def b := a. def c := b. def d := 2. def e := x.");
    for (def, draft) in defs.iter().cloned() {
        provider.set_draft(def, draft);
    }
    for (def, _) in &defs {
        let c = provider.get(*def, &store).unwrap();
        provider.replace(c);
    }
    let id = |i: usize| defs[i].0;

    let changed = FnvHashSet::from_iter([id(0)]);
    let deps = provider.dependents(&changed);
    assert_eq!(deps, FnvHashSet::from_iter([id(1), id(2)]));
    assert!(provider.dependents(&FnvHashSet::from_iter([id(3)])).is_empty());

    assert_eq!(provider.stale_users(&store, false), [id(4)]);
    assert_eq!(provider.stale_users(&store, true), [id(1), id(2), id(4)]);
    store.retire(id(0));
    assert_eq!(provider.stale_users(&store, false), [id(1), id(4)]);
}
