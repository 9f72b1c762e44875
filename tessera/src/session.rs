//! Editing sessions that keep definitions resolved and typechecked.
//!
//! An [`Engine`] owns all state shared between sessions and the background workers.
//! A [`Session`] corresponds to one edited source file.
//! Every update of a session runs the fast path
//! (declaration, name resolution, invalidation, ordering) on the calling thread and
//! hands the typechecking of the affected definitions to the task queue.

use crate::blacklist::Blacklist;
use crate::cancel::{Cancel, Cancelled};
use crate::check::{Checker, Shallow};
use crate::concrete::{self, Concrete, Draft};
use crate::config::{Config, Mode};
use crate::diagnostics::{Diagnostic, Diagnostics, Phase};
use crate::error::Error;
use crate::namespace::Namespace;
use crate::observe::{Ignore, Observer};
use crate::order::{self, Plan};
use crate::provider::Provider;
use crate::queue::{Receipt, SessionId, TaskQueue};
use crate::resolve::resolve_group;
use crate::store::{CoreResult, DefId, FullName, Stamp, Status, Store};
use crate::typecheck::{Batch, Report, Typechecker};
use fnv::{FnvHashMap, FnvHashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tessera_syntax as syn;

/// Result of a background typechecking task.
pub type Checked = Result<Report, Cancelled>;

/// Shared state of all editing sessions.
pub struct Engine {
    config: Config,
    store: Arc<Store>,
    provider: Arc<Provider>,
    blacklist: Arc<Blacklist>,
    diagnostics: Arc<Diagnostics>,
    observer: Arc<dyn Observer>,
    typechecker: Arc<Typechecker>,
    queue: TaskQueue<Checked>,
    sessions: AtomicUsize,
}

impl Engine {
    /// Create an engine that uses the built-in shallow checker.
    pub fn new(config: Config) -> Self {
        let shallow = |store: &Arc<Store>| -> Arc<dyn Checker> {
            Arc::new(Shallow::new(store.clone()))
        };
        Self::with(config, shallow, Arc::new(Ignore))
    }

    /// Create an engine with a custom checker and
    /// an observer that receives all events besides the diagnostics sink.
    pub fn with<C>(config: Config, checker: C, observer: Arc<dyn Observer>) -> Self
    where
        C: FnOnce(&Arc<Store>) -> Arc<dyn Checker>,
    {
        let store = Arc::new(Store::new());
        let provider = Arc::new(Provider::new());
        let blacklist = Arc::new(Blacklist::new(config.retry_budget));
        let diagnostics = Arc::new(Diagnostics::default());
        let observer: Arc<dyn Observer> = Arc::new((diagnostics.clone(), observer));
        let checker = checker(&store);
        let typechecker = Typechecker::new(store.clone(), blacklist.clone(), checker, observer.clone())
            .time_limit(config.time_limit)
            .only_last(config.typecheck_only_last);
        let queue = TaskQueue::new(config.workers);
        log::info!("Start engine in {} mode", config.mode);
        Self {
            config,
            store,
            provider,
            blacklist,
            diagnostics,
            observer,
            typechecker: Arc::new(typechecker),
            queue,
            sessions: AtomicUsize::new(0),
        }
    }

    /// Open a new editing session for a module.
    pub fn session(&self, module: Vec<String>) -> Session<'_> {
        let id = self.sessions.fetch_add(1, Ordering::Relaxed);
        Session {
            engine: self,
            id,
            module,
            defs: Vec::new(),
            last_modified: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<Provider> {
        &self.provider
    }

    pub fn blacklist(&self) -> &Arc<Blacklist> {
        &self.blacklist
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// Find a live definition by its dotted full name.
    pub fn find(&self, name: &str) -> Option<DefId> {
        let def = self.store.lookup(&FullName::parse(name))?;
        self.store.is_live(def).then(|| def)
    }

    pub fn name(&self, def: DefId) -> Option<FullName> {
        self.store.definition(def).map(|d| d.name)
    }

    pub fn status(&self, def: DefId) -> Status {
        self.store.status(def)
    }

    pub fn result(&self, def: DefId) -> Option<Arc<CoreResult>> {
        self.store.result(def)
    }

    /// Concrete definition, resolved on demand.
    pub fn concrete(&self, def: DefId) -> Option<Arc<Concrete>> {
        self.provider.get(def, &self.store)
    }

    /// Allow a blacklisted definition to be typechecked again by the next update.
    pub fn clear_blacklist(&self, def: DefId) -> bool {
        let cleared = self.blacklist.clear(def);
        if cleared {
            self.diagnostics.clear(def, Phase::Typecheck)
        }
        cleared
    }
}

/// What an update did.
#[derive(Default)]
pub struct Update {
    /// modification counter value that the update's typechecking is tagged with
    pub stamp: Stamp,
    /// definitions whose concrete representation changed
    pub changed: Vec<DefId>,
    /// definitions that need typechecking
    pub affected: Vec<DefId>,
    /// typechecking order, if typechecking was scheduled
    pub plan: Option<Plan>,
    receipt: Option<Receipt<Checked>>,
}

impl Update {
    /// Return true if typechecking was scheduled.
    pub fn is_scheduled(&self) -> bool {
        self.receipt.is_some()
    }

    /// Wait for the scheduled typechecking.
    ///
    /// Returns `None` if nothing was scheduled or
    /// the task was voided by a newer update.
    pub fn wait(self) -> Option<Checked> {
        self.receipt?.wait()
    }
}

/// Editing session for one module.
pub struct Session<'e> {
    engine: &'e Engine,
    id: SessionId,
    module: Vec<String>,
    /// definitions in source order
    defs: Vec<DefId>,
    last_modified: Option<DefId>,
}

impl<'e> Session<'e> {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn module(&self) -> &[String] {
        &self.module
    }

    /// Definitions of the session, in source order.
    pub fn defs(&self) -> &[DefId] {
        &self.defs
    }

    /// Definition changed by the last update that changed exactly one definition.
    pub fn last_modified(&self) -> Option<DefId> {
        self.last_modified
    }

    /// Cancel the background typechecking of this session.
    pub fn cancel(&self) {
        self.engine.queue.cancel(self.id)
    }

    /// Replace the contents of the session by a new version.
    ///
    /// The cancellation token is checked while resolving and ordering;
    /// if it fires, nothing is scheduled and
    /// the next update picks up the remaining work.
    pub fn update(&mut self, group: &syn::Group, cancel: &Cancel) -> Result<Update, Error> {
        let engine = self.engine;
        let store = &engine.store;

        let ids = self.declare(group);
        let removed = self.defs.iter().copied().filter(|d| !ids.contains(d));
        let removed: Vec<DefId> = removed.collect();
        let added = ids.iter().any(|d| !self.defs.contains(d));
        for def in &removed {
            store.retire(*def);
            engine.provider.remove(*def);
            engine.diagnostics.remove(*def);
            engine.blacklist.clear(*def);
        }
        self.defs = ids;

        let mut touched = engine.provider.dirty();
        if added || !removed.is_empty() {
            touched.extend(engine.provider.stale_users(store, added))
        }
        let mut touched: Vec<_> = touched.into_iter().filter(|d| store.is_live(*d)).collect();
        self.sort(&mut touched);

        let stamp = if touched.is_empty() {
            store.counter()
        } else {
            store.edit()
        };
        let changed = self.resolve(&touched, cancel)?;
        if let [def] = changed.as_slice() {
            self.last_modified = Some(*def)
        }

        let changed_set: FnvHashSet<DefId> = changed.iter().copied().collect();
        let dependents = engine.provider.dependents(&changed_set);
        let mut invalid: Vec<_> = changed.iter().copied().chain(dependents).collect();
        self.sort(&mut invalid);
        log::debug!("Invalidate {:?} at stamp {}", invalid, stamp);
        store.invalidate(invalid.iter().copied(), stamp);
        for def in &invalid {
            engine.diagnostics.clear(*def, Phase::Typecheck)
        }

        let batch = self.affected(invalid);
        let affected: Vec<DefId> = batch.iter().map(|c| c.def).collect();
        store.touch(affected.iter().copied(), stamp);

        let mut update = Update {
            stamp,
            changed,
            affected,
            ..Default::default()
        };
        match engine.config.mode {
            Mode::Off => (),
            Mode::Dumb => {
                for c in &batch {
                    engine.diagnostics.set(c.def, Phase::Typecheck, Shallow::diagnostics(c))
                }
            }
            Mode::Smart if batch.is_empty() => (),
            // the running typechecking already covers an unchanged version
            Mode::Smart if touched.is_empty() && engine.queue.is_busy(self.id) => {
                log::debug!("Session {} is still typechecking", self.id)
            }
            Mode::Smart => {
                let plan = order::plan(&batch, self.last_modified, cancel)?;
                update.plan = Some(plan.clone());
                let batch = Batch { stamp, plan };
                let typechecker = engine.typechecker.clone();
                let task = move |cancel: &Cancel| typechecker.run(&batch, cancel);
                update.receipt = Some(engine.queue.submit(self.id, stamp, task)?);
            }
        }
        Ok(update)
    }

    /// Declare all definitions of a group, set their drafts and
    /// record their syntax errors.
    fn declare(&self, group: &syn::Group) -> Vec<DefId> {
        let engine = self.engine;
        let mut ids = Vec::new();
        let mut seen = FnvHashSet::default();
        let mut syntax: FnvHashMap<DefId, Vec<Diagnostic>> = FnvHashMap::default();
        for draft in concrete::drafts(&self.module, group) {
            let id = engine.store.declare(draft.name.clone(), draft.kind, draft.infix);
            let diags = syntax.entry(id).or_default();
            if !seen.insert(id) {
                let message = format!("duplicate definition of `{}`", draft.name);
                diags.push(Diagnostic::error(draft.span, message));
                continue;
            }
            if let Some(error) = &draft.error {
                diags.push(Diagnostic::error(draft.span, error.clone()))
            }
            engine.provider.set_draft(id, Arc::new(draft));
            ids.push(id)
        }
        for (id, diags) in syntax {
            engine.diagnostics.set(id, Phase::Syntax, diags)
        }

        let unnamed = group.errors().iter().filter(|b| b.name.is_none()).count();
        if unnamed > 0 {
            log::warn!("Ignore {} unreadable items in module {:?}", unnamed, self.module)
        }
        ids
    }

    /// Resolve definitions again, returning those that changed.
    fn resolve(&self, touched: &[DefId], cancel: &Cancel) -> Result<Vec<DefId>, Cancelled> {
        if touched.is_empty() {
            return Ok(Vec::new());
        }
        let engine = self.engine;
        let provider = &engine.provider;
        log::info!("Resolve {} definitions", touched.len());
        let drafts: Vec<(DefId, Arc<Draft>)> = touched
            .iter()
            .filter_map(|def| Some((*def, provider.draft(*def)?)))
            .collect();
        for (def, _) in &drafts {
            engine.diagnostics.clear(*def, Phase::Resolve)
        }

        let mut ns = Namespace::from_definitions(&engine.store.live());
        let root = drafts.iter().map(|(def, draft)| (*def, &**draft));
        let concretes = resolve_group(root, &mut ns, &*engine.observer, cancel)?;
        let mut changed = Vec::new();
        for c in concretes {
            let (def, span) = (c.def, c.span);
            let old = provider.cached(def).map(|old| old.span);
            if provider.replace(Arc::new(c)) {
                engine.blacklist.clear(def);
                changed.push(def)
            } else if let Some(old) = old.filter(|old| *old != span) {
                // the definition only moved, so its committed diagnostics move along
                engine.diagnostics.rebase(def, Phase::Typecheck, old, span)
            }
        }
        Ok(changed)
    }

    /// Definitions to typecheck, in source order.
    ///
    /// These are the invalidated definitions,
    /// the definitions of the session without result and
    /// all their dependencies without result.
    /// Definitions that are degenerate, blacklisted or
    /// (transitively) use a blacklisted definition are left out.
    fn affected(&self, invalid: Vec<DefId>) -> Vec<Arc<Concrete>> {
        let (store, provider) = (&self.engine.store, &self.engine.provider);
        let blacklist = &self.engine.blacklist;
        let mut affected: FnvHashSet<DefId> = invalid.into_iter().collect();
        let pending = self.defs.iter().filter(|d| store.result(**d).is_none());
        affected.extend(pending);

        let mut todo: Vec<_> = affected.iter().copied().collect();
        let mut concretes = FnvHashMap::default();
        while let Some(def) = todo.pop() {
            let c = match provider.get(def, store) {
                Some(c) => c,
                None => continue,
            };
            for r in &c.refs {
                if store.is_live(*r) && store.result(*r).is_none() && affected.insert(*r) {
                    todo.push(*r)
                }
            }
            concretes.insert(def, c);
        }

        // users of blacklisted definitions would only be skipped
        let mut blocked: FnvHashSet<DefId> =
            affected.iter().copied().filter(|d| blacklist.contains(*d)).collect();
        loop {
            let is_blocked = |r: &DefId| blacklist.contains(*r) || blocked.contains(r);
            let users = concretes.values().filter(|c| !is_blocked(&c.def));
            let users = users.filter(|c| c.refs.iter().any(is_blocked));
            let users: Vec<DefId> = users.map(|c| c.def).collect();
            if users.is_empty() {
                break;
            }
            blocked.extend(users)
        }

        let mut ids: Vec<_> = affected
            .into_iter()
            .filter(|d| store.is_live(*d) && !blocked.contains(d))
            .collect();
        self.sort(&mut ids);
        let batch = ids.into_iter().filter_map(|d| concretes.remove(&d));
        batch.filter(|c| !c.is_degenerate()).collect()
    }

    /// Sort definitions of the session by source order,
    /// followed by definitions of other sessions.
    fn sort(&self, defs: &mut [DefId]) {
        let position: FnvHashMap<_, _> = self.defs.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        let other = |d: &DefId| self.defs.len() + d.index();
        let key = |d: &DefId| position.get(d).copied().unwrap_or_else(|| other(d));
        defs.sort_by_key(key)
    }
}

#[cfg(test)]
use crate::{
    observe::{Collect, Event},
    typecheck::{Act, Outcome, Script},
};

#[cfg(test)]
fn engine(config: Config) -> (Engine, Arc<Script>, Arc<Collect>) {
    let (script, events) = (Arc::new(Script::default()), Arc::new(Collect::default()));
    let checker: Arc<dyn Checker> = script.clone();
    let engine = Engine::with(config, move |_| checker, events.clone());
    (engine, script, events)
}

#[cfg(test)]
fn module() -> Vec<String> {
    Vec::from(["M".to_string()])
}

#[cfg(test)]
fn update(session: &mut Session, src: &str) -> Update {
    let group = syn::parse(src);
    session.update(&group, &Cancel::new()).unwrap()
}

#[cfg(test)]
fn wait_until(f: impl Fn() -> bool) {
    for _ in 0..2000 {
        if f() {
            return;
        }
        std::thread::sleep(std::time::Duration::from_millis(5))
    }
    panic!("condition not reached")
}

#[test]
fn acyclic_and_mutual() {
    let (engine, _, _) = engine(Config::default());
    let mut session = engine.session(module());
    let up = update(&mut session, "def f := g. def g := 1.");
    let (f, g) = (engine.find("M.f").unwrap(), engine.find("M.g").unwrap());
    let plan = up.plan.as_ref().unwrap();
    assert!(plan.first.is_empty());
    assert_eq!(plan.rest.ids(), [[g], [f]]);
    let report = up.wait().unwrap().unwrap();
    assert_eq!(report.outcome(f), Some(Outcome::Ok));
    assert_eq!(engine.status(g), Status::TypecheckedOk);

    let (engine, _, _) = self::engine(Config::default());
    let mut session = engine.session(module());
    let up = update(&mut session, "def f := g. def g := f.");
    let (f, g) = (engine.find("M.f").unwrap(), engine.find("M.g").unwrap());
    assert_eq!(up.plan.as_ref().unwrap().rest.ids(), [[f, g]]);
    up.wait().unwrap().unwrap();
    assert_eq!(engine.status(f), Status::TypecheckedOk);
    assert_eq!(engine.status(g), Status::TypecheckedOk);
}

#[test]
fn repeated_timeouts() {
    let config = Config {
        time_limit: Some(std::time::Duration::ZERO),
        ..Config::default()
    };
    let (engine, script, events) = engine(config);
    let h = engine.store().declare(FullName::parse("M.h"), crate::Kind::Function, false);
    script.set(h, Some(Act::Loop));
    let mut session = engine.session(module());
    let src = "def h := 1. def u := h.";

    for _ in 0..2 {
        let report = update(&mut session, src).wait().unwrap().unwrap();
        assert_eq!(report.outcome(h), Some(Outcome::TimedOut));
    }
    let report = update(&mut session, src).wait().unwrap().unwrap();
    assert_eq!(report.outcome(h), Some(Outcome::Blacklisted));
    assert!(events.events().contains(&Event::Blacklisted(h)));
    let warnings = engine.diagnostics().phase(h, Phase::Typecheck);
    assert_eq!(warnings.len(), 2);
    assert_eq!(warnings[0].message, "typechecking was interrupted after 1 second(s)");

    // the blacklisted definition and its users are excluded from the next batch
    let calls = script.calls().len();
    let up = update(&mut session, src);
    assert!(up.affected.is_empty());
    assert!(!up.is_scheduled());
    assert_eq!(script.calls().len(), calls);
    let u = engine.find("M.u").unwrap();
    assert_eq!(engine.status(u), Status::NotTypechecked);

    // until its source changes
    let up = update(&mut session, "def h := 2. def u := h.");
    assert_eq!(up.changed, [h]);
    assert_eq!(up.affected, [h, u]);
    let report = up.wait().unwrap().unwrap();
    assert_eq!(report.outcome(h), Some(Outcome::TimedOut));
    assert!(!engine.blacklist().contains(h));
    assert_eq!(engine.blacklist().strikes(h), 1);
}

#[test]
fn qualified_failure() {
    let config = Config {
        mode: Mode::Off,
        ..Config::default()
    };
    let (engine, _, events) = engine(config);
    let mut session = engine.session(module());
    let up = update(&mut session, "module A { def x := 1. } def c := A.B.c.");
    assert!(!up.is_scheduled());

    let c = engine.find("M.c").unwrap();
    let errors = engine.diagnostics().phase(c, Phase::Resolve);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "cannot resolve `B` in `A.B.c`");
    assert_eq!(errors[0].span, syn::Span::new(36, 37));
    let failures: Vec<_> = events
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Reference(d, res) if d == c => res.failure(),
            _ => None,
        })
        .collect();
    assert_eq!(failures, [1]);
    assert!(engine.find("M.A.x").is_some());
}

#[test]
fn idempotence() {
    let (engine, script, _) = engine(Config::default());
    let mut session = engine.session(module());
    let src = "def a := 1. def b := a. def c := b a.";
    update(&mut session, src).wait().unwrap().unwrap();
    let calls = script.calls().len();
    assert_eq!(calls, 3);
    let results: Vec<_> = session.defs().iter().map(|d| engine.result(*d).unwrap()).collect();

    let up = update(&mut session, src);
    assert!(up.changed.is_empty() && up.affected.is_empty());
    assert!(!up.is_scheduled());

    // moving definitions around changes no concrete definition
    let up = update(&mut session, "def a   := 1.\n\ndef b := a.  def c := b a.");
    assert!(up.changed.is_empty() && !up.is_scheduled());

    assert_eq!(script.calls().len(), calls);
    for (def, old) in session.defs().iter().zip(results) {
        assert!(Arc::ptr_eq(&engine.result(*def).unwrap(), &old))
    }
}

#[test]
fn dependents_and_last_modified() {
    let (engine, script, _) = engine(Config::default());
    let mut session = engine.session(module());
    update(&mut session, "def a := 1. def b := a. def c := 2.").wait();
    let (a, b) = (engine.find("M.a").unwrap(), engine.find("M.b").unwrap());

    let up = update(&mut session, "def a := 3. def b := a. def c := 2.");
    assert_eq!(up.changed, [a]);
    assert_eq!(up.affected, [a, b]);
    assert_eq!(session.last_modified(), Some(a));
    let plan = up.plan.as_ref().unwrap();
    assert_eq!(plan.first.ids(), [[a]]);
    assert_eq!(plan.rest.ids(), [[b]]);
    let report = up.wait().unwrap().unwrap();
    assert_eq!(report.count(Outcome::Ok), 2);
    let calls = script.calls();
    assert_eq!(calls[calls.len() - 2..], [vec![a], vec![b]]);
}

#[test]
fn names_appear_and_disappear() {
    let (engine, _, _) = engine(Config::default());
    let mut session = engine.session(module());
    update(&mut session, "def f := g.").wait();
    let f = engine.find("M.f").unwrap();
    let errors = engine.diagnostics().phase(f, Phase::Resolve);
    assert_eq!(errors[0].message, "cannot resolve `g`");

    let up = update(&mut session, "def f := g. def g := 1.");
    let g = engine.find("M.g").unwrap();
    assert_eq!(up.changed, [f, g]);
    up.wait();
    assert!(engine.diagnostics().phase(f, Phase::Resolve).is_empty());
    assert_eq!(engine.concrete(f).unwrap().refs, [g]);

    // removing `g` makes `f` unresolved again
    let up = update(&mut session, "def f := g.");
    assert_eq!(up.changed, [f]);
    assert!(engine.find("M.g").is_none());
    assert_eq!(engine.status(g), Status::NotTypechecked);
    assert_eq!(engine.diagnostics().phase(f, Phase::Resolve).len(), 1);
}

#[test]
fn cancelled_update() {
    let (engine, _, _) = engine(Config::default());
    let mut session = engine.session(module());
    let group = syn::parse("def f := 1. def g := f.");
    let cancel = Cancel::new();
    cancel.cancel();
    assert!(matches!(session.update(&group, &cancel), Err(Error::Cancelled)));
    let f = engine.find("M.f").unwrap();
    assert_eq!(engine.status(f), Status::NotTypechecked);

    let up = session.update(&group, &Cancel::new()).unwrap();
    assert_eq!(up.changed.len(), 2);
    up.wait().unwrap().unwrap();
    assert_eq!(engine.status(f), Status::TypecheckedOk);
}

#[test]
fn cancelled_typechecking() {
    let config = Config {
        time_limit: None,
        ..Config::default()
    };
    let (engine, script, events) = engine(config);
    let h = engine.store().declare(FullName::parse("M.h"), crate::Kind::Function, false);
    script.set(h, Some(Act::Loop));
    let mut session = engine.session(module());
    let up = update(&mut session, "def a := 1. def h := a. def z := h.");
    wait_until(|| engine.status(h) == Status::TypeChecking);
    session.cancel();
    assert_eq!(up.wait(), Some(Err(Cancelled)));

    let (a, z) = (engine.find("M.a").unwrap(), engine.find("M.z").unwrap());
    assert_eq!(engine.status(a), Status::TypecheckedOk);
    assert_eq!(engine.status(h), Status::NotTypechecked);
    assert_eq!(engine.status(z), Status::NotTypechecked);
    assert!(events.events().contains(&Event::Interrupted(h, crate::Interrupt::Cancelled)));
}

#[test]
fn modes() {
    let src = "def f := _. def g := x.";
    let dumb = Config {
        mode: Mode::Dumb,
        ..Config::default()
    };
    let (engine, script, _) = engine(dumb);
    let mut session = engine.session(module());
    assert!(!update(&mut session, src).is_scheduled());
    let (f, g) = (engine.find("M.f").unwrap(), engine.find("M.g").unwrap());
    let warnings = engine.diagnostics().phase(f, Phase::Typecheck);
    assert_eq!(warnings[0].message, "definition contains holes");
    assert_eq!(engine.diagnostics().phase(g, Phase::Resolve).len(), 1);
    assert_eq!(engine.status(f), Status::NotTypechecked);
    assert!(script.calls().is_empty());

    let off = Config {
        mode: Mode::Off,
        ..Config::default()
    };
    let (engine, _, _) = self::engine(off);
    let mut session = engine.session(module());
    assert!(!update(&mut session, src).is_scheduled());
    let f = engine.find("M.f").unwrap();
    assert!(engine.diagnostics().phase(f, Phase::Typecheck).is_empty());
}

#[test]
fn syntax_errors() {
    let (engine, script, _) = engine(Config::default());
    let mut session = engine.session(module());
    let up = update(&mut session, "def f := . def g := f. def g := 2.");
    let (f, g) = (engine.find("M.f").unwrap(), engine.find("M.g").unwrap());
    assert_eq!(up.affected, [g]);
    up.wait().unwrap().unwrap();
    assert!(engine.diagnostics().has_errors(f));
    let errors = engine.diagnostics().phase(g, Phase::Syntax);
    assert_eq!(errors[0].message, "duplicate definition of `M.g`");
    assert_eq!(script.calls(), [vec![g]]);
}

#[test]
fn sessions_share_definitions() {
    let (engine, script, _) = engine(Config::default());
    let mut s1 = engine.session(Vec::from(["A".to_string()]));
    let mut s2 = engine.session(Vec::from(["B".to_string()]));
    update(&mut s1, "def x := 1.").wait();
    update(&mut s2, "def y := A.x.").wait();
    let (x, y) = (engine.find("A.x").unwrap(), engine.find("B.y").unwrap());
    assert_eq!(engine.status(y), Status::TypecheckedOk);

    let up = update(&mut s1, "def x := 2.");
    assert_eq!(up.affected, [x, y]);
    up.wait().unwrap().unwrap();
    assert_eq!(script.calls().last(), Some(&vec![y]));
    assert_eq!(engine.status(y), Status::TypecheckedOk);
}

#[test]
fn shadowing() {
    let config = Config {
        mode: Mode::Off,
        ..Config::default()
    };
    let (engine, _, _) = engine(config);
    let mut session = engine.session(module());
    update(&mut session, "def x := 1. module N { def y := x. }");
    let (x, y) = (engine.find("M.x").unwrap(), engine.find("M.N.y").unwrap());
    assert_eq!(engine.concrete(y).unwrap().refs, [x]);

    // a new definition in an inner module shadows the outer one
    let up = update(&mut session, "def x := 1. module N { def y := x. def x := 2. }");
    let nx = engine.find("M.N.x").unwrap();
    assert!(up.changed.contains(&y));
    assert!(!up.changed.contains(&x));
    assert_eq!(engine.concrete(y).unwrap().refs, [nx]);

    let up = update(&mut session, "def x := 1. module N { def y := x. }");
    assert!(up.changed.contains(&y));
    assert_eq!(engine.concrete(y).unwrap().refs, [x]);
}

#[test]
fn unchanged_while_typechecking() {
    let config = Config {
        workers: 2,
        time_limit: None,
        ..Config::default()
    };
    let (engine, script, _) = engine(config);
    let h = engine.store().declare(FullName::parse("M.h"), crate::Kind::Function, false);
    script.set(h, Some(Act::Loop));
    let mut session = engine.session(module());
    let first = update(&mut session, "def h := 1.");
    wait_until(|| script.calls().len() == 1);

    let up = update(&mut session, "def h := 1.");
    assert!(!up.is_scheduled());
    assert_eq!(engine.status(h), Status::TypeChecking);

    session.cancel();
    assert_eq!(first.wait(), Some(Err(Cancelled)));
    assert_eq!(script.calls(), [vec![h]]);

    // once the typechecking is gone, the same version is scheduled again
    script.set(h, None);
    let up = update(&mut session, "def h := 1.");
    assert_eq!(up.affected, [h]);
    up.wait().unwrap().unwrap();
    assert_eq!(engine.status(h), Status::TypecheckedOk);
}

#[test]
fn moved_diagnostics() {
    let (engine, script, _) = engine(Config::default());
    let b = engine.store().declare(FullName::parse("M.b"), crate::Kind::Function, false);
    script.set(b, Some(Act::Error));
    let mut session = engine.session(module());
    update(&mut session, "def a := 1. def b := a.").wait().unwrap().unwrap();
    let old = engine.diagnostics().phase(b, Phase::Typecheck)[0].span;
    assert_eq!(old, engine.concrete(b).unwrap().span);

    let up = update(&mut session, "  def a := 1. def b := a.");
    assert!(up.changed.is_empty() && !up.is_scheduled());
    let new = engine.diagnostics().phase(b, Phase::Typecheck)[0].span;
    assert_eq!(new, engine.concrete(b).unwrap().span);
    assert_eq!((new.start, new.end), (old.start + 2, old.end + 2));
}
