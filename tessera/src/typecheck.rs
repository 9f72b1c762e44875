//! Background typechecking of ordered definitions.
//!
//! The typechecker drains a [`Plan`] group by group.
//! Failures are confined to the group that caused them:
//! internal errors and panics become diagnostics,
//! timeouts count towards blacklisting.
//! Only cancellation stops the whole batch.

use crate::blacklist::Blacklist;
use crate::cancel::{Cancel, Cancelled, Checkpoint, Interrupt};
use crate::check::{Checker, Failure, Verdict};
use crate::concrete::Concrete;
use crate::diagnostics::Diagnostic;
use crate::observe::Observer;
use crate::order::{Group, Plan};
use crate::store::{CoreResult, DefId, Stamp, Status, Store};
use core::fmt::{self, Display};
use fnv::FnvHashSet;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

/// What happened to a definition in a batch.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    WithErrors,
    /// a result for the same concrete definition was already stored
    Cached,
    /// a newer batch is responsible for the definition
    Superseded,
    /// a dependency is not usable
    Skipped,
    TimedOut,
    Blacklisted,
}

impl Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Ok => "ok",
            Self::WithErrors => "with errors",
            Self::Cached => "cached",
            Self::Superseded => "superseded",
            Self::Skipped => "skipped",
            Self::TimedOut => "timed out",
            Self::Blacklisted => "blacklisted",
        }
        .fmt(f)
    }
}

impl From<Status> for Outcome {
    fn from(status: Status) -> Self {
        match status {
            Status::TypecheckedOk => Self::Ok,
            Status::TypecheckedWithErrors => Self::WithErrors,
            Status::NotTypechecked | Status::TypeChecking => Self::Superseded,
        }
    }
}

/// Summary of a batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    pub stamp: Stamp,
    /// outcome per definition, in processing order
    pub outcomes: Vec<(DefId, Outcome)>,
    /// number of calls to the checker
    pub invocations: usize,
}

impl Report {
    pub fn outcome(&self, def: DefId) -> Option<Outcome> {
        let mut outcomes = self.outcomes.iter();
        outcomes.find(|(d, _)| *d == def).map(|(_, o)| *o)
    }

    /// Number of definitions with the given outcome.
    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.iter().filter(|(_, o)| *o == outcome).count()
    }
}

/// Ordered definitions to typecheck,
/// tagged with the value of the modification counter when they were ordered.
#[derive(Clone, Debug)]
pub struct Batch {
    pub stamp: Stamp,
    pub plan: Plan,
}

/// State of one run through a batch.
#[derive(Default)]
struct Run {
    report: Report,
    /// definitions that did not reach a terminal status in this batch
    unusable: FnvHashSet<DefId>,
    done: usize,
    total: usize,
}

impl Run {
    fn set(&mut self, def: DefId, outcome: Outcome) {
        if !matches!(outcome, Outcome::Ok | Outcome::WithErrors | Outcome::Cached) {
            self.unusable.insert(def);
        }
        self.report.outcomes.push((def, outcome))
    }
}

pub struct Typechecker {
    store: Arc<Store>,
    blacklist: Arc<Blacklist>,
    checker: Arc<dyn Checker>,
    observer: Arc<dyn Observer>,
    time_limit: Option<Duration>,
    only_last: bool,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "checker panicked".into()
    }
}

impl Typechecker {
    pub fn new(
        store: Arc<Store>,
        blacklist: Arc<Blacklist>,
        checker: Arc<dyn Checker>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            store,
            blacklist,
            checker,
            observer,
            time_limit: None,
            only_last: false,
        }
    }

    /// Set the wall-clock limit for checking one group.
    pub fn time_limit(self, time_limit: Option<Duration>) -> Self {
        Self { time_limit, ..self }
    }

    /// Typecheck the second pass of a plan only if
    /// the last modified definition was typechecked without errors.
    pub fn only_last(self, only_last: bool) -> Self {
        Self { only_last, ..self }
    }

    /// Typecheck a batch.
    ///
    /// On cancellation, all results committed so far stay intact.
    pub fn run(&self, batch: &Batch, cancel: &Cancel) -> Result<Report, Cancelled> {
        let plan = &batch.plan;
        log::info!("Typecheck {} definitions at stamp {}", plan.len(), batch.stamp);
        let mut run = Run {
            total: plan.len(),
            ..Default::default()
        };
        run.report.stamp = batch.stamp;

        for group in plan.first.groups() {
            self.group(group, batch.stamp, cancel, &mut run)?
        }

        let last_ok = plan.last.map_or(true, |l| {
            self.store.status(l) == Status::TypecheckedOk
        });
        if self.only_last && !last_ok {
            log::info!("Skip {} definitions after failure of last modified", plan.rest.len());
            run.total -= plan.rest.len();
            let rest = plan.rest.groups().iter().flatten();
            rest.for_each(|c| run.set(c.def, Outcome::Skipped))
        } else {
            for group in plan.rest.groups() {
                self.group(group, batch.stamp, cancel, &mut run)?
            }
        }
        Ok(run.report)
    }

    /// Return why a group must not be checked, if so.
    fn blocked(&self, group: &Group, run: &Run) -> Option<Outcome> {
        if group.iter().any(|c| self.blacklist.contains(c.def)) {
            Some(Outcome::Blacklisted)
        } else if group.iter().any(|c| c.refs.iter().any(|r| self.unusable(*r, run))) {
            Some(Outcome::Skipped)
        } else {
            None
        }
    }

    fn unusable(&self, def: DefId, run: &Run) -> bool {
        run.unusable.contains(&def) || self.blacklist.contains(def)
    }

    /// Return true if all members have results for their current concrete definitions.
    fn cached(&self, group: &Group) -> bool {
        group.iter().all(|c| {
            let result = self.store.result(c.def);
            let concrete = result.as_ref().and_then(|r| r.concrete.as_ref());
            concrete.map_or(false, |old| **old == **c)
        })
    }

    fn group(
        &self,
        group: &Group,
        stamp: Stamp,
        cancel: &Cancel,
        run: &mut Run,
    ) -> Result<(), Cancelled> {
        cancel.check()?;
        let ids: Vec<DefId> = group.iter().map(|c| c.def).collect();

        if let Some(outcome) = self.blocked(group, run) {
            log::debug!("Not checking {:?}: {}", ids, outcome);
            ids.iter().for_each(|def| run.set(*def, outcome));
        } else if self.cached(group) {
            ids.iter().for_each(|def| run.set(*def, Outcome::Cached));
        } else if !self.store.begin(&ids, stamp) {
            log::debug!("Superseded: {:?} at stamp {}", ids, stamp);
            ids.iter().for_each(|def| run.set(*def, Outcome::Superseded));
        } else {
            self.check(group, &ids, stamp, cancel, run)?
        }

        run.done += group.len();
        self.observer.progress(run.done, run.total);
        Ok(())
    }

    fn check(
        &self,
        group: &Group,
        ids: &[DefId],
        stamp: Stamp,
        cancel: &Cancel,
        run: &mut Run,
    ) -> Result<(), Cancelled> {
        group.iter().for_each(|c| self.observer.typechecking_started(c));
        let snapshot = self.store.snapshot();
        let point = Checkpoint::new(cancel, self.time_limit);
        run.report.invocations += 1;

        let checked = panic::catch_unwind(AssertUnwindSafe(|| {
            self.checker.check(group, &snapshot, &point)
        }));
        let checked = match checked {
            Ok(Ok(verdicts)) if verdicts.len() == group.len() => Ok(verdicts),
            Ok(Ok(verdicts)) => Err(Failure::Internal(format!(
                "{} verdicts for {} definitions",
                verdicts.len(),
                group.len()
            ))),
            Ok(Err(failure)) => Err(failure),
            Err(payload) => Err(Failure::Internal(panic_message(&*payload))),
        };

        match checked {
            Ok(verdicts) => {
                let members = group.iter().zip(verdicts);
                members.for_each(|(c, verdict)| self.commit(c, verdict, stamp, run))
            }
            Err(Failure::Interrupted(Interrupt::Cancelled)) => {
                log::debug!("Cancelled while checking {:?}", ids);
                self.store.abandon(ids, stamp);
                for c in group {
                    self.observer.typechecking_interrupted(c, Interrupt::Cancelled)
                }
                return Err(Cancelled);
            }
            Err(Failure::Interrupted(interrupt)) => {
                log::warn!("Typechecking of {:?} interrupted: {}", ids, interrupt);
                self.store.abandon(ids, stamp);
                for c in group {
                    self.observer.typechecking_interrupted(c, interrupt);
                    let outcome = if self.blacklist.strike(c.def) {
                        log::warn!("Blacklist {}", c.def);
                        self.observer.blacklisted(c);
                        Outcome::Blacklisted
                    } else {
                        Outcome::TimedOut
                    };
                    run.set(c.def, outcome)
                }
            }
            Err(Failure::Internal(msg)) => {
                log::warn!("Internal error while checking {:?}: {}", ids, msg);
                for c in group {
                    let message = format!("internal error: {}", msg);
                    let verdict = Vec::from([Diagnostic::error(c.span, message)]);
                    self.commit(c, verdict, stamp, run)
                }
            }
        }
        Ok(())
    }

    fn commit(&self, c: &Arc<Concrete>, verdict: Verdict, stamp: Stamp, run: &mut Run) {
        let result = Arc::new(CoreResult::checked(c.clone(), verdict, stamp));
        if self.store.commit(c.def, result.clone()) {
            self.blacklist.forgive(c.def);
            self.observer.typechecking_finished(c, &result);
            run.set(c.def, result.status.into())
        } else {
            run.set(c.def, Outcome::Superseded)
        }
    }
}

/// Behaviour of [`Script`] for one definition.
#[cfg(test)]
#[derive(Clone)]
pub(crate) enum Act {
    /// report one error
    Error,
    /// run until the time limit is exceeded
    Loop,
    Panic,
    Fail,
    /// cancel the given token, then reach a checkpoint
    Cancel(Cancel),
}

/// Checker that behaves as instructed per definition and records its calls.
///
/// Definitions without instructions are fine.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct Script {
    acts: parking_lot::Mutex<fnv::FnvHashMap<DefId, Act>>,
    calls: parking_lot::Mutex<Vec<Vec<DefId>>>,
}

#[cfg(test)]
impl Script {
    pub fn set(&self, def: DefId, act: Option<Act>) {
        let mut acts = self.acts.lock();
        match act {
            Some(act) => acts.insert(def, act),
            None => acts.remove(&def),
        };
    }

    /// Groups checked so far.
    pub fn calls(&self) -> Vec<Vec<DefId>> {
        self.calls.lock().clone()
    }
}

#[cfg(test)]
impl Checker for Script {
    fn check(
        &self,
        group: &[Arc<Concrete>],
        _deps: &crate::store::Snapshot,
        point: &Checkpoint,
    ) -> Result<Vec<Verdict>, Failure> {
        self.calls.lock().push(group.iter().map(|c| c.def).collect());
        let acts: Vec<_> = group.iter().map(|c| self.acts.lock().get(&c.def).cloned()).collect();
        for act in acts.iter().flatten() {
            match act {
                Act::Error => (),
                Act::Loop => loop {
                    point.check()?;
                    std::thread::sleep(Duration::from_millis(1))
                },
                Act::Panic => panic!("checker bug"),
                Act::Fail => return Err(Failure::Internal("out of fuel".into())),
                Act::Cancel(cancel) => {
                    cancel.cancel();
                    point.check()?
                }
            }
        }
        let verdict = |(c, act): (&Arc<Concrete>, &Option<Act>)| match act {
            Some(Act::Error) => Vec::from([Diagnostic::error(c.span, "type mismatch")]),
            _ => Vec::new(),
        };
        Ok(group.iter().zip(&acts).map(verdict).collect())
    }
}

#[cfg(test)]
fn setup(src: &str) -> (Arc<Store>, Vec<Arc<Concrete>>) {
    let store = Arc::new(Store::new());
    let drafts = crate::concrete::drafts(&[], &tessera_syntax::parse(src));
    let ids: Vec<_> = drafts
        .iter()
        .map(|d| store.declare(d.name.clone(), d.kind, d.infix))
        .collect();
    let mut ns = crate::namespace::Namespace::from_definitions(&store.live());
    let ignore = crate::observe::Ignore;
    let root = ids.into_iter().zip(drafts.iter());
    let cs = crate::resolve::resolve_group(root, &mut ns, &ignore, &Cancel::new()).unwrap();
    (store, cs.into_iter().map(Arc::new).collect())
}

#[cfg(test)]
struct Fixture {
    store: Arc<Store>,
    defs: Vec<Arc<Concrete>>,
    script: Arc<Script>,
    blacklist: Arc<Blacklist>,
    events: Arc<crate::observe::Collect>,
}

#[cfg(test)]
impl Fixture {
    fn new(src: &str) -> Self {
        let (store, defs) = setup(src);
        Self {
            store,
            defs,
            script: Default::default(),
            blacklist: Arc::new(Blacklist::new(3)),
            events: Default::default(),
        }
    }

    fn typechecker(&self) -> Typechecker {
        let (store, blacklist) = (self.store.clone(), self.blacklist.clone());
        let (script, events) = (self.script.clone(), self.events.clone());
        Typechecker::new(store, blacklist, script, events).time_limit(Some(Duration::ZERO))
    }

    /// Order all definitions under a fresh stamp.
    fn batch(&self, last: Option<usize>) -> Batch {
        let stamp = self.store.edit();
        let last = last.map(|i| self.defs[i].def);
        let plan = crate::order::plan(&self.defs, last, &Cancel::new()).unwrap();
        Batch { stamp, plan }
    }

    fn id(&self, i: usize) -> DefId {
        self.defs[i].def
    }
}

#[test]
fn cancellation_keeps_commits() {
    let fx = Fixture::new("def a := 1. def b := a. def c := b. def d := c.");
    let cancel = Cancel::new();
    fx.script.set(fx.id(2), Some(Act::Cancel(cancel.clone())));
    let batch = fx.batch(None);
    assert_eq!(fx.typechecker().run(&batch, &cancel), Err(Cancelled));

    let status = |i| fx.store.status(fx.id(i));
    assert_eq!(status(0), Status::TypecheckedOk);
    assert_eq!(status(1), Status::TypecheckedOk);
    assert_eq!(status(2), Status::NotTypechecked);
    assert_eq!(status(3), Status::NotTypechecked);
    assert_eq!(fx.script.calls().len(), 3);

    // the next batch only checks what was not committed
    let report = fx.typechecker().run(&fx.batch(None), &Cancel::new()).unwrap();
    assert_eq!(report.count(Outcome::Cached), 2);
    assert_eq!(report.outcome(fx.id(2)), Some(Outcome::Ok));
    assert_eq!(report.invocations, 2);
}

#[test]
fn timeouts_blacklist() {
    let fx = Fixture::new("def h := 1. def u := h. def v := 1.");
    let (h, u, v) = (fx.id(0), fx.id(1), fx.id(2));
    fx.script.set(h, Some(Act::Loop));

    for _ in 0..2 {
        let report = fx.typechecker().run(&fx.batch(None), &Cancel::new()).unwrap();
        assert_eq!(report.outcome(h), Some(Outcome::TimedOut));
        assert_eq!(report.outcome(u), Some(Outcome::Skipped));
        assert!(report.outcome(v).is_some());
    }
    let report = fx.typechecker().run(&fx.batch(None), &Cancel::new()).unwrap();
    assert_eq!(report.outcome(h), Some(Outcome::Blacklisted));
    assert!(fx.blacklist.contains(h));
    assert_eq!(fx.store.status(h), Status::NotTypechecked);

    // blacklisted definitions are not even attempted
    let calls = fx.script.calls().len();
    let report = fx.typechecker().run(&fx.batch(None), &Cancel::new()).unwrap();
    assert_eq!(report.outcome(h), Some(Outcome::Blacklisted));
    assert_eq!(report.outcome(u), Some(Outcome::Skipped));
    assert_eq!(fx.script.calls().len(), calls);

    use crate::observe::Event;
    let events = fx.events.events();
    let timeouts = events.iter().filter(|e| match e {
        Event::Interrupted(d, Interrupt::TimedOut(_)) => *d == h,
        _ => false,
    });
    assert_eq!(timeouts.count(), 3);
    assert!(events.contains(&Event::Blacklisted(h)));

    // clearing allows a new attempt
    fx.blacklist.clear(h);
    fx.script.set(h, None);
    let report = fx.typechecker().run(&fx.batch(None), &Cancel::new()).unwrap();
    assert_eq!(report.outcome(h), Some(Outcome::Ok));
    assert_eq!(report.outcome(u), Some(Outcome::Ok));
}

#[test]
fn internal_errors() {
    let fx = Fixture::new("def a := 1. def b := a. def c := 2. def d := c.");
    fx.script.set(fx.id(0), Some(Act::Panic));
    fx.script.set(fx.id(2), Some(Act::Fail));
    let report = fx.typechecker().run(&fx.batch(None), &Cancel::new()).unwrap();
    let outcomes: Vec<_> = (0..4).map(|i| report.outcome(fx.id(i))).collect();
    let expected = [Outcome::WithErrors, Outcome::Ok, Outcome::WithErrors, Outcome::Ok];
    assert_eq!(outcomes, expected.map(Some));

    let result = fx.store.result(fx.id(0)).unwrap();
    assert_eq!(result.diagnostics[0].message, "internal error: checker bug");
    let result = fx.store.result(fx.id(2)).unwrap();
    assert_eq!(result.diagnostics[0].message, "internal error: out of fuel");
}

#[test]
fn superseded() {
    let fx = Fixture::new("def a := 1. def b := a.");
    let batch = fx.batch(None);
    // a newer edit touched `a` after the batch was ordered
    fx.store.touch([fx.id(0)], fx.store.edit());
    let report = fx.typechecker().run(&batch, &Cancel::new()).unwrap();
    assert_eq!(report.outcome(fx.id(0)), Some(Outcome::Superseded));
    assert_eq!(report.outcome(fx.id(1)), Some(Outcome::Skipped));
    assert_eq!(report.invocations, 0);
}

#[test]
fn only_last() {
    let fx = Fixture::new("def a := 1. def b := 2. def c := b.");
    fx.script.set(fx.id(0), Some(Act::Error));
    let typechecker = fx.typechecker().only_last(true);
    let report = typechecker.run(&fx.batch(Some(0)), &Cancel::new()).unwrap();
    assert_eq!(report.outcome(fx.id(0)), Some(Outcome::WithErrors));
    assert_eq!(report.count(Outcome::Skipped), 2);

    fx.script.set(fx.id(0), None);
    fx.store.invalidate([fx.id(0)], fx.store.counter());
    let report = typechecker.run(&fx.batch(Some(0)), &Cancel::new()).unwrap();
    assert_eq!(report.count(Outcome::Ok), 3);

    let progress = fx.events.events().into_iter().filter_map(|e| match e {
        crate::observe::Event::Progress(done, total) => Some((done, total)),
        _ => None,
    });
    assert_eq!(progress.collect::<Vec<_>>(), [(1, 3), (1, 3), (2, 3), (3, 3)]);
}
