//! Name resolution of drafts into concrete definitions.
//!
//! Resolution never fails because of a name that is not in scope:
//! such names become [`Ref::Unresolved`] and are reported to the observer.

use crate::cancel::{Cancel, Cancelled};
use crate::concrete::{Concrete, Draft, Expr, Pattern, RawExpr, RawPattern, Ref};
use crate::locals::Locals;
use crate::namespace::{Entry, Scope};
use crate::observe::Observer;
use crate::store::{DefId, Kind};
use tessera_syntax::{Ident, Name, Span};

/// What a segment of a name resolved to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Module(Vec<String>),
    Def(DefId),
    /// bound variable, as de Bruijn index
    Local(usize),
}

/// Resolution of a possibly qualified name.
///
/// Segments are resolved from left to right, stopping at the first segment
/// that cannot be resolved; its target and those of all following segments
/// are `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub name: Name,
    /// one target per segment
    pub targets: Vec<Option<Target>>,
    /// the referenced definition is an infix operator
    pub infix: bool,
}

impl Resolution {
    /// Target of the whole name.
    pub fn target(&self) -> Option<&Target> {
        self.targets.last()?.as_ref()
    }

    /// Index of the first segment that could not be resolved.
    pub fn failure(&self) -> Option<usize> {
        self.targets.iter().position(Option::is_none)
    }

    pub fn is_resolved(&self) -> bool {
        self.failure().is_none()
    }

    /// Location of the first segment that could not be resolved.
    pub fn failure_span(&self) -> Option<Span> {
        self.failure().map(|i| self.name.segment_span(i))
    }
}

struct Resolver<'a, S: ?Sized> {
    scope: &'a S,
    observer: &'a dyn Observer,
    def: DefId,
    locals: Locals,
    refs: Vec<DefId>,
}

impl<'a, S: Scope + ?Sized> Resolver<'a, S> {
    /// Resolve a name, consulting local bindings only if `locals` is set.
    fn lookup(&self, name: &Name, locals: bool) -> (Resolution, Option<Entry>) {
        let segs: Vec<&str> = name.segments.iter().map(|s| s.as_str()).collect();
        let mut targets = vec![None; segs.len()];
        let mut last = None;

        let local = match segs[..] {
            [x] if locals => self.locals.index(x),
            _ => None,
        };
        if let Some(i) = local {
            targets[0] = Some(Target::Local(i));
        } else {
            for i in 0..segs.len() {
                let entry = self.scope.lookup(&segs[..i], segs[i]);
                let target = if i + 1 == segs.len() {
                    last = entry;
                    entry.map(|e| Target::Def(e.id))
                } else if let Some(e) = entry {
                    Some(Target::Def(e.id))
                } else if self.scope.has_module(&segs[..=i]) {
                    Some(Target::Module(name.segments[..=i].to_vec()))
                } else {
                    None
                };
                match target {
                    Some(t) => targets[i] = Some(t),
                    None => break,
                }
            }
        }

        let infix = last.map_or(false, |e| e.infix);
        let name = name.clone();
        let resolution = Resolution {
            name,
            targets,
            infix,
        };
        (resolution, last)
    }

    fn reference(&mut self, name: &Name) -> Expr {
        let (res, _) = self.lookup(name, true);
        self.observer.reference_resolved(self.def, &res);
        match res.target() {
            Some(Target::Local(i)) => Expr::Var(*i),
            Some(Target::Def(id)) => {
                self.refs.push(*id);
                Expr::Ref(Ref::Def(*id))
            }
            Some(Target::Module(_)) | None => Expr::Ref(Ref::Unresolved(name.to_string())),
        }
    }

    /// Run a function with a name bound.
    fn bind<T>(&mut self, x: &Ident, f: impl FnOnce(&mut Self) -> T) -> T {
        self.observer.binding_resolved(self.def, x);
        self.locals.push(x.name.clone());
        let y = f(self);
        self.locals.pop();
        y
    }

    fn opt(&mut self, e: &Option<Box<RawExpr>>) -> Option<Box<Expr>> {
        e.as_ref().map(|e| Box::new(self.expr(e)))
    }

    fn expr(&mut self, e: &RawExpr) -> Expr {
        match e {
            Expr::Ref(name) => self.reference(name),
            Expr::Var(i) => Expr::Var(*i),
            Expr::Universe => Expr::Universe,
            Expr::Num(n) => Expr::Num(*n),
            Expr::Hole => Expr::Hole,
            Expr::App(head, args) => {
                let head = Box::new(self.expr(head));
                Expr::App(head, args.iter().map(|a| self.expr(a)).collect())
            }
            Expr::Lam(x, ty, tm) => {
                let ty = self.opt(ty);
                let tm = self.bind(x, |r| r.expr(tm));
                Expr::Lam(x.name.clone(), ty, Box::new(tm))
            }
            Expr::Pi(x, ty, tm) => {
                let ty = self.opt(ty);
                let tm = self.bind(x, |r| r.expr(tm));
                Expr::Pi(x.name.clone(), ty, Box::new(tm))
            }
            Expr::Let(x, ty, v, tm) => {
                let ty = self.opt(ty);
                let v = Box::new(self.expr(v));
                let tm = self.bind(x, |r| r.expr(tm));
                Expr::Let(x.name.clone(), ty, v, Box::new(tm))
            }
            Expr::Case(scrutinee, clauses) => {
                let scrutinee = Box::new(self.expr(scrutinee));
                let clauses = clauses.iter().map(|(pat, tm)| {
                    let mut bound = 0;
                    let pat = self.pattern(pat, &mut bound);
                    let tm = self.expr(tm);
                    self.locals.pop_many(bound);
                    (pat, tm)
                });
                Expr::Case(scrutinee, clauses.collect())
            }
        }
    }

    /// Resolve a pattern, binding its variables.
    ///
    /// An unqualified name without arguments that
    /// does not denote a constructor is a pattern variable.
    fn pattern(&mut self, pat: &RawPattern, bound: &mut usize) -> Pattern {
        match pat {
            Pattern::Wild => Pattern::Wild,
            Pattern::Bind(x) => self.bind_pattern(x, bound),
            Pattern::Con(name, args) => {
                let (res, entry) = self.lookup(name, false);
                let con = entry.map_or(false, |e| e.kind == Kind::Constructor);
                if args.is_empty() && !name.is_qualified() && !con {
                    let x = Ident::new(name.last(), name.span);
                    return self.bind_pattern(&x, bound);
                }
                self.observer.pattern_resolved(self.def, &res);
                let head = match entry {
                    Some(e) if res.is_resolved() => {
                        self.refs.push(e.id);
                        Ref::Def(e.id)
                    }
                    _ => Ref::Unresolved(name.to_string()),
                };
                let args = args.iter().map(|a| self.pattern(a, bound));
                Pattern::Con(head, args.collect())
            }
        }
    }

    fn bind_pattern(&mut self, x: &Ident, bound: &mut usize) -> Pattern {
        self.observer.binding_resolved(self.def, x);
        self.locals.push(x.name.clone());
        *bound += 1;
        Pattern::Bind(x.name.clone())
    }
}

/// Resolve the draft of one definition.
pub fn resolve<S: Scope + ?Sized>(
    def: DefId,
    draft: &Draft,
    scope: &mut S,
    observer: &dyn Observer,
) -> Concrete {
    observer.before_definition_resolved(def);
    let concrete = match &draft.error {
        Some(err) => Concrete::degenerate(def, draft.span, err.clone()),
        None => {
            scope.enter(&draft.name.module);
            let mut r = Resolver {
                scope: &*scope,
                observer,
                def,
                locals: Locals::new(),
                refs: Vec::new(),
            };
            let ty = draft.ty.as_ref().map(|ty| r.expr(ty));
            let body = draft.body.as_ref().map(|tm| r.expr(tm));
            let mut refs = r.refs;
            refs.sort_unstable();
            refs.dedup();
            Concrete {
                def,
                span: draft.span,
                ty,
                body,
                refs,
                error: None,
            }
        }
    };
    observer.definition_resolved(&concrete);
    concrete
}

/// Resolve the drafts of a group of definitions.
///
/// The cancellation token is checked before each definition;
/// if it fires, nothing of the group is returned.
pub fn resolve_group<'d, S, I>(
    root: I,
    scope: &mut S,
    observer: &dyn Observer,
    cancel: &Cancel,
) -> Result<Vec<Concrete>, Cancelled>
where
    S: Scope + ?Sized,
    I: IntoIterator<Item = (DefId, &'d Draft)>,
{
    root.into_iter()
        .map(|(def, draft)| {
            cancel.check()?;
            Ok::<_, Cancelled>(resolve(def, draft, scope, observer))
        })
        .collect()
}

#[cfg(test)]
use crate::{
    concrete::drafts,
    namespace::Namespace,
    observe::{Collect, Event},
    store::{FullName, Store},
};

/// Declare and resolve a source text in module `M`.
#[cfg(test)]
fn resolve_src(src: &str, observer: &Collect) -> (Store, Vec<Concrete>) {
    let store = Store::new();
    let module = ["M".to_string()];
    let drafts = drafts(&module, &tessera_syntax::parse(src));
    let ids: Vec<_> = drafts
        .iter()
        .map(|d| store.declare(d.name.clone(), d.kind, d.infix))
        .collect();
    let mut ns = Namespace::from_definitions(&store.live());
    let root = ids.iter().copied().zip(drafts.iter());
    let cs = resolve_group(root, &mut ns, observer, &Cancel::new());
    (store, cs.unwrap())
}

#[cfg(test)]
fn id(store: &Store, name: &str) -> DefId {
    store.lookup(&FullName::parse(name)).unwrap()
}

#[test]
fn qualified_failure_index() {
    let observer = Collect::default();
    let src = "module A { def x := 1. } def c := A.B.c.";
    let (_, cs) = resolve_src(src, &observer);
    let res = observer.events().into_iter().find_map(|e| match e {
        Event::Reference(_, res) => Some(res),
        _ => None,
    });
    let res = res.unwrap();
    assert_eq!(res.name.segments, ["A", "B", "c"]);
    assert_eq!(res.failure(), Some(1));
    assert_eq!(res.targets[0], Some(Target::Module(vec!["A".into()])));
    assert_eq!(res.targets[1..], [None, None]);
    assert_eq!(res.failure_span(), Some(Span::new(36, 37)));
    assert_eq!(cs[1].unresolved(), ["A.B.c"]);
}

#[test]
fn locals_and_globals() {
    let observer = Collect::default();
    let src = r"
        data Nat | zero | suc Nat.
        infix def + (a b : Nat) : Nat := case a of | zero => b | suc n => suc (n + b) end.
        def double (n : Nat) := let m := n in m + m.
    ";
    let (store, cs) = resolve_src(src, &observer);
    let (nat, zero, suc, plus) = (
        id(&store, "M.Nat"),
        id(&store, "M.Nat.zero"),
        id(&store, "M.Nat.suc"),
        id(&store, "M.+"),
    );
    assert_eq!(cs[2].refs, [nat]);
    assert_eq!(cs[3].refs, [nat, zero, suc, plus]);
    assert_eq!(cs[4].refs, [nat, plus]);
    assert!(cs.iter().all(|c| c.unresolved().is_empty()));

    // `n` in the pattern `suc n` is a binding, `zero` is a constructor
    let events = observer.events();
    let binds = |def: DefId| {
        let names = events.iter().filter_map(|e| match e {
            Event::Binding(d, x) if *d == def => Some(x.as_str()),
            _ => None,
        });
        names.collect::<Vec<_>>()
    };
    assert_eq!(binds(plus), ["a", "b", "a", "b", "n"]);
    let infix = events.iter().any(|e| match e {
        Event::Reference(d, res) => *d == id(&store, "M.double") && res.infix,
        _ => false,
    });
    assert!(infix);
}

#[test]
fn de_bruijn() {
    let observer = Collect::default();
    let (_, cs) = resolve_src(r"def k := \x y => x.", &observer);
    let body = cs[0].body.as_ref().unwrap();
    let expected = Expr::Lam(
        "x".into(),
        None,
        Box::new(Expr::Lam("y".into(), None, Box::new(Expr::Var(1)))),
    );
    assert_eq!(*body, expected);
}

#[test]
fn cancelled() {
    let store = Store::new();
    let drafts = drafts(&[], &tessera_syntax::parse("def f := 1. def g := 2."));
    let ids: Vec<_> = drafts
        .iter()
        .map(|d| store.declare(d.name.clone(), d.kind, d.infix))
        .collect();
    let mut ns = Namespace::from_definitions(&store.live());
    let cancel = Cancel::new();
    cancel.cancel();
    let observer = Collect::default();
    let root = ids.into_iter().zip(drafts.iter());
    assert_eq!(resolve_group(root, &mut ns, &observer, &cancel), Err(Cancelled));
    assert!(observer.events().is_empty());
}
