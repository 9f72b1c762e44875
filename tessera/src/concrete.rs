//! Desugared representation of definitions.
//!
//! Syntax is first turned into [`Draft`]s, one per definition,
//! whose names are still unresolved.
//! Name resolution then turns a draft into a [`Concrete`] definition,
//! which is what gets ordered, compared and typechecked.

use crate::store::{DefId, FullName, Kind};
use rayon::prelude::*;
use tessera_syntax::{self as syn, Binder, Ident, Item, Name, Span, Term};

/// Expression, generic over references `R` and bound variables `V`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr<R = Ref, V = String> {
    /// reference to a definition
    Ref(R),
    /// bound variable, as de Bruijn index
    Var(usize),
    Universe,
    Num(u64),
    Hole,
    App(Box<Self>, Vec<Self>),
    Lam(V, Option<Box<Self>>, Box<Self>),
    Pi(V, Option<Box<Self>>, Box<Self>),
    Let(V, Option<Box<Self>>, Box<Self>, Box<Self>),
    Case(Box<Self>, Vec<(Pattern<R, V>, Self)>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pattern<R = Ref, V = String> {
    Wild,
    Bind(V),
    Con(R, Vec<Self>),
}

/// Resolved reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ref {
    Def(DefId),
    /// name that is not in scope
    Unresolved(String),
}

/// Expression as produced from syntax, before name resolution.
pub type RawExpr = Expr<Name, Ident>;
pub type RawPattern = Pattern<Name, Ident>;

impl<R, V> Pattern<R, V> {
    pub fn each_ref<'a>(&'a self, f: &mut impl FnMut(&'a R)) {
        match self {
            Self::Wild | Self::Bind(_) => (),
            Self::Con(r, args) => {
                f(r);
                args.iter().for_each(|a| a.each_ref(f))
            }
        }
    }
}

impl<R, V> Expr<R, V> {
    /// Call a function on every reference, including those in patterns.
    pub fn each_ref<'a>(&'a self, f: &mut impl FnMut(&'a R)) {
        match self {
            Self::Ref(r) => f(r),
            Self::Var(_) | Self::Universe | Self::Num(_) | Self::Hole => (),
            Self::App(head, args) => {
                head.each_ref(f);
                args.iter().for_each(|a| a.each_ref(f))
            }
            Self::Lam(_, ty, tm) | Self::Pi(_, ty, tm) => {
                ty.iter().for_each(|ty| ty.each_ref(f));
                tm.each_ref(f)
            }
            Self::Let(_, ty, v, tm) => {
                ty.iter().for_each(|ty| ty.each_ref(f));
                v.each_ref(f);
                tm.each_ref(f)
            }
            Self::Case(scrutinee, clauses) => {
                scrutinee.each_ref(f);
                for (pat, tm) in clauses {
                    pat.each_ref(f);
                    tm.each_ref(f)
                }
            }
        }
    }

    /// Return true if the predicate holds for any subexpression.
    pub fn any(&self, p: &impl Fn(&Self) -> bool) -> bool {
        p(self)
            || match self {
                Self::Ref(_) | Self::Var(_) | Self::Universe | Self::Num(_) | Self::Hole => false,
                Self::App(head, args) => head.any(p) || args.iter().any(|a| a.any(p)),
                Self::Lam(_, ty, tm) | Self::Pi(_, ty, tm) => {
                    ty.iter().any(|ty| ty.any(p)) || tm.any(p)
                }
                Self::Let(_, ty, v, tm) => ty.iter().any(|ty| ty.any(p)) || v.any(p) || tm.any(p),
                Self::Case(scrutinee, clauses) => {
                    scrutinee.any(p) || clauses.iter().any(|(_, tm)| tm.any(p))
                }
            }
    }
}

/// Definition after desugaring, before name resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Draft {
    pub name: FullName,
    pub kind: Kind,
    pub infix: bool,
    pub span: Span,
    pub ty: Option<RawExpr>,
    pub body: Option<RawExpr>,
    /// parse error that left only the name of the definition readable
    pub error: Option<String>,
}

fn term(tm: &Term) -> RawExpr {
    match tm {
        Term::Name(n) => Expr::Ref(n.clone()),
        Term::Num(n, _) => Expr::Num(*n),
        Term::Type(_) => Expr::Universe,
        Term::Hole(_) => Expr::Hole,
        Term::App(head, args) => Expr::App(Box::new(term(head)), args.iter().map(term).collect()),
        Term::Lam(bs, tm) => lams(bs.iter(), term(tm)),
        Term::Pi(bs, tm) => pis(bs.iter(), term(tm)),
        Term::Arrow(a, b) => {
            let x = Ident::new("_", a.span());
            Expr::Pi(x, Some(Box::new(term(a))), Box::new(term(b)))
        }
        Term::Let(b, v, tm) => {
            let (v, tm) = (Box::new(term(v)), Box::new(term(tm)));
            Expr::Let(b.name.clone(), binder_ty(b), v, tm)
        }
        Term::Case(scrutinee, clauses, _) => {
            let clauses = clauses.iter().map(|c| (pattern(&c.pattern), term(&c.body)));
            Expr::Case(Box::new(term(scrutinee)), clauses.collect())
        }
    }
}

fn pattern(pat: &syn::Pattern) -> RawPattern {
    match pat {
        syn::Pattern::Wild(_) => Pattern::Wild,
        syn::Pattern::Con(name, args) => Pattern::Con(name.clone(), args.iter().map(pattern).collect()),
    }
}

fn binder_ty(b: &Binder) -> Option<Box<RawExpr>> {
    b.ty.as_ref().map(|ty| Box::new(term(ty)))
}

fn pis<'a>(bs: impl DoubleEndedIterator<Item = &'a Binder>, tm: RawExpr) -> RawExpr {
    bs.rev().fold(tm, |acc, b| {
        Expr::Pi(b.name.clone(), binder_ty(b), Box::new(acc))
    })
}

fn lams<'a>(bs: impl DoubleEndedIterator<Item = &'a Binder>, tm: RawExpr) -> RawExpr {
    bs.rev().fold(tm, |acc, b| {
        Expr::Lam(b.name.clone(), binder_ty(b), Box::new(acc))
    })
}

/// Apply a data type or class to its (named) parameters.
fn applied(decl: &syn::Decl) -> RawExpr {
    let head = Expr::Ref(Name::single(decl.name.name.clone(), decl.name.span));
    let args: Vec<_> = decl
        .params
        .iter()
        .map(|p| match p.name.name.as_str() {
            "_" => Expr::Hole,
            name => Expr::Ref(Name::single(name, p.name.span)),
        })
        .collect();
    if args.is_empty() {
        head
    } else {
        Expr::App(Box::new(head), args)
    }
}

impl Draft {
    /// Desugar a declaration into drafts for
    /// the declared definition and its constructors or fields.
    ///
    /// Parameters of the declaration are bound in
    /// its type (as Pi) and its body (as lambda).
    /// Constructors and fields are placed in a module named after their parent.
    pub fn build(module: &[String], decl: &syn::Decl) -> Vec<Self> {
        let params = &decl.params;
        let kind = Kind::from(decl.kind);
        let (ty, body) = match kind {
            Kind::Data | Kind::Class => {
                let ty = decl.ty.as_ref().map_or(Expr::Universe, term);
                (Some(pis(params.iter(), ty)), None)
            }
            _ => (
                decl.ty.as_ref().map(|ty| pis(params.iter(), term(ty))),
                decl.body.as_ref().map(|tm| lams(params.iter(), term(tm))),
            ),
        };
        let head = Self {
            name: FullName::new(module.to_vec(), decl.name.name.clone()),
            kind,
            infix: decl.infix,
            span: decl.span,
            ty,
            body,
            error: None,
        };

        let mut inner = module.to_vec();
        inner.push(decl.name.name.clone());
        let make_part = |part: &syn::Part, kind, ty| Self {
            name: FullName::new(inner.clone(), part.name.name.clone()),
            kind,
            infix: false,
            span: part.name.span,
            ty: Some(pis(params.iter(), ty)),
            body: None,
            error: None,
        };
        let parts = decl.parts.iter().filter_map(|p| match kind {
            Kind::Data => {
                let result = p.ty.as_ref().map_or_else(|| applied(decl), term);
                Some(make_part(p, Kind::Constructor, pis(p.params.iter(), result)))
            }
            Kind::Class => {
                let result = p.ty.as_ref().map_or(Expr::Hole, term);
                let this = Ident::new("this", p.name.span);
                let field = pis(p.params.iter(), result);
                let ty = Expr::Pi(this, Some(Box::new(applied(decl))), Box::new(field));
                Some(make_part(p, Kind::Field, ty))
            }
            // only data types and classes have parts
            _ => None,
        });
        core::iter::once(head).chain(parts).collect()
    }

    /// Draft for a broken item whose name could be read.
    pub fn broken(module: &[String], broken: &syn::Broken) -> Option<Self> {
        let name = broken.name.as_ref()?;
        Some(Self {
            name: FullName::new(module.to_vec(), name.name.clone()),
            kind: broken.kind.map_or(Kind::Function, Kind::from),
            infix: false,
            span: broken.span,
            ty: None,
            body: None,
            error: Some(broken.error.to_string()),
        })
    }

    pub fn is_degenerate(&self) -> bool {
        self.error.is_some()
    }
}

/// Build the drafts of all definitions in a source file, in source order.
pub fn drafts(module: &[String], group: &syn::Group) -> Vec<Draft> {
    fn flatten<'a>(path: &[String], items: &'a [Item], acc: &mut Vec<(Vec<String>, &'a Item)>) {
        for item in items {
            match item {
                Item::Module(m) => {
                    let mut path = path.to_vec();
                    path.push(m.name.name.clone());
                    flatten(&path, &m.items, acc)
                }
                _ => acc.push((path.to_vec(), item)),
            }
        }
    }
    let mut items = Vec::new();
    flatten(module, &group.items, &mut items);

    let drafts: Vec<Vec<Draft>> = items
        .par_iter()
        .map(|(path, item)| match item {
            Item::Decl(decl) => Draft::build(path, decl),
            Item::Broken(b) => Draft::broken(path, b).into_iter().collect(),
            Item::Module(_) => Vec::new(),
        })
        .collect();
    drafts.into_iter().flatten().collect()
}

/// Resolved definition.
///
/// Equality ignores the source location,
/// so that moving a definition around does not make it look changed.
#[derive(Clone, Debug)]
pub struct Concrete {
    pub def: DefId,
    pub span: Span,
    pub ty: Option<Expr>,
    pub body: Option<Expr>,
    /// referenced definitions, sorted and without duplicates
    pub refs: Vec<DefId>,
    /// marker of a definition whose syntax is broken
    pub error: Option<String>,
}

impl PartialEq for Concrete {
    fn eq(&self, other: &Self) -> bool {
        self.def == other.def
            && self.ty == other.ty
            && self.body == other.body
            && self.refs == other.refs
            && self.error == other.error
    }
}

impl Eq for Concrete {}

impl Concrete {
    /// Concrete definition that carries only an error marker.
    pub fn degenerate(def: DefId, span: Span, error: String) -> Self {
        Self {
            def,
            span,
            ty: None,
            body: None,
            refs: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.error.is_some()
    }

    fn exprs(&self) -> impl Iterator<Item = &Expr> {
        self.ty.iter().chain(self.body.iter())
    }

    /// Names that could not be resolved.
    pub fn unresolved(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for e in self.exprs() {
            e.each_ref(&mut |r| {
                if let Ref::Unresolved(name) = r {
                    names.push(name.as_str())
                }
            })
        }
        names
    }

    pub fn any(&self, p: &impl Fn(&Expr) -> bool) -> bool {
        self.exprs().any(|e| e.any(p))
    }
}

#[cfg(test)]
fn decl(s: &str) -> syn::Decl {
    match tessera_syntax::parse(s).items.into_iter().next() {
        Some(Item::Decl(d)) => d,
        other => panic!("expected declaration, got {:?}", other),
    }
}

#[test]
fn desugar_params() {
    let module = ["M".to_string()];
    let drafts = Draft::build(&module, &decl("def id (A : Type) (x : A) : A := x."));
    assert_eq!(drafts.len(), 1);
    let id = &drafts[0];
    assert_eq!(id.name.to_string(), "M.id");
    match &id.ty {
        Some(Expr::Pi(a, Some(_), rest)) => {
            assert_eq!(a.name, "A");
            assert!(matches!(&**rest, Expr::Pi(x, _, _) if x.name == "x"));
        }
        other => panic!("unexpected type {:?}", other),
    }
    assert!(matches!(&id.body, Some(Expr::Lam(a, _, _)) if a.name == "A"));
}

#[test]
fn desugar_parts() {
    let drafts = Draft::build(&[], &decl("data List (A : Type) | nil | cons A (List A)."));
    let names: Vec<_> = drafts.iter().map(|d| d.name.to_string()).collect();
    assert_eq!(names, ["List", "List.nil", "List.cons"]);
    assert_eq!(drafts[2].kind, Kind::Constructor);
    // cons : (A : Type) -> A -> List A -> List A
    let mut refs = Vec::new();
    drafts[2].ty.iter().for_each(|ty| ty.each_ref(&mut |n| refs.push(n.to_string())));
    assert_eq!(refs, ["A", "List", "A", "List", "A"]);

    let drafts = Draft::build(&[], &decl("class Pointed (A : Type) | point : A."));
    assert_eq!(drafts[1].kind, Kind::Field);
    assert_eq!(drafts[1].name.to_string(), "Pointed.point");
}

#[test]
fn degenerate() {
    let group = tessera_syntax::parse("def f := . data D | c. module N { def g := }");
    let drafts = drafts(&["M".to_string()], &group);
    let names: Vec<_> = drafts.iter().map(|d| d.name.to_string()).collect();
    assert_eq!(names, ["M.f", "M.D", "M.D.c", "M.N.g"]);
    assert!(drafts[0].is_degenerate());
    assert!(!drafts[1].is_degenerate());
    assert!(drafts[3].is_degenerate());
}
