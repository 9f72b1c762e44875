//! Syntax trees produced by the parser.

use crate::Error;
use alloc::{boxed::Box, string::String, vec::Vec};
use core::fmt::{self, Display};
use core::ops::Range;

/// Byte range in a source text.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both spans.
    pub fn join(self, other: Self) -> Self {
        Self::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl From<Range<usize>> for Span {
    fn from(r: Range<usize>) -> Self {
        Self::new(r.start, r.end)
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Unqualified name occurring in a binding position.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        let name = name.into();
        Self { name, span }
    }
}

impl Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.name.fmt(f)
    }
}

/// Possibly qualified name occurring in a reference position, such as `A.B.c`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Name {
    pub segments: Vec<String>,
    pub span: Span,
}

impl Name {
    pub fn single(name: impl Into<String>, span: Span) -> Self {
        let segments = Vec::from([name.into()]);
        Self { segments, span }
    }

    pub fn is_qualified(&self) -> bool {
        self.segments.len() > 1
    }

    /// Segments before the last one.
    pub fn path(&self) -> &[String] {
        &self.segments[..self.segments.len().saturating_sub(1)]
    }

    pub fn last(&self) -> &str {
        self.segments.last().map(|s| s.as_str()).unwrap_or_default()
    }

    /// Span of the `i`-th segment.
    pub fn segment_span(&self, i: usize) -> Span {
        let start = self.segments[..i]
            .iter()
            .fold(self.span.start, |acc, seg| acc + seg.len() + 1);
        let len = self.segments.get(i).map_or(0, |seg| seg.len());
        Span::new(start, (start + len).min(self.span.end))
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut iter = self.segments.iter();
        if let Some(first) = iter.next() {
            first.fmt(f)?;
        }
        iter.try_for_each(|seg| write!(f, ".{}", seg))
    }
}

/// Parameter or lambda binder, optionally annotated with a type.
///
/// Anonymous binders are named `_`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binder {
    pub name: Ident,
    pub ty: Option<Term>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Term {
    Name(Name),
    Num(u64, Span),
    Type(Span),
    /// `_`
    Hole(Span),
    App(Box<Term>, Vec<Term>),
    /// `\ x (y : A) => t`
    Lam(Vec<Binder>, Box<Term>),
    /// `(x y : A) (z : B) -> t`
    Pi(Vec<Binder>, Box<Term>),
    /// `A -> B`
    Arrow(Box<Term>, Box<Term>),
    /// `let x : A := t in u`
    Let(Box<Binder>, Box<Term>, Box<Term>),
    /// `case t of | p => u end`
    Case(Box<Term>, Vec<Clause>, Span),
}

impl Term {
    /// Span of the term, as far as it can be determined from its leaves.
    pub fn span(&self) -> Span {
        match self {
            Self::Name(n) => n.span,
            Self::Num(_, s) | Self::Type(s) | Self::Hole(s) | Self::Case(_, _, s) => *s,
            Self::App(head, args) => args.iter().fold(head.span(), |acc, a| acc.join(a.span())),
            Self::Lam(bs, t) | Self::Pi(bs, t) => bs
                .iter()
                .fold(t.span(), |acc, b| acc.join(b.name.span)),
            Self::Arrow(a, b) => a.span().join(b.span()),
            Self::Let(b, _, t) => b.name.span.join(t.span()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Clause {
    pub pattern: Pattern,
    pub body: Term,
}

/// Pattern of a `case` clause.
///
/// Whether a name without arguments denotes a constructor or
/// a fresh pattern variable is decided during name resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pattern {
    Wild(Span),
    Con(Name, Vec<Pattern>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DeclKind {
    Def,
    Data,
    Class,
    Instance,
}

impl Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Def => "def",
            Self::Data => "data",
            Self::Class => "class",
            Self::Instance => "instance",
        }
        .fmt(f)
    }
}

/// Constructor of a data type or field of a class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Part {
    pub name: Ident,
    pub params: Vec<Binder>,
    pub ty: Option<Term>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decl {
    pub kind: DeclKind,
    pub infix: bool,
    pub name: Ident,
    pub params: Vec<Binder>,
    pub ty: Option<Term>,
    pub body: Option<Term>,
    pub parts: Vec<Part>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Module {
    pub name: Ident,
    pub items: Vec<Item>,
    pub span: Span,
}

/// Item that could not be parsed.
///
/// If the parser got far enough to read the declared kind and name,
/// these are kept, so that the definition remains known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Broken {
    pub kind: Option<DeclKind>,
    pub name: Option<Ident>,
    pub error: Error,
    /// location of the error
    pub at: Span,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Item {
    Decl(Decl),
    Module(Module),
    Broken(Broken),
}

/// Items of one source file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Group {
    pub items: Vec<Item>,
}

impl Group {
    /// All broken items, including those inside modules.
    pub fn errors(&self) -> Vec<&Broken> {
        fn go<'a>(items: &'a [Item], acc: &mut Vec<&'a Broken>) {
            for item in items {
                match item {
                    Item::Broken(b) => acc.push(b),
                    Item::Module(m) => go(&m.items, acc),
                    Item::Decl(_) => (),
                }
            }
        }
        let mut acc = Vec::new();
        go(&self.items, &mut acc);
        acc
    }
}
