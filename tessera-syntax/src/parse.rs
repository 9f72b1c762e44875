//! Recursive descent parser with per-item error recovery.

use crate::ast::*;
use crate::lex::{tokens, Token};
use crate::Error;
use alloc::{boxed::Box, vec::Vec};

type Located = (Error, Span);

pub struct Parser<'s> {
    tokens: Vec<(Token<'s>, Span)>,
    pos: usize,
    eof: Span,
}

impl<'s> Parser<'s> {
    pub fn new(s: &'s str) -> Self {
        Self {
            tokens: tokens(s),
            pos: 0,
            eof: Span::new(s.len(), s.len()),
        }
    }

    fn peek(&self) -> Option<&Token<'s>> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn span(&self) -> Span {
        self.tokens.get(self.pos).map_or(self.eof, |(_, s)| *s)
    }

    /// End of the last consumed token.
    fn last_end(&self) -> Span {
        let prev = self.pos.checked_sub(1).and_then(|i| self.tokens.get(i));
        prev.map_or(self.eof, |(_, s)| Span::new(s.end, s.end))
    }

    fn advance(&mut self) -> Option<(Token<'s>, Span)> {
        let next = self.tokens.get(self.pos).cloned();
        if next.is_some() {
            self.pos += 1
        }
        next
    }

    fn eat(&mut self, token: &Token<'s>) -> Option<Span> {
        let span = self.span();
        if self.peek() == Some(token) {
            self.pos += 1;
            Some(span)
        } else {
            None
        }
    }

    /// Error at the current position.
    fn fail(&self, expected: Error) -> Located {
        let err = match self.peek() {
            Some(Token::Error) => Error::UnknownToken,
            _ => expected,
        };
        (err, self.span())
    }

    fn expect(&mut self, token: &Token<'s>, expected: Error) -> Result<Span, Located> {
        self.eat(token).ok_or_else(|| self.fail(expected))
    }

    /// Parse items until the end of input or a closing brace.
    pub fn items(&mut self, nested: bool) -> Vec<Item> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                None => return items,
                Some(Token::RBrace) if nested => return items,
                _ => items.push(self.item()),
            }
        }
    }

    fn item(&mut self) -> Item {
        let start = self.pos;
        let first = self.span();
        let mut kind = None;
        let mut name = None;
        let result = if self.peek() == Some(&Token::Module) {
            self.module().map(Item::Module)
        } else {
            self.decl(&mut kind, &mut name).map(Item::Decl)
        };
        result.unwrap_or_else(|(error, at)| {
            self.recover(start);
            let span = first.join(self.last_end());
            let broken = Broken {
                kind,
                name,
                error,
                at,
                span,
            };
            Item::Broken(broken)
        })
    }

    /// Skip to the end of the current item.
    fn recover(&mut self, start: usize) {
        if self.pos == start {
            self.advance();
        }
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token {
                Token::Period if depth == 0 => {
                    self.advance();
                    return;
                }
                Token::RBrace if depth == 0 => return,
                Token::RBrace => depth -= 1,
                Token::LBrace => depth += 1,
                t if depth == 0 && t.starts_item() => return,
                _ => (),
            }
            self.advance();
        }
    }

    fn module(&mut self) -> Result<Module, Located> {
        let start = self.expect(&Token::Module, Error::ExpectedItem)?;
        let name = self.ident()?;
        self.expect(&Token::LBrace, Error::ExpectedLBrace)?;
        let mut items = self.items(true);
        let end = match self.eat(&Token::RBrace) {
            Some(end) => end,
            None => {
                let (error, at) = self.fail(Error::ExpectedRBrace);
                let span = at;
                let (kind, name) = (None, None);
                items.push(Item::Broken(Broken {
                    kind,
                    name,
                    error,
                    at,
                    span,
                }));
                at
            }
        };
        let span = start.join(end);
        Ok(Module { name, items, span })
    }

    fn decl(
        &mut self,
        kind: &mut Option<DeclKind>,
        name: &mut Option<Ident>,
    ) -> Result<Decl, Located> {
        let start = self.span();
        let infix = self.eat(&Token::Infix).is_some();
        let k = match self.peek() {
            Some(Token::Def) => DeclKind::Def,
            Some(Token::Data) => DeclKind::Data,
            Some(Token::Class) => DeclKind::Class,
            Some(Token::Instance) => DeclKind::Instance,
            _ => return Err(self.fail(Error::ExpectedItem)),
        };
        self.advance();
        *kind = Some(k);
        let id = self.ident()?;
        *name = Some(id.clone());

        let params = self.params()?;
        let ty = self.eat(&Token::Colon).map(|_| self.term()).transpose()?;
        let body = self.eat(&Token::ColonEq).map(|_| self.term()).transpose()?;
        let mut parts = Vec::new();
        while self.eat(&Token::Bar).is_some() {
            parts.push(self.part()?)
        }
        let end = self.expect(&Token::Period, Error::ExpectedPeriod)?;
        Ok(Decl {
            kind: k,
            infix,
            name: id,
            params,
            ty,
            body,
            parts,
            span: start.join(end),
        })
    }

    fn ident(&mut self) -> Result<Ident, Located> {
        match self.tokens.get(self.pos) {
            Some((Token::Ident(s), span)) => {
                let id = Ident::new(*s, *span);
                self.pos += 1;
                Ok(id)
            }
            _ => Err(self.fail(Error::ExpectedIdent)),
        }
    }

    /// Return true if a parenthesised group `(x y : A)` follows.
    fn typed_group_ahead(&self) -> bool {
        if self.peek() != Some(&Token::LPar) {
            return false;
        }
        let idents = self.tokens[self.pos + 1..]
            .iter()
            .take_while(|(t, _)| matches!(t, Token::Ident(_)))
            .count();
        let after = self.tokens.get(self.pos + 1 + idents).map(|(t, _)| t);
        idents > 0 && after == Some(&Token::Colon)
    }

    fn typed_group(&mut self) -> Result<Vec<Binder>, Located> {
        self.expect(&Token::LPar, Error::ExpectedTerm)?;
        let mut names = Vec::new();
        while self.eat(&Token::Colon).is_none() {
            names.push(self.ident()?)
        }
        let ty = self.term()?;
        self.expect(&Token::RPar, Error::ExpectedRPar)?;
        let binders = names.into_iter().map(|name| Binder {
            name,
            ty: Some(ty.clone()),
        });
        Ok(binders.collect())
    }

    /// Untyped names, wildcards and typed groups.
    fn params(&mut self) -> Result<Vec<Binder>, Located> {
        let mut params = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Ident(_)) => params.push(Binder {
                    name: self.ident()?,
                    ty: None,
                }),
                Some(Token::Underscore) => {
                    let span = self.span();
                    self.advance();
                    let name = Ident::new("_", span);
                    params.push(Binder { name, ty: None })
                }
                Some(Token::LPar) if self.typed_group_ahead() => {
                    params.extend(self.typed_group()?)
                }
                _ => return Ok(params),
            }
        }
    }

    fn part(&mut self) -> Result<Part, Located> {
        let name = self.ident()?;
        let mut params = Vec::new();
        loop {
            if self.typed_group_ahead() {
                params.extend(self.typed_group()?)
            } else if self.atom_ahead() {
                let ty = self.atom()?;
                let name = Ident::new("_", ty.span());
                params.push(Binder { name, ty: Some(ty) })
            } else {
                break;
            }
        }
        let ty = self.eat(&Token::Colon).map(|_| self.term()).transpose()?;
        Ok(Part { name, params, ty })
    }

    pub(crate) fn term(&mut self) -> Result<Term, Located> {
        match self.peek() {
            Some(Token::Backslash) => {
                self.advance();
                let binders = self.params()?;
                if binders.is_empty() {
                    return Err(self.fail(Error::ExpectedIdent));
                }
                self.expect(&Token::FatArrow, Error::ExpectedFatArrow)?;
                Ok(Term::Lam(binders, Box::new(self.term()?)))
            }
            Some(Token::Let) => {
                self.advance();
                let name = self.ident()?;
                let ty = self.eat(&Token::Colon).map(|_| self.term()).transpose()?;
                self.expect(&Token::ColonEq, Error::ExpectedColonEq)?;
                let value = self.term()?;
                self.expect(&Token::In, Error::ExpectedIn)?;
                let body = self.term()?;
                let binder = Box::new(Binder { name, ty });
                Ok(Term::Let(binder, Box::new(value), Box::new(body)))
            }
            Some(Token::LPar) if self.typed_group_ahead() => {
                let mut binders = Vec::new();
                while self.typed_group_ahead() {
                    binders.extend(self.typed_group()?)
                }
                self.expect(&Token::Arrow, Error::ExpectedArrow)?;
                Ok(Term::Pi(binders, Box::new(self.term()?)))
            }
            _ => {
                let lhs = self.app()?;
                match self.eat(&Token::Arrow) {
                    Some(_) => Ok(Term::Arrow(Box::new(lhs), Box::new(self.term()?))),
                    None => Ok(lhs),
                }
            }
        }
    }

    fn atom_ahead(&self) -> bool {
        use Token::*;
        matches!(
            self.peek(),
            Some(Ident(_) | Num(_) | Type | Underscore | LPar | Case)
        )
    }

    fn app(&mut self) -> Result<Term, Located> {
        let head = self.atom()?;
        let mut args = Vec::new();
        while self.atom_ahead() {
            args.push(self.atom()?)
        }
        if args.is_empty() {
            Ok(head)
        } else {
            Ok(Term::App(Box::new(head), args))
        }
    }

    fn name(&mut self) -> Result<Name, Located> {
        let first = self.ident()?;
        let mut span = first.span;
        let mut segments = Vec::from([first.name]);
        while self.eat(&Token::Dot).is_some() {
            let seg = self.ident()?;
            span = span.join(seg.span);
            segments.push(seg.name);
        }
        Ok(Name { segments, span })
    }

    fn atom(&mut self) -> Result<Term, Located> {
        let span = self.span();
        match self.peek() {
            Some(Token::Ident(_)) => Ok(Term::Name(self.name()?)),
            Some(Token::Num(n)) => {
                let n = *n;
                self.advance();
                Ok(Term::Num(n, span))
            }
            Some(Token::Type) => {
                self.advance();
                Ok(Term::Type(span))
            }
            Some(Token::Underscore) => {
                self.advance();
                Ok(Term::Hole(span))
            }
            Some(Token::LPar) => {
                self.advance();
                let tm = self.term()?;
                self.expect(&Token::RPar, Error::ExpectedRPar)?;
                Ok(tm)
            }
            Some(Token::Case) => {
                self.advance();
                let scrutinee = self.term()?;
                self.expect(&Token::Of, Error::ExpectedOf)?;
                let mut clauses = Vec::new();
                while self.eat(&Token::Bar).is_some() {
                    let pattern = self.pattern()?;
                    self.expect(&Token::FatArrow, Error::ExpectedFatArrow)?;
                    let body = self.term()?;
                    clauses.push(Clause { pattern, body })
                }
                let end = self.expect(&Token::End, Error::ExpectedEnd)?;
                Ok(Term::Case(Box::new(scrutinee), clauses, span.join(end)))
            }
            _ => Err(self.fail(Error::ExpectedTerm)),
        }
    }

    fn pattern(&mut self) -> Result<Pattern, Located> {
        match self.peek() {
            Some(Token::Ident(_)) => {
                let name = self.name()?;
                let mut args = Vec::new();
                while let Some(Token::Ident(_) | Token::Underscore | Token::LPar) = self.peek() {
                    args.push(self.pattern_atom()?)
                }
                Ok(Pattern::Con(name, args))
            }
            _ => self.pattern_atom(),
        }
    }

    fn pattern_atom(&mut self) -> Result<Pattern, Located> {
        match self.peek() {
            Some(Token::Underscore) => {
                let span = self.span();
                self.advance();
                Ok(Pattern::Wild(span))
            }
            Some(Token::Ident(_)) => Ok(Pattern::Con(self.name()?, Vec::new())),
            Some(Token::LPar) => {
                self.advance();
                let pat = self.pattern()?;
                self.expect(&Token::RPar, Error::ExpectedRPar)?;
                Ok(pat)
            }
            _ => Err(self.fail(Error::ExpectedPattern)),
        }
    }

    /// Return true if all tokens have been consumed.
    pub(crate) fn is_done(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

#[cfg(test)]
fn term(s: &str) -> Result<Term, Error> {
    crate::parse_term(s)
}

#[cfg(test)]
fn names(items: &[Item]) -> Vec<alloc::string::String> {
    use alloc::string::ToString;
    let name = |item: &Item| match item {
        Item::Decl(d) => d.name.to_string(),
        Item::Module(m) => m.name.to_string(),
        Item::Broken(b) => b.name.as_ref().map_or("?".to_string(), |n| n.to_string()),
    };
    items.iter().map(name).collect()
}

#[test]
fn positive() {
    let src = r"
        module Nats {
          data Nat | zero | suc Nat.
          infix def + (a b : Nat) : Nat := case a of
            | zero => b
            | suc n => suc (n + b)
          end.
        }
        class Monoid (A : Type) | unit : A | op : A -> A -> A.
        def id (A : Type) : A -> A := \x => let y := x in y.
        def two := Nats.suc (Nats.suc Nats.zero).
    ";
    let group = crate::parse(src);
    assert!(group.errors().is_empty());
    assert_eq!(names(&group.items), ["Nats", "Monoid", "id", "two"]);

    let nats = match &group.items[0] {
        Item::Module(m) => m,
        _ => panic!("expected module"),
    };
    assert_eq!(names(&nats.items), ["Nat", "+"]);
    match &nats.items[1] {
        Item::Decl(d) => {
            assert!(d.infix);
            assert_eq!(d.params.len(), 2);
            assert!(matches!(d.body, Some(Term::Case(_, ref cs, _)) if cs.len() == 2));
        }
        _ => panic!("expected declaration"),
    }
    match &group.items[1] {
        Item::Decl(d) => {
            assert_eq!(d.kind, DeclKind::Class);
            assert_eq!(d.parts.len(), 2);
        }
        _ => panic!("expected declaration"),
    }
}

#[test]
fn terms() -> Result<(), Error> {
    match term("A.B.c x")? {
        Term::App(head, args) => {
            assert_eq!(args.len(), 1);
            match *head {
                Term::Name(n) => {
                    assert_eq!(n.segments, ["A", "B", "c"]);
                    assert_eq!(n.segment_span(1), Span::new(2, 3));
                }
                _ => panic!("expected name"),
            }
        }
        _ => panic!("expected application"),
    }
    assert!(matches!(term("(x y : A) -> B x")?, Term::Pi(bs, _) if bs.len() == 2));
    assert!(matches!(term("(f x) -> B")?, Term::Arrow(..)));
    assert!(matches!(term("\\ _ (x : A) => x")?, Term::Lam(bs, _) if bs.len() == 2));
    Ok(())
}

#[test]
fn negative() {
    use Error::*;
    assert_eq!(term("(x : A)"), Err(ExpectedArrow));
    assert_eq!(term("\\ => x"), Err(ExpectedIdent));
    assert_eq!(term("case x of | y end"), Err(ExpectedFatArrow));
    assert_eq!(term("let x := y z"), Err(ExpectedIn));
    assert_eq!(term("f (x"), Err(ExpectedRPar));
    assert_eq!(term("f x) y"), Err(TrailingInput));
    assert_eq!(term("#"), Err(UnknownToken));
}

#[test]
fn recovery() {
    let group = crate::parse("def f := . def g (x : := x. def h := 1 def k := 2. data");
    assert_eq!(names(&group.items), ["f", "g", "h", "k", "?"]);
    let errors: Vec<_> = group.errors().iter().map(|b| b.error.clone()).collect();
    use Error::*;
    assert_eq!(errors, [ExpectedTerm, ExpectedTerm, ExpectedPeriod, ExpectedIdent]);
    assert!(matches!(&group.items[3], Item::Decl(_)));

    let group = crate::parse("module M { def f := 1.");
    match &group.items[..] {
        [Item::Module(m)] => assert!(matches!(m.items.last(), Some(Item::Broken(_)))),
        _ => panic!("expected module"),
    }
}
