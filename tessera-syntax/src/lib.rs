//! Lexer and recovering parser for the tessera surface language.
//!
//! Parsing a source text never fails as a whole:
//! items that cannot be parsed are kept as [`Broken`] items,
//! so that an editor can keep working with the rest of the file.
//!
//! ~~~
//! use tessera_syntax::{parse, Error, Item};
//!
//! let group = parse("data Nat | zero | suc Nat. def one := suc. def two : Nat :=");
//! assert_eq!(group.items.len(), 3);
//! assert!(matches!(&group.items[2], Item::Broken(b) if b.error == Error::ExpectedTerm));
//! ~~~
#![no_std]

extern crate alloc;

pub mod ast;
pub mod lex;
mod parse;

pub use ast::{Binder, Broken, Clause, Decl, DeclKind, Group, Ident, Item, Module, Name};
pub use ast::{Part, Pattern, Span, Term};
pub use lex::Token;
pub use parse::Parser;

use core::fmt::{self, Display};

/// Parse error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    ExpectedItem,
    ExpectedIdent,
    ExpectedTerm,
    ExpectedPattern,
    ExpectedRPar,
    ExpectedLBrace,
    ExpectedRBrace,
    ExpectedArrow,
    ExpectedFatArrow,
    ExpectedColonEq,
    ExpectedIn,
    ExpectedOf,
    ExpectedEnd,
    ExpectedPeriod,
    UnknownToken,
    TrailingInput,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Error::*;
        let s = match self {
            ExpectedItem => "expected declaration or module",
            ExpectedIdent => "expected identifier",
            ExpectedTerm => "expected term",
            ExpectedPattern => "expected pattern",
            ExpectedRPar => "expected `)`",
            ExpectedLBrace => "expected `{`",
            ExpectedRBrace => "expected `}`",
            ExpectedArrow => "expected `->`",
            ExpectedFatArrow => "expected `=>`",
            ExpectedColonEq => "expected `:=`",
            ExpectedIn => "expected `in`",
            ExpectedOf => "expected `of`",
            ExpectedEnd => "expected `end`",
            ExpectedPeriod => "expected `.`",
            UnknownToken => "unknown token",
            TrailingInput => "unexpected input after term",
        };
        s.fmt(f)
    }
}

/// Parse all items of a source text.
pub fn parse(s: &str) -> Group {
    let items = Parser::new(s).items(false);
    Group { items }
}

/// Parse a source text consisting of exactly one term.
pub fn parse_term(s: &str) -> Result<Term, Error> {
    let mut parser = Parser::new(s);
    let tm = parser.term().map_err(|(e, _)| e)?;
    if parser.is_done() {
        Ok(tm)
    } else {
        Err(Error::TrailingInput)
    }
}
