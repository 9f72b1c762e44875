//! Lexing of source text into tokens with byte spans.

use crate::Span;
use alloc::vec::Vec;
use core::fmt::{self, Display};
use logos::{Lexer, Logos};

#[derive(Logos, Clone, Debug, PartialEq, Eq)]
pub enum Token<'s> {
    #[token("def")]
    Def,

    #[token("data")]
    Data,

    #[token("class")]
    Class,

    #[token("instance")]
    Instance,

    #[token("infix")]
    Infix,

    #[token("module")]
    Module,

    #[token("let")]
    Let,

    #[token("in")]
    In,

    #[token("case")]
    Case,

    #[token("of")]
    Of,

    #[token("end")]
    End,

    #[token("Type")]
    Type,

    #[token("(")]
    LPar,

    #[token(")")]
    RPar,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token(":")]
    Colon,

    #[token(":=")]
    ColonEq,

    #[token("->")]
    Arrow,

    #[token("=>")]
    FatArrow,

    #[token("|")]
    Bar,

    #[token("\\")]
    Backslash,

    #[token("_")]
    Underscore,

    /// Separator of qualified name segments
    #[token(".")]
    Dot,

    /// Dot that terminates an item, produced by [`tokens`]
    Period,

    #[regex("[0-9]+", |lex| lex.slice().parse().ok())]
    Num(u64),

    #[regex("[a-zA-Z][a-zA-Z0-9_']*")]
    #[regex(r"[+*<>=&^~!?@$%/\-]+")]
    Ident(&'s str),

    #[regex(r"[ \t\r\n\f]+")]
    #[token("(;", comment)]
    Space,

    #[error]
    Error,
}

impl<'s> Token<'s> {
    /// Return true if the token can only start a new item.
    pub fn starts_item(&self) -> bool {
        matches!(
            self,
            Self::Def | Self::Data | Self::Class | Self::Instance | Self::Infix | Self::Module
        )
    }
}

impl<'s> Display for Token<'s> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let s = match self {
            Self::Def => "def",
            Self::Data => "data",
            Self::Class => "class",
            Self::Instance => "instance",
            Self::Infix => "infix",
            Self::Module => "module",
            Self::Let => "let",
            Self::In => "in",
            Self::Case => "case",
            Self::Of => "of",
            Self::End => "end",
            Self::Type => "Type",
            Self::LPar => "(",
            Self::RPar => ")",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Colon => ":",
            Self::ColonEq => ":=",
            Self::Arrow => "->",
            Self::FatArrow => "=>",
            Self::Bar => "|",
            Self::Backslash => "\\",
            Self::Underscore => "_",
            Self::Dot | Self::Period => ".",
            Self::Num(n) => return n.fmt(f),
            Self::Ident(s) => s,
            Self::Space => " ",
            Self::Error => return Err(Default::default()),
        };
        s.fmt(f)
    }
}

fn comment<'s>(lex: &mut Lexer<'s, Token<'s>>) -> Option<()> {
    // number of open comments
    let mut open = 1;
    let prefix: &[_] = &['(', ';'];
    while open > 0 {
        lex.bump(lex.remainder().find(prefix)?);
        if lex.remainder().starts_with("(;") {
            open += 1;
            lex.bump(2);
        } else if lex.remainder().starts_with(";)") {
            open -= 1;
            lex.bump(2);
        } else {
            lex.bump(1);
        }
    }
    Some(())
}

/// Lex a source text, dropping whitespace and comments.
///
/// A dot is kept as [`Token::Dot`] only if it is directly followed by an
/// identifier, as in `Nat.suc`; every other dot becomes a [`Token::Period`].
///
/// ~~~
/// use tessera_syntax::{lex::tokens, Token};
/// let toks: Vec<_> = tokens("def f := Nat.zero.").into_iter().map(|(t, _)| t).collect();
/// assert_eq!(toks[3..], [Token::Ident("Nat"), Token::Dot, Token::Ident("zero"), Token::Period]);
/// ~~~
pub fn tokens(s: &str) -> Vec<(Token<'_>, Span)> {
    let mut iter = Token::lexer(s).spanned().peekable();
    let mut out = Vec::new();
    while let Some((token, range)) = iter.next() {
        let span = Span::from(range);
        match token {
            Token::Space => (),
            Token::Dot => match iter.peek() {
                Some((Token::Ident(_), _)) => out.push((Token::Dot, span)),
                _ => out.push((Token::Period, span)),
            },
            token => out.push((token, span)),
        }
    }
    out
}

#[test]
fn periods() {
    let toks: Vec<_> = tokens("A.b. (; x ;) c.(; nested (; ;) ;)")
        .into_iter()
        .map(|(t, _)| t)
        .collect();
    use Token::*;
    let expected = [Ident("A"), Dot, Ident("b"), Period, Ident("c"), Period];
    assert_eq!(toks, expected);
}

#[test]
fn spans() {
    let toks = tokens("def + := 12");
    assert_eq!(toks[1], (Token::Ident("+"), Span::new(4, 5)));
    assert_eq!(toks[3], (Token::Num(12), Span::new(9, 11)));
}
