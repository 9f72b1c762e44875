//! Printing of results.

use itertools::Itertools;
use std::io::{self, Write};
use tessera::{Engine, Session, Severity};

/// Print diagnostics and statuses of the definitions of a session.
///
/// Return the number of definitions with errors.
pub fn session(w: &mut impl Write, engine: &Engine, session: &Session) -> io::Result<usize> {
    let mut failed = 0;
    let module = session.module().iter().join(".");
    writeln!(w, "Module {}", module)?;
    for def in session.defs() {
        let name = engine.name(*def).map_or_else(|| def.to_string(), |n| n.to_string());
        let diags = engine.diagnostics().get(*def);
        if diags.iter().any(|d| d.severity == Severity::Error) {
            failed += 1
        }
        writeln!(w, "  {}: {}", name, engine.status(*def))?;
        diags.iter().try_for_each(|d| writeln!(w, "    {}", d))?;
    }
    Ok(failed)
}

/// Print the dependency graph of all resolved definitions in DOT format.
pub fn dot(w: &mut impl Write, engine: &Engine) -> io::Result<()> {
    let name = |def| engine.name(def).map(|n| n.to_string());
    writeln!(w, "digraph G {{")?;
    for c in engine.provider().concretes() {
        let user = match name(c.def) {
            Some(user) if engine.store().is_live(c.def) => user,
            _ => continue,
        };
        for dep in c.refs.iter().filter_map(|r| name(*r)).unique() {
            writeln!(w, "  \"{}\" -> \"{}\";", user, dep)?
        }
    }
    writeln!(w, "}}")
}

#[cfg(test)]
use tessera::{Cancel, Config, Mode};

#[test]
fn dot_graph() {
    let config = Config {
        mode: Mode::Off,
        ..Config::default()
    };
    let engine = Engine::new(config);
    let mut session = engine.session(vec!["M".into()]);
    let group = tessera_syntax::parse("def a := 1. def b := a a. def c := b.");
    session.update(&group, &Cancel::new()).unwrap();

    let mut out = Vec::new();
    dot(&mut out, &engine).unwrap();
    let expected = "digraph G {\n  \"M.b\" -> \"M.a\";\n  \"M.c\" -> \"M.b\";\n}\n";
    assert_eq!(String::from_utf8(out).unwrap(), expected);
}

#[test]
fn session_report() {
    let engine = Engine::new(Config::default());
    let mut session = engine.session(vec!["M".into()]);
    let group = tessera_syntax::parse("def a := 1. def b := x.");
    session.update(&group, &Cancel::new()).unwrap().wait();

    let mut out = Vec::new();
    assert_eq!(self::session(&mut out, &engine, &session).unwrap(), 1);
    let out = String::from_utf8(out).unwrap();
    let lines: Vec<_> = out.lines().collect();
    assert_eq!(lines[0], "Module M");
    assert_eq!(lines[1], "  M.a: ok");
    assert_eq!(lines[2], "  M.b: with errors");
    assert!(lines[3].ends_with("cannot resolve `x`"));
}
