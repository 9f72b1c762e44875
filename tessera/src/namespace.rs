//! Module-structured scopes of definitions.

use crate::store::{DefId, Definition, Kind};
use fnv::FnvHashMap;
use nested_modules::Context;

/// What a name in scope refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub id: DefId,
    pub kind: Kind,
    pub infix: bool,
}

/// Lexical lookup of global names.
pub trait Scope {
    /// Make the given module (and its ancestors) the current lexical context.
    fn enter(&mut self, module: &[String]);

    /// Find a definition by qualified name,
    /// searching from the innermost enclosing module outwards.
    fn lookup(&self, path: &[&str], name: &str) -> Option<Entry>;

    /// Return true if the path denotes a module visible from the current context.
    fn has_module(&self, path: &[&str]) -> bool;
}

/// Scope of all live definitions.
#[derive(Default)]
pub struct Namespace {
    ctx: Context<String, FnvHashMap<String, Entry>>,
}

impl Namespace {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert(&mut self, module: &[String], name: String, entry: Entry) {
        self.enter(module);
        self.ctx.get_mut().data.insert(name, entry);
    }

    /// Build a namespace from definitions.
    ///
    /// Constructors and fields are visible both in
    /// the module of their parent and in the enclosing module.
    pub fn from_definitions<'a>(defs: impl IntoIterator<Item = &'a Definition>) -> Self {
        let mut ns = Self::new();
        for def in defs {
            let entry = Entry {
                id: def.id,
                kind: def.kind,
                infix: def.infix,
            };
            let module = &def.name.module;
            ns.insert(module, def.name.name.clone(), entry);
            if def.kind.is_part() && !module.is_empty() {
                let parent = &module[..module.len() - 1];
                ns.insert(parent, def.name.name.clone(), entry);
            }
        }
        ns.enter(&[]);
        ns
    }
}

impl Scope for Namespace {
    fn enter(&mut self, module: &[String]) {
        while self.ctx.close() {}
        module
            .iter()
            .for_each(|m| self.ctx.open_or_default(m.clone()))
    }

    fn lookup(&self, path: &[&str], name: &str) -> Option<Entry> {
        self.ctx
            .find(path.iter().copied())
            .filter_map(|module| module.data.get(name))
            .next()
            .copied()
    }

    fn has_module(&self, path: &[&str]) -> bool {
        self.ctx.find(path.iter().copied()).next().is_some()
    }
}

#[test]
fn lexical_lookup() {
    let store = crate::Store::new();
    let declare = |name, kind| store.declare(crate::FullName::parse(name), kind, false);
    declare("M.Nat", Kind::Data);
    let zero = declare("M.Nat.zero", Kind::Constructor);
    let f = declare("M.N.f", Kind::Function);
    let g = declare("g", Kind::Function);
    let mut ns = Namespace::from_definitions(&store.live());
    let id = |e: Option<Entry>| e.map(|e| e.id);

    assert_eq!(ns.lookup(&[], "zero"), None);
    assert_eq!(id(ns.lookup(&["M", "Nat"], "zero")), Some(zero));

    ns.enter(&["M".to_string(), "N".to_string()]);
    assert_eq!(id(ns.lookup(&[], "f")), Some(f));
    assert_eq!(id(ns.lookup(&[], "zero")), Some(zero));
    assert_eq!(id(ns.lookup(&["Nat"], "zero")), Some(zero));
    assert_eq!(id(ns.lookup(&[], "g")), Some(g));
    assert!(ns.has_module(&["Nat"]));
    assert!(!ns.has_module(&["Nat", "zero"]));
}
