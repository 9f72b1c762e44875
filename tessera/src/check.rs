//! Typechecking of single groups of definitions.
//!
//! The typechecker treats checking as an external, possibly long-running function,
//! given by the [`Checker`] trait.

use crate::cancel::{Checkpoint, Interrupt};
use crate::concrete::{Concrete, Expr};
use crate::diagnostics::Diagnostic;
use crate::store::{Snapshot, Status, Store};
use core::fmt::{self, Display};
use rayon::prelude::*;
use std::sync::Arc;

/// Diagnostics for one definition of a group.
pub type Verdict = Vec<Diagnostic>;

/// Reason why a group could not be checked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Failure {
    Interrupted(Interrupt),
    /// unexpected failure of the checker itself
    Internal(String),
}

impl From<Interrupt> for Failure {
    fn from(i: Interrupt) -> Self {
        Self::Interrupted(i)
    }
}

impl Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Interrupted(i) => i.fmt(f),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

/// Typechecking function for a group of mutually recursive definitions.
pub trait Checker: Send + Sync {
    /// Check a group, returning one verdict per member, in group order.
    ///
    /// The results of all dependencies outside the group are in `deps`.
    /// Long computations must call [`Checkpoint::check`] regularly and
    /// return its error as soon as it fails.
    fn check(
        &self,
        group: &[Arc<Concrete>],
        deps: &Snapshot,
        point: &Checkpoint,
    ) -> Result<Vec<Verdict>, Failure>;
}

/// Checker that finds problems that do not require type inference.
pub struct Shallow {
    store: Arc<Store>,
}

impl Shallow {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Problems visible without consulting other definitions.
    pub fn diagnostics(c: &Concrete) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        if c.ty.is_none() && c.body.is_none() {
            diags.push(Diagnostic::error(c.span, "definition has neither type nor body"))
        }
        if c.any(&|e| matches!(e, Expr::Case(_, clauses) if clauses.is_empty())) {
            diags.push(Diagnostic::error(c.span, "case expression without clauses"))
        }
        if c.any(&|e| matches!(e, Expr::Hole)) {
            diags.push(Diagnostic::warning(c.span, "definition contains holes"))
        }
        diags
    }

    fn check_one(&self, c: &Concrete, group: &[Arc<Concrete>], deps: &Snapshot) -> Verdict {
        let mut diags = Self::diagnostics(c);
        for name in c.unresolved() {
            let message = format!("reference to `{}` is not in scope", name);
            diags.push(Diagnostic::error(c.span, message))
        }
        let external = c.refs.iter().filter(|r| group.iter().all(|g| g.def != **r));
        for dep in external {
            let name = self.store.definition(*dep).map(|d| d.name.to_string());
            let name = name.unwrap_or_else(|| dep.to_string());
            match deps.status(*dep) {
                Status::TypecheckedOk => (),
                Status::TypecheckedWithErrors => {
                    let message = format!("dependency `{}` has errors", name);
                    diags.push(Diagnostic::warning(c.span, message))
                }
                Status::NotTypechecked | Status::TypeChecking => {
                    let message = format!("dependency `{}` is not typechecked", name);
                    diags.push(Diagnostic::error(c.span, message))
                }
            }
        }
        diags
    }
}

impl Checker for Shallow {
    fn check(
        &self,
        group: &[Arc<Concrete>],
        deps: &Snapshot,
        point: &Checkpoint,
    ) -> Result<Vec<Verdict>, Failure> {
        group
            .par_iter()
            .map(|c| {
                point.check()?;
                Ok::<_, Failure>(self.check_one(c, group, deps))
            })
            .collect()
    }
}

#[test]
fn shallow() {
    use crate::cancel::Cancel;
    use crate::concrete::drafts;
    use crate::namespace::Namespace;
    use crate::observe::Ignore;
    use crate::resolve::resolve_group;

    let store = Arc::new(Store::new());
    let src = "def a : Type. def b := a _. def c := case b of end. def d := x. def e : Type := b.";
    let drafts = drafts(&[], &tessera_syntax::parse(src));
    let ids: Vec<_> = drafts
        .iter()
        .map(|d| store.declare(d.name.clone(), d.kind, d.infix))
        .collect();
    let mut ns = Namespace::from_definitions(&store.live());
    let root = ids.into_iter().zip(drafts.iter());
    let cs = resolve_group(root, &mut ns, &Ignore, &Cancel::new()).unwrap();
    let cs: Vec<_> = cs.into_iter().map(Arc::new).collect();

    let cancel = Cancel::new();
    let point = Checkpoint::new(&cancel, None);
    let checker = Shallow::new(store.clone());
    let verdicts = checker.check(&cs, &store.snapshot(), &point).unwrap();
    let messages: Vec<Vec<_>> = verdicts
        .iter()
        .map(|v| v.iter().map(|d| d.message.as_str()).collect())
        .collect();
    assert_eq!(messages[0], Vec::<&str>::new());
    assert_eq!(messages[1], ["definition contains holes"]);
    assert_eq!(messages[2], ["case expression without clauses"]);
    assert_eq!(messages[3], ["reference to `x` is not in scope"]);
    assert_eq!(messages[4], Vec::<&str>::new());

    // `b` alone needs the result of `a`
    let verdicts = checker.check(&cs[1..2], &store.snapshot(), &point).unwrap();
    assert_eq!(verdicts[0][1].message, "dependency `a` is not typechecked");

    cancel.cancel();
    let failure = checker.check(&cs, &store.snapshot(), &point);
    assert_eq!(failure, Err(Failure::Interrupted(Interrupt::Cancelled)));
}
