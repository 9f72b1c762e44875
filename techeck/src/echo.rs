use tessera::concrete::Concrete;
use tessera::observe::Observer;
use tessera::resolve::Resolution;
use tessera::{CoreResult, Interrupt};

/// Observer that prints every event on a line of its own.
pub struct Echo;

impl Observer for Echo {
    fn definition_resolved(&self, c: &Concrete) {
        println!("Resolved {} with {} references", c.def, c.refs.len())
    }

    fn reference_resolved(&self, _def: tessera::DefId, res: &Resolution) {
        if let Some(span) = res.failure_span() {
            println!("Unresolved {} at {}", res.name, span)
        }
    }

    fn typechecking_started(&self, c: &Concrete) {
        println!("Typecheck {}", c.def)
    }

    fn typechecking_finished(&self, c: &Concrete, result: &CoreResult) {
        println!("Typechecked {}: {}", c.def, result.status)
    }

    fn typechecking_interrupted(&self, c: &Concrete, interrupt: Interrupt) {
        println!("Interrupted {}: {}", c.def, interrupt)
    }

    fn blacklisted(&self, c: &Concrete) {
        println!("Blacklisted {}", c.def)
    }

    fn progress(&self, done: usize, total: usize) {
        println!("Progress {}/{}", done, total)
    }
}
