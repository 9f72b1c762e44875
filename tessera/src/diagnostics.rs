//! Per-definition errors and warnings.

use crate::cancel::Interrupt;
use crate::concrete::Concrete;
use crate::observe::Observer;
use crate::resolve::Resolution;
use crate::store::{CoreResult, DefId};
use core::fmt::{self, Display};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use tessera_syntax::Span;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
        .fmt(f)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn new(severity: Severity, span: Span, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            severity,
            message,
            span,
        }
    }

    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, span, message)
    }

    pub fn warning(span: Span, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, span, message)
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} at {}: {}", self.severity, self.span, self.message)
    }
}

/// Stage of the pipeline that produced a diagnostic.
///
/// Diagnostics of different phases are cleared independently.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Syntax,
    Resolve,
    Typecheck,
}

#[derive(Clone, Debug, Default)]
struct Entry {
    syntax: Vec<Diagnostic>,
    resolve: Vec<Diagnostic>,
    typecheck: Vec<Diagnostic>,
}

impl Entry {
    fn phase(&self, phase: Phase) -> &Vec<Diagnostic> {
        match phase {
            Phase::Syntax => &self.syntax,
            Phase::Resolve => &self.resolve,
            Phase::Typecheck => &self.typecheck,
        }
    }

    fn phase_mut(&mut self, phase: Phase) -> &mut Vec<Diagnostic> {
        match phase {
            Phase::Syntax => &mut self.syntax,
            Phase::Resolve => &mut self.resolve,
            Phase::Typecheck => &mut self.typecheck,
        }
    }

    fn all(&self) -> impl Iterator<Item = &Diagnostic> {
        self.syntax.iter().chain(&self.resolve).chain(&self.typecheck)
    }
}

/// Diagnostics sink.
#[derive(Default)]
pub struct Diagnostics {
    entries: Mutex<FnvHashMap<DefId, Entry>>,
}

impl Diagnostics {
    pub fn report(&self, def: DefId, phase: Phase, diagnostic: Diagnostic) {
        let mut entries = self.entries.lock();
        entries.entry(def).or_default().phase_mut(phase).push(diagnostic)
    }

    /// Replace all diagnostics of a definition in a phase.
    pub fn set(&self, def: DefId, phase: Phase, diagnostics: Vec<Diagnostic>) {
        let mut entries = self.entries.lock();
        *entries.entry(def).or_default().phase_mut(phase) = diagnostics
    }

    pub fn clear(&self, def: DefId, phase: Phase) {
        if let Some(entry) = self.entries.lock().get_mut(&def) {
            entry.phase_mut(phase).clear()
        }
    }

    /// Move diagnostics of a definition that moved from one location to another.
    ///
    /// Only diagnostics inside the old location are moved.
    pub fn rebase(&self, def: DefId, phase: Phase, from: Span, to: Span) {
        let mut entries = self.entries.lock();
        let diags = entries.get_mut(&def).map(|e| e.phase_mut(phase));
        for d in diags.into_iter().flatten() {
            if from.start <= d.span.start && d.span.end <= from.end {
                let start = d.span.start - from.start + to.start;
                d.span = Span::new(start, start + d.span.len())
            }
        }
    }

    /// Forget all diagnostics of a definition.
    pub fn remove(&self, def: DefId) {
        self.entries.lock().remove(&def);
    }

    /// Diagnostics of a definition, ordered by phase.
    pub fn get(&self, def: DefId) -> Vec<Diagnostic> {
        let entries = self.entries.lock();
        let entry = entries.get(&def);
        entry.into_iter().flat_map(|e| e.all()).cloned().collect()
    }

    pub fn phase(&self, def: DefId, phase: Phase) -> Vec<Diagnostic> {
        let entries = self.entries.lock();
        entries.get(&def).map_or_else(Vec::new, |e| e.phase(phase).clone())
    }

    /// All non-empty diagnostics, ordered by definition.
    pub fn all(&self) -> Vec<(DefId, Vec<Diagnostic>)> {
        let entries = self.entries.lock();
        let mut all: Vec<_> = entries
            .iter()
            .map(|(def, e)| (*def, e.all().cloned().collect::<Vec<_>>()))
            .filter(|(_, ds)| !ds.is_empty())
            .collect();
        all.sort_by_key(|(def, _)| *def);
        all
    }

    pub fn has_errors(&self, def: DefId) -> bool {
        let entries = self.entries.lock();
        let entry = entries.get(&def);
        entry.map_or(false, |e| e.all().any(|d| d.severity == Severity::Error))
    }

    fn unresolved(&self, def: DefId, res: &Resolution) {
        if let Some(i) = res.failure() {
            let message = match res.name.segments.len() {
                1 => format!("cannot resolve `{}`", res.name),
                _ => format!("cannot resolve `{}` in `{}`", res.name.segments[i], res.name),
            };
            let error = Diagnostic::error(res.name.segment_span(i), message);
            self.report(def, Phase::Resolve, error)
        }
    }
}

impl Observer for Diagnostics {
    fn reference_resolved(&self, def: DefId, resolution: &Resolution) {
        self.unresolved(def, resolution)
    }

    fn pattern_resolved(&self, def: DefId, resolution: &Resolution) {
        self.unresolved(def, resolution)
    }

    fn typechecking_finished(&self, concrete: &Concrete, result: &CoreResult) {
        self.set(concrete.def, Phase::Typecheck, result.diagnostics.clone())
    }

    fn typechecking_interrupted(&self, concrete: &Concrete, interrupt: Interrupt) {
        if let Interrupt::TimedOut(limit) = interrupt {
            let secs = limit.as_secs().max(1);
            let message = format!("typechecking was interrupted after {} second(s)", secs);
            let warning = Diagnostic::warning(concrete.span, message);
            self.set(concrete.def, Phase::Typecheck, Vec::from([warning]))
        }
    }

    fn blacklisted(&self, concrete: &Concrete) {
        let message = "excluded from background typechecking after repeated timeouts";
        let warning = Diagnostic::warning(concrete.span, message);
        self.report(concrete.def, Phase::Typecheck, warning)
    }
}

#[test]
fn rebase() {
    let diags = Diagnostics::default();
    let store = crate::Store::new();
    let def = store.declare(crate::FullName::parse("f"), crate::Kind::Function, false);
    let inside = Diagnostic::error(Span::new(12, 14), "type mismatch");
    let outside = Diagnostic::warning(Span::new(2, 4), "elsewhere");
    diags.set(def, Phase::Typecheck, Vec::from([inside, outside]));

    diags.rebase(def, Phase::Typecheck, Span::new(10, 20), Span::new(13, 23));
    let spans: Vec<_> = diags.phase(def, Phase::Typecheck).iter().map(|d| d.span).collect();
    assert_eq!(spans, [Span::new(15, 17), Span::new(2, 4)]);
    assert!(diags.phase(def, Phase::Resolve).is_empty());
}
