use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::io;

use crate::{Loc, Located, SourceManager};

/// Severity of a finding.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    Note,
    Warning,
    Error,
    /// Internal invariant violations and cycle failures; these abort the
    /// current query instead of poisoning an expression.
    Fatal,
}

impl From<Severity> for ariadne::ReportKind<'_> {
    fn from(value: Severity) -> Self {
        match value {
            Severity::Note => ariadne::ReportKind::Advice,
            Severity::Warning => ariadne::ReportKind::Warning,
            Severity::Error | Severity::Fatal => ariadne::ReportKind::Error,
        }
    }
}

/// The closed set of analysis failure kinds.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ErrorKind {
    ParseError,
    UndeclaredIdentifier,
    DuplicateDefinition,
    AmbiguousCall,
    NoMatchingCandidate,
    ConstRefCoercion,
    TypeMismatch,
    GenericInstantiationFailure,
    CycleDetected,
    SplitInitFailure,
    MissingReturn,
    InvalidPrimitive,
    Cancelled,
}

impl ErrorKind {
    /// Default severity for the kind. Producers may upgrade a warning but
    /// never downgrade a fatal kind.
    pub fn severity(self) -> Severity {
        match self {
            ErrorKind::CycleDetected | ErrorKind::Cancelled => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

/// One analysis finding with source attribution.
///
/// Producing crates convert their typed errors into this form; `payload`
/// keeps the machine-readable part (candidate lists, cycle paths) so hosts
/// are not forced to re-parse rendered text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub severity: Severity,
    /// The main diagnostic message.
    pub message: String,
    /// The source range the finding is primarily about.
    pub loc: Loc,
    /// Secondary ranges with captions.
    pub trace: Vec<Located<String>>,
    /// Additional notes related to the diagnostic.
    pub notes: Vec<String>,
    /// Machine-readable detail, e.g. the tied candidates of an
    /// ambiguous call.
    pub payload: Option<serde_json::Value>,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, loc: Loc, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            message: message.into(),
            loc,
            trace: Vec::new(),
            notes: Vec::new(),
            payload: None,
        }
    }

    pub fn error(kind: ErrorKind, loc: Loc, message: impl Into<String>) -> Self {
        Self::new(kind, loc, message)
    }

    pub fn warning(kind: ErrorKind, loc: Loc, message: impl Into<String>) -> Self {
        let mut diag = Self::new(kind, loc, message);
        diag.severity = Severity::Warning;
        diag
    }

    pub fn with_trace(mut self, trace: impl IntoIterator<Item = Located<String>>) -> Self {
        self.trace = trace.into_iter().collect();
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity >= Severity::Error
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }

    /// Renders the diagnostic to stderr through ariadne.
    pub fn eprint(&self, sources: &SourceManager) -> io::Result<()> {
        let report = self.to_report();
        report.eprint(sources)
    }

    fn to_report(&self) -> ariadne::Report<'_, Loc> {
        let mut builder = ariadne::Report::build(self.severity.into(), self.loc)
            .with_message(format!("{}: {}", self.kind, self.message))
            .with_labels(
                self.trace
                    .iter()
                    .map(|(label, loc)| ariadne::Label::new(*loc).with_message(label)),
            );

        for note in &self.notes {
            builder = builder.with_note(note);
        }

        builder.finish()
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Diagnostic {}

/// Accumulates diagnostics during a run.
///
/// A capture frame redirects everything reported while it is open; popping
/// it yields the captured list. This is how callers observe the findings of
/// one operation without wiring a custom sink.
#[derive(Debug, Clone, Default)]
pub struct Report {
    base: Vec<Diagnostic>,
    frames: Vec<Vec<Diagnostic>>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        match self.frames.last_mut() {
            Some(frame) => frame.push(diagnostic),
            None => self.base.push(diagnostic),
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Vec::new());
    }

    pub fn pop_frame(&mut self) -> Vec<Diagnostic> {
        self.frames.pop().expect("no open capture frame")
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.base
    }

    pub fn has_errors(&self) -> bool {
        self.base.iter().any(Diagnostic::is_error)
            || self.frames.iter().flatten().any(Diagnostic::is_error)
    }

    pub fn len(&self) -> usize {
        self.base.len() + self.frames.iter().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn eprint(&self, sources: &SourceManager) -> io::Result<()> {
        for diagnostic in &self.base {
            diagnostic.eprint(sources)?;
        }
        Ok(())
    }

    pub fn into_diagnostics(mut self) -> Vec<Diagnostic> {
        for frame in self.frames.drain(..) {
            self.base.extend(frame);
        }
        self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SourceId, Span};

    fn loc() -> Loc {
        Loc::new(SourceId::new(0), Span::new(0, 1))
    }

    #[test]
    fn frames_capture_reports() {
        let mut report = Report::new();
        report.add(Diagnostic::error(ErrorKind::TypeMismatch, loc(), "outer"));

        report.push_frame();
        report.add(Diagnostic::error(
            ErrorKind::UndeclaredIdentifier,
            loc(),
            "inner",
        ));
        let captured = report.pop_frame();

        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].kind, ErrorKind::UndeclaredIdentifier);
        assert_eq!(report.diagnostics().len(), 1);
    }

    #[test]
    fn fatal_kinds_default_to_fatal() {
        let diag = Diagnostic::new(ErrorKind::CycleDetected, loc(), "cycle");
        assert!(diag.is_fatal());
        assert!(Diagnostic::new(ErrorKind::TypeMismatch, loc(), "t").is_error());
    }
}
