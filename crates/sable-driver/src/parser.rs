use camino::Utf8Path;
use sable_span::Report;
use sable_tree::Ast;
use sable_utils::interner::StrInterner;

/// The parser collaborator seam: source text in, module trees out.
///
/// The analyzer accepts whatever the parser produces and assigns stable
/// ids; parse diagnostics land in the report like any other finding. Tests
/// install a [`ClosureParser`] that builds trees programmatically.
pub trait ParseSource {
    fn parse(
        &self,
        path: &Utf8Path,
        text: &str,
        strings: &mut StrInterner,
        report: &mut Report,
    ) -> Vec<Ast>;
}

/// A parser backed by a closure; the default collaborator for hosts that
/// construct trees themselves.
pub struct ClosureParser(
    #[allow(clippy::type_complexity)]
    Box<dyn Fn(&Utf8Path, &str, &mut StrInterner, &mut Report) -> Vec<Ast>>,
);

impl ClosureParser {
    pub fn new(
        parse: impl Fn(&Utf8Path, &str, &mut StrInterner, &mut Report) -> Vec<Ast> + 'static,
    ) -> Self {
        Self(Box::new(parse))
    }
}

impl ParseSource for ClosureParser {
    fn parse(
        &self,
        path: &Utf8Path,
        text: &str,
        strings: &mut StrInterner,
        report: &mut Report,
    ) -> Vec<Ast> {
        (self.0)(path, text, strings, report)
    }
}
