use crate::span::Span;

/// A generator diagnostic (error or warning).
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Diagnostic {
    pub fn error(message: String, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn warning(message: String, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    /// The machine-readable one-line form: `<file>:<line>:<col>: <message>`.
    pub fn one_line(&self, filename: &str, source: &str) -> String {
        let (line, col) = self.span.line_col(source);
        format!("{}:{}:{}: {}", filename, line, col, self.message)
    }

    /// Render the diagnostic to stderr using ariadne.
    pub fn render(&self, filename: &str, source: &str) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };

        let color = match self.severity {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
        };

        let mut report = Report::build(kind, filename, self.span.start as usize)
            .with_message(&self.message)
            .with_label(
                Label::new((filename, self.span.start as usize..self.span.end as usize))
                    .with_message(&self.message)
                    .with_color(color),
            );

        for note in &self.notes {
            report = report.with_note(note);
        }

        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        report
            .finish()
            .eprint((filename, Source::from(source)))
            .unwrap();
    }
}

/// Render a list of diagnostics.
pub fn render_diagnostics(diagnostics: &[Diagnostic], filename: &str, source: &str) {
    for diag in diagnostics {
        diag.render(filename, source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let span = Span::new(10, 15);
        let d = Diagnostic::error("duplicate node type".to_string(), span);
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.message, "duplicate node type");
        assert_eq!(d.span.start, 10);
        assert_eq!(d.span.end, 15);
        assert!(d.notes.is_empty());
        assert!(d.help.is_none());
    }

    #[test]
    fn test_with_note_and_help() {
        let d = Diagnostic::error("unknown type 'Missing'".to_string(), Span::dummy())
            .with_note("referenced from field 'child'".to_string())
            .with_help("declare the node type or a prim with this name".to_string());
        assert_eq!(d.notes.len(), 1);
        assert!(d.help.is_some());
    }

    #[test]
    fn test_one_line_format() {
        let source = "namespace demo;\nnode node {\n";
        let d = Diagnostic::error(
            "expected identifier".to_string(),
            Span::new(21, 25),
        );
        assert_eq!(
            d.one_line("demo.tree", source),
            "demo.tree:2:6: expected identifier"
        );
    }

    #[test]
    fn test_render_does_not_panic() {
        let source = "node Expr {\n    lhs: One<Missing>;\n}\n";
        let d = Diagnostic::error("unknown type 'Missing'".to_string(), Span::new(25, 32))
            .with_note("referenced from field 'lhs'".to_string());
        d.render("test.tree", source);
    }

    #[test]
    fn test_render_diagnostics_multiple() {
        let source = "node A : B { }\nnode B : A { }\n";
        let diagnostics = vec![
            Diagnostic::warning("unused".to_string(), Span::new(5, 6)),
            Diagnostic::warning("unused".to_string(), Span::new(20, 21)),
        ];
        render_diagnostics(&diagnostics, "test.tree", source);
    }
}
