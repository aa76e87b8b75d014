use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub location: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub(crate) fn error(location: Option<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            location,
            message: message.into(),
        }
    }

    pub(crate) fn warning(location: Option<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            location,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.level, DiagnosticLevel::Error)
    }
}

pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintReport {
    pub source: String,
    pub generated_at: String,
    pub error_count: usize,
    pub warning_count: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl LintReport {
    pub fn new(source: impl Into<String>, diagnostics: Vec<Diagnostic>) -> Self {
        let error_count = diagnostics.iter().filter(|d| d.is_error()).count();
        Self {
            source: source.into(),
            generated_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_else(|_| "unknown".to_string()),
            error_count,
            warning_count: diagnostics.len() - error_count,
            diagnostics,
        }
    }
}

pub(crate) struct ValidationContext {
    stack: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

impl ValidationContext {
    pub(crate) fn new() -> Self {
        Self {
            stack: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, label: String) {
        self.stack.push(label);
    }

    pub(crate) fn pop(&mut self) {
        self.stack.pop();
    }

    fn location(&self) -> Option<String> {
        if self.stack.is_empty() {
            None
        } else {
            Some(self.stack.join(" > "))
        }
    }

    pub(crate) fn error(&mut self, message: impl Into<String>) {
        let diag = Diagnostic::error(self.location(), message);
        self.diagnostics.push(diag);
    }

    pub(crate) fn warning(&mut self, message: impl Into<String>) {
        let diag = Diagnostic::warning(self.location(), message);
        self.diagnostics.push(diag);
    }

    pub(crate) fn finish(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_joins_nested_labels() {
        let mut ctx = ValidationContext::new();
        ctx.warning("top level");
        ctx.push("properties".to_string());
        ctx.push("zone".to_string());
        ctx.error("nested");
        ctx.pop();
        ctx.pop();

        let diagnostics = ctx.finish();
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].location, None);
        assert_eq!(diagnostics[1].location.as_deref(), Some("properties > zone"));
        assert!(has_errors(&diagnostics));
    }

    #[test]
    fn report_counts_levels() {
        let report = LintReport::new(
            "vm.yaml",
            vec![
                Diagnostic::error(None, "a"),
                Diagnostic::warning(None, "b"),
                Diagnostic::warning(None, "c"),
            ],
        );
        assert_eq!(report.error_count, 1);
        assert_eq!(report.warning_count, 2);
        assert_ne!(report.generated_at, "");
    }
}
