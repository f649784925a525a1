//! Errors carried across pipeline phases.

use serde::{Deserialize, Serialize};

/// A problem recorded during an earlier pipeline phase.
///
/// Header-attribute rendering and literal repair run before the body is
/// executed. Their failures must survive to the final report even when the
/// body later fails for an unrelated reason, so they are accumulated as
/// values rather than raised as errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseError {
    /// The phase that produced the error (e.g. "header", "literal-repair").
    pub phase: String,

    /// The error text.
    pub error: String,

    /// Optional context, such as the offending attribute name or the
    /// malformed literal verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl PhaseError {
    pub fn new(phase: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            error: error.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Render the "earlier phases" section of a report.
///
/// Returns an empty string when there is nothing to say, so callers can
/// append the result unconditionally.
pub fn phase_section(errors: &[PhaseError]) -> String {
    if errors.is_empty() {
        return String::new();
    }

    let mut out = String::from("## Errors from earlier phases\n\n");
    for err in errors {
        out.push_str(&format!("- [{}] {}\n", err.phase, err.error));
        if let Some(context) = &err.context {
            for line in context.lines() {
                out.push_str(&format!("      {}\n", line));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_list_renders_nothing() {
        assert_eq!(phase_section(&[]), "");
    }

    #[test]
    fn section_lists_each_phase() {
        let errors = vec![
            PhaseError::new("header", "attribute `title` failed to render"),
            PhaseError::new("literal-repair", "unterminated object literal")
                .with_context("{\"a\":1"),
        ];
        let text = phase_section(&errors);
        assert!(text.starts_with("## Errors from earlier phases"));
        assert!(text.contains("- [header] attribute `title` failed to render"));
        assert!(text.contains("- [literal-repair] unterminated object literal"));
        assert!(text.contains("{\"a\":1"));
    }
}
