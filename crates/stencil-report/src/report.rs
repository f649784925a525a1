//! Report assembly.

use crate::analyzer::FaultAnalyzer;
use crate::cleanup::clean_message;
use crate::fault::Fault;
use crate::phase::{PhaseError, phase_section};
use crate::snippet::source_snippet;

/// Context lines shown on each side of the failing line.
pub const SNIPPET_RADIUS: usize = 5;

/// Role instruction for the optional analysis capability.
pub const ANALYST_ROLE: &str = "You are a template debugging assistant. A user's template failed to \
render. Explain in plain language what went wrong and how to fix it, referencing line numbers \
from the provided source where possible. Be concrete and brief.";

/// A fault plus everything needed to present it.
///
/// `wrapper_line_offset` is the number of boilerplate lines the executor
/// prepends to the text it runs; fault lines are shifted back by this amount
/// before anchoring the snippet.
pub struct FaultReport<'a> {
    pub fault: &'a Fault,
    pub source: &'a str,
    pub phase_errors: &'a [PhaseError],
    pub wrapper_line_offset: usize,
    pub context_inventory: &'a [String],
}

impl FaultReport<'_> {
    /// The fault line translated back to source coordinates, when available.
    pub fn adjusted_line(&self) -> Option<usize> {
        self.fault
            .line
            .map(|line| line.saturating_sub(self.wrapper_line_offset).max(1))
    }

    /// The deterministic report: cleaned message, source snippet, earlier
    /// phase errors.
    pub fn to_text(&self) -> String {
        let mut out = String::from("## Template error\n\n");
        out.push_str(&clean_message(&self.fault.raw));
        out.push('\n');

        if let Some(line) = self.adjusted_line() {
            let snippet = source_snippet(self.source, line, self.fault.column, SNIPPET_RADIUS);
            if !snippet.is_empty() {
                out.push_str(&format!("\n## Source (line {})\n\n", line));
                out.push_str(&snippet);
            }
        }

        let phases = phase_section(self.phase_errors);
        if !phases.is_empty() {
            out.push('\n');
            out.push_str(&phases);
        }

        out
    }

    /// Build the prompt handed to a [`FaultAnalyzer`].
    ///
    /// `script` is the original pre-transform template, not the text the
    /// executor actually ran, so the narrative lines up with what the author
    /// wrote.
    pub fn analysis_prompt(&self, script: &str) -> String {
        let mut prompt = String::from(ANALYST_ROLE);
        prompt.push_str("\n\n## Failing template\n\n```\n");
        prompt.push_str(script);
        if !script.ends_with('\n') {
            prompt.push('\n');
        }
        prompt.push_str("```\n\n## Error\n\n");
        prompt.push_str(&clean_message(&self.fault.raw));
        prompt.push('\n');

        let phases = phase_section(self.phase_errors);
        if !phases.is_empty() {
            prompt.push('\n');
            prompt.push_str(&phases);
        }

        if !self.context_inventory.is_empty() {
            prompt.push_str("\n## Available data\n\n");
            for entry in self.context_inventory {
                prompt.push_str(&format!("- {}\n", entry));
            }
        }

        prompt
    }

    /// The full report, with the analysis narrative prepended when the
    /// capability is present and succeeds. Any analyzer failure degrades
    /// silently to the deterministic report.
    pub async fn to_text_with_analysis(
        &self,
        analyzer: Option<&dyn FaultAnalyzer>,
        script: &str,
    ) -> String {
        let deterministic = self.to_text();
        let Some(analyzer) = analyzer else {
            return deterministic;
        };
        match analyzer.analyze(&self.analysis_prompt(script)).await {
            Ok(narrative) => {
                format!("## Template analysis\n\n{}\n\n{}", narrative.trim(), deterministic)
            }
            Err(_) => deterministic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AnalyzerError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    fn source() -> String {
        (1..=10).map(|n| format!("body line {}\n", n)).collect()
    }

    #[test]
    fn deterministic_report_has_message_and_snippet() {
        let fault = Fault::new("ReferenceError: ReferenceError: x is not defined")
            .with_location(7, Some(4));
        let source = source();
        let report = FaultReport {
            fault: &fault,
            source: &source,
            phase_errors: &[],
            wrapper_line_offset: 3,
            context_inventory: &[],
        };
        let text = report.to_text();
        assert!(text.contains("## Template error"));
        // Duplicated prefix collapsed.
        assert!(text.contains("ReferenceError: x is not defined"));
        assert!(!text.contains("ReferenceError: ReferenceError"));
        // 7 - 3 = line 4 in the source.
        assert!(text.contains("## Source (line 4)"));
        assert!(text.contains(">> 4 | body line 4"));
    }

    #[test]
    fn adjusted_line_never_reaches_zero() {
        let fault = Fault::new("boom").with_location(2, None);
        let source = source();
        let report = FaultReport {
            fault: &fault,
            source: &source,
            phase_errors: &[],
            wrapper_line_offset: 10,
            context_inventory: &[],
        };
        assert_eq!(report.adjusted_line(), Some(1));
    }

    #[test]
    fn phase_errors_get_their_own_section() {
        let fault = Fault::new("boom").with_location(1, None);
        let source = source();
        let errors = vec![PhaseError::new("header", "attribute `title` failed")];
        let report = FaultReport {
            fault: &fault,
            source: &source,
            phase_errors: &errors,
            wrapper_line_offset: 0,
            context_inventory: &[],
        };
        let text = report.to_text();
        assert!(text.contains("## Errors from earlier phases"));
        assert!(text.contains("- [header] attribute `title` failed"));
    }

    struct CannedAnalyzer(Option<String>);

    #[async_trait]
    impl FaultAnalyzer for CannedAnalyzer {
        async fn analyze(&self, _prompt: &str) -> Result<String, AnalyzerError> {
            match &self.0 {
                Some(narrative) => Ok(narrative.clone()),
                None => Err(AnalyzerError::Failed("capability offline".into())),
            }
        }
    }

    #[test]
    fn analysis_is_prepended_on_success() {
        let fault = Fault::new("boom");
        let source = source();
        let report = FaultReport {
            fault: &fault,
            source: &source,
            phase_errors: &[],
            wrapper_line_offset: 0,
            context_inventory: &[],
        };
        let analyzer = CannedAnalyzer(Some("The variable is misspelled.".into()));
        let text = pollster::block_on(report.to_text_with_analysis(Some(&analyzer), "script"));
        assert!(text.starts_with("## Template analysis\n\nThe variable is misspelled."));
        assert!(text.contains("## Template error"));
    }

    #[test]
    fn analyzer_failure_degrades_silently() {
        let fault = Fault::new("boom");
        let source = source();
        let report = FaultReport {
            fault: &fault,
            source: &source,
            phase_errors: &[],
            wrapper_line_offset: 0,
            context_inventory: &[],
        };
        let analyzer = CannedAnalyzer(None);
        let text = pollster::block_on(report.to_text_with_analysis(Some(&analyzer), "script"));
        assert_eq!(text, report.to_text());
    }

    #[test]
    fn prompt_includes_script_and_inventory() {
        let fault = Fault::new("boom");
        let source = source();
        let inventory = vec![
            "tasks: object with keys: open, done".to_string(),
            "date: function".to_string(),
        ];
        let report = FaultReport {
            fault: &fault,
            source: &source,
            phase_errors: &[],
            wrapper_line_offset: 0,
            context_inventory: &inventory,
        };
        let prompt = report.analysis_prompt("<%= tasks.open %>");
        assert!(prompt.starts_with(ANALYST_ROLE));
        assert!(prompt.contains("<%= tasks.open %>"));
        assert!(prompt.contains("- tasks: object with keys: open, done"));
        assert!(prompt.contains("- date: function"));
    }
}
