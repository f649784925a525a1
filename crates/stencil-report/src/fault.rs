//! Structured execution faults.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An execution fault raised by a template executor.
///
/// `line` and `column` are 1-based and describe the position *as the executor
/// saw it*, which may include the executor's own wrapping boilerplate. Use
/// [`crate::FaultReport`] to translate back to source coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// The human-facing message (possibly already cleaned).
    pub message: String,

    /// 1-based line in the executed text, if the executor reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,

    /// 1-based column, if the executor reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,

    /// The original error text, verbatim, before any cleanup.
    pub raw: String,
}

impl Fault {
    /// Create a fault with no position information.
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            raw: message.clone(),
            message,
            line: None,
            column: None,
        }
    }

    /// Attach a 1-based line (and optionally column) to this fault.
    pub fn with_location(mut self, line: usize, column: Option<usize>) -> Self {
        self.line = Some(line);
        self.column = column;
        self
    }

    /// True if the executor reported a usable line number.
    pub fn has_line(&self) -> bool {
        self.line.is_some()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} (line {})", self.message, line),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for Fault {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_preserves_original_message() {
        let fault = Fault::new("ReferenceError: x is not defined").with_location(3, Some(7));
        assert_eq!(fault.raw, "ReferenceError: x is not defined");
        assert_eq!(fault.line, Some(3));
        assert_eq!(fault.column, Some(7));
    }

    #[test]
    fn display_includes_line_when_present() {
        let fault = Fault::new("boom").with_location(12, None);
        assert_eq!(fault.to_string(), "boom (line 12)");
        assert_eq!(Fault::new("boom").to_string(), "boom");
    }
}
