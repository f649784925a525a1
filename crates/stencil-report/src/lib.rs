//! Fault reporting for template rendering.
//!
//! This crate turns structured execution faults into readable diagnostic
//! text. Rendering never has a separate error channel: when a template fails,
//! the formatted report *is* the output the author sees. That shapes the
//! design here:
//!
//! - [`Fault`] carries a message plus optional line/column, as raised by the
//!   template executor.
//! - [`PhaseError`] records problems from earlier pipeline phases (header
//!   rendering, literal repair) so a later failure does not hide them.
//! - [`FaultReport`] assembles the final text: cleaned message, a
//!   line-anchored source snippet, and an "earlier phases" section.
//! - [`FaultAnalyzer`] is an optional external capability that can prepend a
//!   narrative analysis. The deterministic report never depends on it.

pub mod analyzer;
pub mod cleanup;
pub mod fault;
pub mod phase;
pub mod report;
pub mod snippet;

pub use analyzer::{AnalyzerError, FaultAnalyzer};
pub use cleanup::clean_message;
pub use fault::Fault;
pub use phase::{PhaseError, phase_section};
pub use report::{ANALYST_ROLE, FaultReport};
pub use snippet::source_snippet;
