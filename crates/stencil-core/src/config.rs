/*
 * config.rs
 * Copyright (c) 2025 Stencil contributors
 */

//! Render configuration.
//!
//! Configuration is an explicit value threaded through every stage of the
//! pipeline. There is no ambient settings state, so concurrent render calls
//! cannot interfere with each other.

use crate::exec::ExecOptions;

/// Call names the scanner recognizes structurally.
#[derive(Debug, Clone)]
pub struct TagVocabulary {
    /// Calls that request interactive input, e.g. `prompt('name', 'Message')`.
    pub placeholder_calls: Vec<String>,

    /// Calls that cross into host-provided commands with a JSON-shaped
    /// argument. Only literals passed to these are eligible for repair.
    pub bridge_calls: Vec<String>,
}

impl Default for TagVocabulary {
    fn default() -> Self {
        Self {
            placeholder_calls: vec![
                "prompt".to_string(),
                "promptDate".to_string(),
                "promptDateInterval".to_string(),
            ],
            bridge_calls: vec!["invokeCommand".to_string()],
        }
    }
}

/// Configuration for a render run.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub vocabulary: TagVocabulary,

    /// Recursion limit for header attributes that themselves contain tags.
    pub max_header_depth: usize,

    /// The token the executor emits for a missing value; collapsed from
    /// successful output during post-processing.
    pub undefined_token: String,

    /// The marker an executor leaks for an unresolved asynchronous value.
    pub pending_value_marker: String,

    /// Actionable replacement for `pending_value_marker`.
    pub pending_value_hint: String,

    /// Truncation limit for partial output shown in incremental reports.
    pub max_partial_output: usize,

    /// Localize faults with the chunked renderer when the executor reports
    /// no usable line number.
    pub incremental_fallback: bool,

    pub exec: ExecOptions,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            vocabulary: TagVocabulary::default(),
            max_header_depth: 3,
            undefined_token: "undefined".to_string(),
            pending_value_marker: "[object Promise]".to_string(),
            pending_value_hint:
                "[unresolved asynchronous value - is an `await` missing before this expression?]"
                    .to_string(),
            max_partial_output: 2000,
            incremental_fallback: true,
            exec: ExecOptions::default(),
        }
    }
}
