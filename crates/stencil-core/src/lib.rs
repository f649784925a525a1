/*
 * lib.rs
 * Copyright (c) 2025 Stencil contributors
 */

//! Template preprocessing and rendering core.
//!
//! This crate takes a raw template document (free text interleaved with
//! `<% ... %>` tags and an optional `---` metadata header), repairs and
//! normalizes it, resolves interactive placeholders, executes it against a
//! data context, and produces either rendered output or a readable
//! diagnostic report. It supports:
//!
//! - Tag scanning that is not confused by nested string or template
//!   literals, with whitespace-control delimiter variants (`<%_`, `-%>`,
//!   `_%>`)
//! - Metadata headers whose attribute values may themselves contain tags
//! - Best-effort repair of malformed JSON-shaped literals in bridge calls
//! - Interactive placeholders (`prompt`, `promptDate`, `promptDateInterval`)
//!   with cooperative cancellation
//! - Chunked fallback rendering to localize faults the executor cannot place
//!
//! # Architecture
//!
//! The engine is **independent of any particular execution engine**. The
//! [`TemplateExecutor`] trait is the seam: anything able to run a
//! tag-bearing document against a [`DataContext`] plugs in. The bundled
//! [`ReferenceExecutor`] covers interpolation and simple conditionals for
//! tests and the CLI.
//!
//! # Example
//!
//! ```ignore
//! use stencil_core::{RenderPipeline, ReferenceExecutor};
//!
//! let executor = ReferenceExecutor::new();
//! let pipeline = RenderPipeline::new(&executor, &prompts);
//!
//! let data = serde_json::json!({"name": "World"});
//! let output = pipeline
//!     .render("Hello <%= name %>!", data.as_object().unwrap())
//!     .await;
//! assert_eq!(output, "Hello World!");
//! ```

pub mod chunked;
pub mod config;
pub mod context;
pub mod exec;
pub mod pipeline;
pub mod placeholder;
pub mod repair;
pub mod scan;

// Re-export main types at crate root
pub use config::{RenderConfig, TagVocabulary};
pub use context::{DataContext, extract_declared_variables};
pub use exec::{ExecOptions, ReferenceExecutor, TemplateExecutor};
pub use pipeline::{RenderPipeline, normalize_smart_quotes};
pub use placeholder::{PromptReply, PromptSource, Resolution};
pub use repair::{RepairOutcome, repair};
pub use scan::{Segment, Tag, TagKind, normalize_spacing, reassemble, scan};
