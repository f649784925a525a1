/*
 * pipeline.rs
 * Copyright (c) 2025 Stencil contributors
 */

//! The render pipeline.
//!
//! Stages run strictly in sequence for one render call: smart-quote
//! normalization, header extraction, header-attribute sub-rendering, literal
//! repair, placeholder resolution, execution, and output post-processing.
//! Each call owns its document, context, and phase-error list; nothing is
//! shared between concurrent renders.
//!
//! The pipeline always resolves to a string. Rendered output on success, an
//! empty string when a prompt was cancelled, and a formatted diagnostic
//! report on failure. It never raises past this layer.

use crate::chunked;
use crate::config::RenderConfig;
use crate::context::{DataContext, extract_declared_variables};
use crate::exec::TemplateExecutor;
use crate::placeholder::{PromptSource, Resolution, resolve};
use crate::repair::repair;
use crate::scan::scan;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use stencil_frontmatter::AttrValue;
use stencil_report::{FaultAnalyzer, FaultReport, PhaseError, phase_section};

static UNDEFINED_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bundefined\b").expect("valid regex"));

/// Internal stage outcome; the public surface flattens it to a string.
enum Outcome {
    Output(String),
    Cancelled,
    Report(String),
}

/// The top-level render pipeline.
pub struct RenderPipeline<'a> {
    executor: &'a dyn TemplateExecutor,
    prompts: &'a dyn PromptSource,
    analyzer: Option<&'a dyn FaultAnalyzer>,
    config: RenderConfig,
}

impl<'a> RenderPipeline<'a> {
    pub fn new(executor: &'a dyn TemplateExecutor, prompts: &'a dyn PromptSource) -> Self {
        Self {
            executor,
            prompts,
            analyzer: None,
            config: RenderConfig::default(),
        }
    }

    pub fn with_analyzer(mut self, analyzer: &'a dyn FaultAnalyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_config(mut self, config: RenderConfig) -> Self {
        self.config = config;
        self
    }

    /// Render a document against user-supplied data.
    ///
    /// Always resolves to a string: output, `""` on cancellation, or a
    /// diagnostic report.
    pub async fn render(&self, document: &str, user_data: &Map<String, Value>) -> String {
        match self.render_document(document, user_data, 0).await {
            Outcome::Output(output) => output,
            Outcome::Cancelled => String::new(),
            Outcome::Report(report) => report,
        }
    }

    /// One full pipeline pass. Boxed because header attributes recurse.
    fn render_document<'b>(
        &'b self,
        document: &'b str,
        user_data: &'b Map<String, Value>,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = Outcome> + Send + 'b>> {
        Box::pin(async move {
            let document = normalize_smart_quotes(document);
            let mut phase_errors: Vec<PhaseError> = Vec::new();
            let mut ctx = DataContext::with_builtins();
            ctx.merge_user_data(user_data);

            // Header extraction. The header never reaches the executor: the
            // working document is the body from here on.
            let mut working = match stencil_frontmatter::split(&document) {
                Some(header) => {
                    tracing::debug!(attributes = header.attributes.len(), "header detected");
                    match self
                        .render_header_attributes(&header.attributes, user_data, depth, &mut phase_errors)
                        .await
                    {
                        Some(rendered) => ctx.merge_header_attributes(&rendered),
                        None => return Outcome::Cancelled,
                    }
                    header.body
                }
                None => match stencil_frontmatter::split_legacy(&document) {
                    Some((_, body)) => body,
                    None => document.clone(),
                },
            };

            // Explicit spacing normalization for known-safe cases only;
            // whitespace-control tags are exempt inside the transform.
            let mut segments = scan(&working, &self.config.vocabulary);
            crate::scan::normalize_spacing(&mut segments);
            working = crate::scan::reassemble(&segments);

            // Literal repair. Critical findings stop the pipeline before the
            // executor ever runs.
            let outcome = repair(&working, &self.config.vocabulary);
            phase_errors.extend(outcome.errors);
            if outcome.critical {
                let mut text = String::from(
                    "## Template error\n\nThe template was not executed: its embedded data \
                     literals could not be repaired.\n\n",
                );
                text.push_str(&phase_section(&phase_errors));
                return Outcome::Report(text);
            }
            working = outcome.document;

            // Declared-variable extraction, diagnostics only.
            ctx.note_declared(extract_declared_variables(&scan(
                &working,
                &self.config.vocabulary,
            )));

            // Placeholder resolution. Cancellation aborts with empty output.
            let (resolution, errors) =
                resolve(&working, &mut ctx, self.prompts, &self.config).await;
            phase_errors.extend(errors);
            match resolution {
                Resolution::Cancelled => return Outcome::Cancelled,
                Resolution::Resolved { document } => working = document,
            }

            match self
                .executor
                .execute(&working, &ctx, &self.config.exec)
                .await
            {
                Ok(output) => {
                    if !phase_errors.is_empty() {
                        tracing::warn!(
                            count = phase_errors.len(),
                            "render succeeded with earlier phase errors"
                        );
                    }
                    Outcome::Output(self.post_process(output))
                }
                Err(fault) => {
                    tracing::debug!(%fault, "execution fault");
                    if fault.line.is_none() && self.config.incremental_fallback && depth == 0 {
                        let mut text = chunked::render_incrementally(
                            &working,
                            &ctx,
                            self.executor,
                            &self.config,
                        )
                        .await;
                        let phases = phase_section(&phase_errors);
                        if !phases.is_empty() {
                            text.push('\n');
                            text.push_str(&phases);
                        }
                        Outcome::Report(text)
                    } else {
                        let inventory = ctx.inventory();
                        let report = FaultReport {
                            fault: &fault,
                            source: &working,
                            phase_errors: &phase_errors,
                            wrapper_line_offset: self.executor.wrapper_line_offset(),
                            context_inventory: &inventory,
                        };
                        Outcome::Report(
                            report.to_text_with_analysis(self.analyzer, &document).await,
                        )
                    }
                }
            }
        })
    }

    /// Render each header attribute value through the same pipeline.
    ///
    /// Attribute failures become phase errors, never fatal; cancellation
    /// inside an attribute aborts the whole render (`None`).
    async fn render_header_attributes(
        &self,
        attributes: &[(String, AttrValue)],
        user_data: &Map<String, Value>,
        depth: usize,
        phase_errors: &mut Vec<PhaseError>,
    ) -> Option<Vec<(String, Value)>> {
        let mut rendered = Vec::new();
        for (key, value) in attributes {
            let value = match value {
                AttrValue::Bool(b) => Value::Bool(*b),
                AttrValue::Number(n) => serde_json::Number::from_f64(*n)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                AttrValue::String(text) => {
                    if text.contains(crate::scan::OPEN) && depth < self.config.max_header_depth {
                        match self.render_document(text, user_data, depth + 1).await {
                            Outcome::Output(output) => Value::String(output),
                            Outcome::Cancelled => return None,
                            Outcome::Report(report) => {
                                phase_errors.push(
                                    PhaseError::new(
                                        "header",
                                        format!("attribute `{}` failed to render", key),
                                    )
                                    .with_context(first_lines(&report, 12)),
                                );
                                Value::String(text.clone())
                            }
                        }
                    } else {
                        Value::String(text.clone())
                    }
                }
            };
            rendered.push((key.clone(), value));
        }
        Some(rendered)
    }

    /// Post-process successful output.
    fn post_process(&self, output: String) -> String {
        let output = output.replace(
            &self.config.pending_value_marker,
            &self.config.pending_value_hint,
        );
        if self.config.undefined_token == "undefined" {
            UNDEFINED_TOKEN.replace_all(&output, "").to_string()
        } else {
            output.replace(&self.config.undefined_token, "")
        }
    }
}

/// Replace typographic quotes with their ASCII forms.
///
/// Editors on the host platform frequently substitute smart quotes as the
/// user types; embedded code never wants them.
pub fn normalize_smart_quotes(document: &str) -> String {
    document
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => '"',
            other => other,
        })
        .collect()
}

fn first_lines(text: &str, count: usize) -> String {
    text.lines().take(count).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn smart_quotes_are_normalized() {
        assert_eq!(
            normalize_smart_quotes("\u{201C}hi\u{201D} \u{2018}there\u{2019}"),
            "\"hi\" 'there'"
        );
    }

    #[test]
    fn first_lines_truncates() {
        assert_eq!(first_lines("a\nb\nc\nd", 2), "a\nb");
    }
}
