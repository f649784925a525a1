/*
 * exec.rs
 * Copyright (c) 2025 Stencil contributors
 */

//! The template-executor contract and a small reference implementation.
//!
//! The engine that actually runs embedded code is an external capability:
//! anything able to execute a tag-bearing document against a data context
//! can sit behind [`TemplateExecutor`]. The pipeline only relies on the
//! contract: output string on success, a [`Fault`] with optional position
//! on failure, and [`TemplateExecutor::wrapper_line_offset`] as the single
//! source of truth for how many boilerplate lines the executor prepends.
//!
//! [`ReferenceExecutor`] is deliberately modest: variable interpolation,
//! string/number literals, and brace-style `if`/`else` blocks. It exists so
//! the pipeline, the chunked renderer, and the CLI can run end-to-end
//! without a scripting engine; it is not a JavaScript implementation.

use crate::config::TagVocabulary;
use crate::context::DataContext;
use crate::scan::{Segment, Tag, TagKind, scan};
use async_trait::async_trait;
use serde_json::Value;
use stencil_report::Fault;

/// Options passed through to the executor.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Fault on a reference to an unbound top-level variable instead of
    /// rendering it as empty.
    pub strict_undefined: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            strict_undefined: true,
        }
    }
}

/// An engine that executes a normalized template against a data context.
#[async_trait]
pub trait TemplateExecutor: Send + Sync {
    async fn execute(
        &self,
        document: &str,
        ctx: &DataContext,
        options: &ExecOptions,
    ) -> Result<String, Fault>;

    /// Number of boilerplate lines this executor prepends to the text it
    /// runs. Fault line numbers are shifted back by this amount when
    /// anchoring reports; override it to match the engine's actual wrapper.
    fn wrapper_line_offset(&self) -> usize {
        0
    }
}

/// Interpolation-only executor used by tests and the CLI.
#[derive(Debug, Default)]
pub struct ReferenceExecutor {
    vocab: TagVocabulary,
}

impl ReferenceExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateExecutor for ReferenceExecutor {
    async fn execute(
        &self,
        document: &str,
        ctx: &DataContext,
        options: &ExecOptions,
    ) -> Result<String, Fault> {
        let segments = scan(document, &self.vocab);
        let mut out = String::new();
        let mut branches: Vec<Branch> = Vec::new();
        let mut pending_trim: Option<&'static str> = None;

        for segment in &segments {
            match segment {
                Segment::Text { text, .. } => {
                    let text = apply_pending_trim(text, pending_trim.take());
                    if emitting(&branches) {
                        out.push_str(&text);
                    }
                }
                Segment::Tag(tag) => {
                    if tag.trim_before() {
                        trim_trailing_indentation(&mut out);
                    }
                    pending_trim = match tag.close.as_str() {
                        "-%>" => Some("newline"),
                        "_%>" => Some("whitespace"),
                        _ => None,
                    };
                    self.run_tag(tag, ctx, options, &mut out, &mut branches)?;
                }
            }
        }
        Ok(out)
    }
}

impl ReferenceExecutor {
    fn run_tag(
        &self,
        tag: &Tag,
        ctx: &DataContext,
        options: &ExecOptions,
        out: &mut String,
        branches: &mut Vec<Branch>,
    ) -> Result<(), Fault> {
        match tag.kind {
            TagKind::Comment => Ok(()),
            TagKind::OutputEscaped | TagKind::OutputRaw => {
                if !emitting(branches) {
                    return Ok(());
                }
                let value = eval_expression(tag.content.trim(), ctx, options, tag.line)?;
                let rendered = render_value(&value);
                if tag.kind == TagKind::OutputEscaped {
                    out.push_str(&html_escape(&rendered));
                } else {
                    out.push_str(&rendered);
                }
                Ok(())
            }
            // Bridge calls need a host; placeholders should have been
            // resolved before execution. Both are no-ops here.
            TagKind::BridgeCall | TagKind::Placeholder => Ok(()),
            TagKind::ControlBlock => self.run_statement(tag, ctx, options, branches),
        }
    }

    fn run_statement(
        &self,
        tag: &Tag,
        ctx: &DataContext,
        options: &ExecOptions,
        branches: &mut Vec<Branch>,
    ) -> Result<(), Fault> {
        let code = tag.content.trim();

        if starts_with_keyword(code, "if") {
            let parent = emitting(branches);
            let condition = condition_text(code).unwrap_or_default();
            let active = parent && eval_condition(condition, ctx, options, tag.line)?;
            branches.push(Branch {
                parent,
                taken: active,
                active,
            });
            return Ok(());
        }
        if code.starts_with("} else if") {
            let Some(frame) = branches.last().copied() else {
                return Ok(());
            };
            let active = if frame.taken {
                false
            } else {
                let condition = condition_text(code).unwrap_or_default();
                frame.parent && eval_condition(condition, ctx, options, tag.line)?
            };
            let frame = branches.last_mut().expect("branch frame present");
            frame.active = active;
            frame.taken |= active;
            return Ok(());
        }
        if code.starts_with("} else") {
            if let Some(branch) = branches.last_mut() {
                branch.active = branch.parent && !branch.taken;
                branch.taken = true;
            }
            return Ok(());
        }
        if code == "}" {
            branches.pop();
            return Ok(());
        }
        // Declarations and other statements are not evaluated.
        Ok(())
    }
}

/// One open conditional: whether the enclosing scope emits, whether any
/// branch has been taken, and whether the current branch emits.
#[derive(Debug, Clone, Copy)]
struct Branch {
    parent: bool,
    taken: bool,
    active: bool,
}

/// Whether output is currently enabled given the branch stack.
fn emitting(branches: &[Branch]) -> bool {
    branches.last().map_or(true, |branch| branch.active)
}

fn starts_with_keyword(code: &str, keyword: &str) -> bool {
    code.strip_prefix(keyword)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', '(', '\t']))
}

/// Content between the outermost parentheses of a control statement.
fn condition_text(code: &str) -> Option<&str> {
    let open = code.find('(')?;
    let close = code.rfind(')')?;
    (close > open).then(|| code[open + 1..close].trim())
}

fn eval_condition(
    condition: &str,
    ctx: &DataContext,
    options: &ExecOptions,
    line: usize,
) -> Result<bool, Fault> {
    let (negated, expr) = match condition.strip_prefix('!') {
        Some(rest) => (true, rest.trim()),
        None => (false, condition),
    };
    let value = eval_expression(expr, ctx, options, line)?;
    let truthy = is_truthy(&value);
    Ok(truthy != negated)
}

fn eval_expression(
    expr: &str,
    ctx: &DataContext,
    options: &ExecOptions,
    line: usize,
) -> Result<Value, Fault> {
    let expr = expr.strip_prefix("await ").map(str::trim).unwrap_or(expr);

    if let Some(inner) = unquote(expr) {
        return Ok(Value::String(inner));
    }
    if let Ok(i) = expr.parse::<i64>() {
        return Ok(Value::from(i));
    }
    if let Ok(n) = expr.parse::<f64>() {
        return Ok(serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null));
    }
    match expr {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        "null" | "undefined" => return Ok(Value::Null),
        _ => {}
    }

    let path: Vec<&str> = expr.split('.').map(str::trim).collect();
    if path.iter().any(|p| !is_identifier(p)) {
        return Err(Fault::new(format!(
            "SyntaxError: unsupported expression `{}`",
            expr
        ))
        .with_location(line, None));
    }
    match ctx.get_path(&path) {
        Some(value) => Ok(value.clone()),
        None => {
            if options.strict_undefined && !ctx.has(path[0]) {
                Err(Fault::new(format!(
                    "ReferenceError: {} is not defined",
                    path[0]
                ))
                .with_location(line, None))
            } else {
                Ok(Value::Null)
            }
        }
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && s.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn unquote(expr: &str) -> Option<String> {
    let bytes = expr.as_bytes();
    if expr.len() >= 2 {
        let quote = bytes[0];
        if (quote == b'\'' || quote == b'"') && bytes[expr.len() - 1] == quote {
            let inner = &expr[1..expr.len() - 1];
            if !inner.contains(quote as char) {
                return Some(inner.to_string());
            }
        }
    }
    None
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn apply_pending_trim(text: &str, pending: Option<&'static str>) -> String {
    match pending {
        Some("newline") => text
            .strip_prefix("\r\n")
            .or_else(|| text.strip_prefix('\n'))
            .unwrap_or(text)
            .to_string(),
        Some("whitespace") => {
            let trimmed = text.trim_start_matches([' ', '\t']);
            trimmed
                .strip_prefix("\r\n")
                .or_else(|| trimmed.strip_prefix('\n'))
                .unwrap_or(trimmed)
                .to_string()
        }
        _ => text.to_string(),
    }
}

fn trim_trailing_indentation(out: &mut String) {
    let trimmed = out.trim_end_matches([' ', '\t']).len();
    out.truncate(trimmed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn run(doc: &str, ctx: &DataContext) -> Result<String, Fault> {
        pollster::block_on(ReferenceExecutor::new().execute(
            doc,
            ctx,
            &ExecOptions::default(),
        ))
    }

    #[test]
    fn interpolates_variables() {
        let mut ctx = DataContext::new();
        ctx.insert("name", json!("World"));
        assert_eq!(run("Hello <%= name %>!", &ctx).unwrap(), "Hello World!");
    }

    #[test]
    fn escaped_output_escapes_html() {
        let mut ctx = DataContext::new();
        ctx.insert("v", json!("<b>&</b>"));
        assert_eq!(
            run("<%= v %>|<%- v %>", &ctx).unwrap(),
            "&lt;b&gt;&amp;&lt;/b&gt;|<b>&</b>"
        );
    }

    #[test]
    fn nested_paths_resolve() {
        let mut ctx = DataContext::new();
        ctx.insert("employee", json!({"salary": 50000}));
        assert_eq!(run("<%= employee.salary %>", &ctx).unwrap(), "50000");
    }

    #[test]
    fn undefined_reference_faults_with_line() {
        let ctx = DataContext::new();
        let fault = run("line one\n<%= missing %>", &ctx).unwrap_err();
        assert_eq!(fault.message, "ReferenceError: missing is not defined");
        assert_eq!(fault.line, Some(2));
    }

    #[test]
    fn conditional_suppresses_inner_text() {
        let mut ctx = DataContext::new();
        ctx.insert("show", json!(false));
        ctx.insert("name", json!("A"));
        assert_eq!(run("<% if (show) { %>Hi <%= name %><% } %>.", &ctx).unwrap(), ".");
        ctx.insert("show", json!(true));
        assert_eq!(run("<% if (show) { %>Hi <%= name %><% } %>.", &ctx).unwrap(), "Hi A.");
    }

    #[test]
    fn else_branch_runs_when_condition_is_false() {
        let mut ctx = DataContext::new();
        ctx.insert("ok", json!(false));
        let doc = "<% if (ok) { %>yes<% } else { %>no<% } %>";
        assert_eq!(run(doc, &ctx).unwrap(), "no");
    }

    #[test]
    fn negated_condition() {
        let mut ctx = DataContext::new();
        ctx.insert("done", json!(false));
        assert_eq!(run("<% if (!done) { %>open<% } %>", &ctx).unwrap(), "open");
    }

    #[test]
    fn trim_close_eats_the_newline() {
        let mut ctx = DataContext::new();
        ctx.insert("x", json!(true));
        let doc = "<% if (x) { -%>\nkept\n<% } -%>\nend";
        assert_eq!(run(doc, &ctx).unwrap(), "kept\nend");
    }

    #[test]
    fn string_and_number_literals() {
        let ctx = DataContext::new();
        assert_eq!(run("<%= 'lit' %> <%= 4.5 %>", &ctx).unwrap(), "lit 4.5");
    }
}
