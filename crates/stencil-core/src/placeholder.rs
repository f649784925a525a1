/*
 * placeholder.rs
 * Copyright (c) 2025 Stencil contributors
 */

//! Interactive placeholder resolution.
//!
//! Placeholder tags request a value from the user instead of the data
//! context: `prompt('project', 'Which project?', ['alpha', 'beta'])`,
//! `promptDate('due')`, `promptDateInterval('range')`. Resolution binds the
//! answer into the context, rewrites output-form tags to plain output tags,
//! and removes statement-form tags together with their trailing newline.
//!
//! Cancellation is not an error: a single cancelled prompt aborts the whole
//! render, and the orchestrator returns empty output rather than anything
//! partial.

use crate::config::RenderConfig;
use crate::context::DataContext;
use crate::scan::{Segment, Tag, TagKind, reassemble, scan};
use async_trait::async_trait;
use chrono::{Duration, Local};
use serde_json::Value;
use stencil_report::PhaseError;

/// Phase name recorded on placeholder errors.
pub const PHASE: &str = "placeholder";

/// Answer from the prompt capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptReply {
    Value(String),
    /// The user dismissed the prompt. Distinguished sentinel, checked after
    /// every resolution.
    Cancelled,
}

/// External prompting capability.
#[async_trait]
pub trait PromptSource: Send + Sync {
    /// Free-text prompt, seeded with a default.
    async fn prompt_text(&self, message: &str, default: &str) -> PromptReply;

    /// Single-choice prompt over a fixed option list.
    async fn prompt_choice(&self, message: &str, options: &[String]) -> PromptReply;

    /// Date prompt; the reply is a formatted date string.
    async fn prompt_date(&self, message: &str) -> PromptReply;

    /// Date-interval prompt; the reply is a formatted interval string.
    async fn prompt_date_interval(&self, message: &str) -> PromptReply;
}

/// Outcome of a resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved { document: String },
    Cancelled,
}

/// Which prompt call a placeholder uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptCall {
    Text,
    Date,
    DateInterval,
}

/// A parsed placeholder tag.
#[derive(Debug)]
struct PlaceholderSpec {
    call: PromptCall,
    variable: String,
    message: String,
    choices: Vec<String>,
    default: Option<String>,
}

/// Resolve every placeholder in the document.
///
/// Values already present in the context (top level or under `data`)
/// suppress prompting; repeated references to the same variable reuse the
/// first resolution because it is bound before the next tag is examined.
pub async fn resolve(
    document: &str,
    ctx: &mut DataContext,
    prompts: &dyn PromptSource,
    config: &RenderConfig,
) -> (Resolution, Vec<PhaseError>) {
    let segments = scan(document, &config.vocabulary);
    let mut errors = Vec::new();
    let mut out: Vec<Segment> = Vec::new();
    let mut strip_leading_newline = false;

    for segment in segments {
        match segment {
            Segment::Text { mut text, start } => {
                if strip_leading_newline {
                    strip_leading_newline = false;
                    if let Some(rest) =
                        text.strip_prefix("\r\n").or_else(|| text.strip_prefix('\n'))
                    {
                        text = rest.to_string();
                    }
                }
                out.push(Segment::Text { text, start });
            }
            Segment::Tag(tag) if tag.kind == TagKind::Placeholder => {
                let Some(spec) = parse_placeholder(&tag, config) else {
                    errors.push(
                        PhaseError::new(
                            PHASE,
                            format!("line {}: could not parse placeholder call", tag.line),
                        )
                        .with_context(tag.text()),
                    );
                    out.push(Segment::Tag(tag));
                    continue;
                };

                if !ctx.has(&spec.variable) {
                    match ask(prompts, &spec).await {
                        PromptReply::Cancelled => {
                            return (Resolution::Cancelled, errors);
                        }
                        PromptReply::Value(value) => {
                            tracing::debug!(variable = %spec.variable, "placeholder resolved");
                            ctx.insert(spec.variable.clone(), Value::String(value));
                        }
                    }
                }

                if tag.is_output_form() {
                    let start = tag.span.0;
                    out.push(Segment::Text {
                        text: format!("<%- {} %>", spec.variable),
                        start,
                    });
                } else {
                    // Statement form: drop the tag and the newline after it
                    // so no blank line remains.
                    strip_leading_newline = true;
                }
            }
            segment => out.push(segment),
        }
    }

    (
        Resolution::Resolved {
            document: reassemble(&out),
        },
        errors,
    )
}

async fn ask(prompts: &dyn PromptSource, spec: &PlaceholderSpec) -> PromptReply {
    match spec.call {
        PromptCall::Date => prompts.prompt_date(&spec.message).await,
        PromptCall::DateInterval => prompts.prompt_date_interval(&spec.message).await,
        PromptCall::Text => {
            if spec.choices.is_empty() {
                let default = spec
                    .default
                    .as_deref()
                    .map(resolve_symbolic_default)
                    .unwrap_or_default();
                prompts.prompt_text(&spec.message, &default).await
            } else {
                prompts.prompt_choice(&spec.message, &spec.choices).await
            }
        }
    }
}

/// Map the recognized symbolic defaults to formatted date strings.
fn resolve_symbolic_default(default: &str) -> String {
    let today = Local::now().date_naive();
    match default.to_ascii_lowercase().as_str() {
        "today" => today.format("%Y-%m-%d").to_string(),
        "yesterday" => (today - Duration::days(1)).format("%Y-%m-%d").to_string(),
        "tomorrow" => (today + Duration::days(1)).format("%Y-%m-%d").to_string(),
        "now" => Local::now().format("%Y-%m-%d %H:%M").to_string(),
        _ => default.to_string(),
    }
}

fn parse_placeholder(tag: &Tag, config: &RenderConfig) -> Option<PlaceholderSpec> {
    let code = tag.content.trim();
    let code = code.strip_prefix("await ").map(str::trim_start).unwrap_or(code);

    let (name, rest) = config.vocabulary.placeholder_calls.iter().find_map(|name| {
        let rest = code.strip_prefix(name.as_str())?.trim_start();
        rest.starts_with('(').then_some((name, rest))
    })?;
    let call = match name.as_str() {
        "promptDate" => PromptCall::Date,
        "promptDateInterval" => PromptCall::DateInterval,
        _ => PromptCall::Text,
    };

    let inner = rest.strip_prefix('(')?;
    let close = inner.rfind(')')?;
    let args = split_args(&inner[..close]);

    let variable = sanitize_variable(&unquote(args.first()?.trim()));
    if variable.is_empty() {
        return None;
    }
    let message = args.get(1).map(|a| unquote(a.trim())).unwrap_or_default();

    let mut choices = Vec::new();
    let mut default = None;
    if let Some(third) = args.get(2).map(|a| a.trim()) {
        if let Some(list) = third.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            choices = split_args(list)
                .iter()
                .map(|item| unquote(item.trim()))
                .filter(|item| !item.is_empty())
                .collect();
        } else if !third.is_empty() {
            default = Some(unquote(third));
        }
    }

    Some(PlaceholderSpec {
        call,
        variable,
        message,
        choices,
        default,
    })
}

/// Split call arguments at top-level commas, quote- and bracket-aware.
fn split_args(args: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut chars = args.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
            }
            '[' | '(' | '{' => {
                depth += 1;
                current.push(c);
            }
            ']' | ')' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                out.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        out.push(current);
    }
    out
}

fn unquote(arg: &str) -> String {
    let arg = arg.trim();
    for quote in ['\'', '"'] {
        if let Some(inner) = arg
            .strip_prefix(quote)
            .and_then(|a| a.strip_suffix(quote))
        {
            return inner.replace(&format!("\\{}", quote), &quote.to_string());
        }
    }
    arg.to_string()
}

/// Normalize a prompted variable name to a bindable identifier.
fn sanitize_variable(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if out.trim_matches('_').is_empty() {
        String::new()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Scripted prompt source recording every call.
    struct Scripted {
        replies: Mutex<Vec<PromptReply>>,
        calls: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<PromptReply>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn next(&self, call: String) -> PromptReply {
            self.calls.lock().unwrap().push(call);
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                PromptReply::Cancelled
            } else {
                replies.remove(0)
            }
        }
    }

    #[async_trait]
    impl PromptSource for Scripted {
        async fn prompt_text(&self, message: &str, default: &str) -> PromptReply {
            self.next(format!("text:{}:{}", message, default))
        }
        async fn prompt_choice(&self, message: &str, options: &[String]) -> PromptReply {
            self.next(format!("choice:{}:{}", message, options.join("|")))
        }
        async fn prompt_date(&self, message: &str) -> PromptReply {
            self.next(format!("date:{}", message))
        }
        async fn prompt_date_interval(&self, message: &str) -> PromptReply {
            self.next(format!("interval:{}", message))
        }
    }

    fn run(
        doc: &str,
        ctx: &mut DataContext,
        prompts: &Scripted,
    ) -> (Resolution, Vec<PhaseError>) {
        pollster::block_on(resolve(doc, ctx, prompts, &RenderConfig::default()))
    }

    #[test]
    fn output_placeholder_is_rewritten_to_output_tag() {
        let prompts = Scripted::new(vec![PromptReply::Value("alpha".into())]);
        let mut ctx = DataContext::new();
        let (resolution, errors) = run(
            "Project: <%- prompt('project', 'Which project?') %>!",
            &mut ctx,
            &prompts,
        );
        assert!(errors.is_empty());
        assert_eq!(
            resolution,
            Resolution::Resolved {
                document: "Project: <%- project %>!".to_string()
            }
        );
        assert_eq!(ctx.get("project"), Some(&Value::String("alpha".into())));
    }

    #[test]
    fn statement_placeholder_is_removed_with_trailing_newline() {
        let prompts = Scripted::new(vec![PromptReply::Value("alpha".into())]);
        let mut ctx = DataContext::new();
        let (resolution, _) = run(
            "<% prompt('project') %>\nUsing <%- project %>\n",
            &mut ctx,
            &prompts,
        );
        assert_eq!(
            resolution,
            Resolution::Resolved {
                document: "Using <%- project %>\n".to_string()
            }
        );
    }

    #[test]
    fn existing_value_suppresses_prompting() {
        let prompts = Scripted::new(vec![]);
        let mut ctx = DataContext::new();
        ctx.insert("project", Value::String("beta".into()));
        let (resolution, _) = run("<%- prompt('project') %>", &mut ctx, &prompts);
        assert_eq!(
            resolution,
            Resolution::Resolved {
                document: "<%- project %>".to_string()
            }
        );
        assert!(prompts.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn data_namespace_also_suppresses_prompting() {
        let prompts = Scripted::new(vec![]);
        let mut ctx = DataContext::new();
        ctx.insert("data", serde_json::json!({"project": "gamma"}));
        let (resolution, _) = run("<%- prompt('project') %>", &mut ctx, &prompts);
        assert!(matches!(resolution, Resolution::Resolved { .. }));
        assert!(prompts.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn repeated_references_prompt_once() {
        let prompts = Scripted::new(vec![PromptReply::Value("x".into())]);
        let mut ctx = DataContext::new();
        let (_, errors) = run(
            "<%- prompt('name') %> and <%- prompt('name') %>",
            &mut ctx,
            &prompts,
        );
        assert!(errors.is_empty());
        assert_eq!(prompts.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn choice_list_uses_single_choice_prompt() {
        let prompts = Scripted::new(vec![PromptReply::Value("beta".into())]);
        let mut ctx = DataContext::new();
        run(
            "<%- prompt('project', 'Pick one', ['alpha', 'beta']) %>",
            &mut ctx,
            &prompts,
        );
        let calls = prompts.calls.lock().unwrap();
        assert_eq!(calls[0], "choice:Pick one:alpha|beta");
    }

    #[test]
    fn symbolic_default_becomes_a_date() {
        let prompts = Scripted::new(vec![PromptReply::Value("whatever".into())]);
        let mut ctx = DataContext::new();
        run(
            "<%- prompt('when', 'When?', 'today') %>",
            &mut ctx,
            &prompts,
        );
        let calls = prompts.calls.lock().unwrap();
        let default = calls[0].rsplit(':').next().unwrap();
        assert_eq!(default.len(), 10); // YYYY-MM-DD
        assert_eq!(&default[4..5], "-");
    }

    #[test]
    fn date_calls_route_to_date_prompts() {
        let prompts = Scripted::new(vec![
            PromptReply::Value("2026-01-01".into()),
            PromptReply::Value("2026-01-01..2026-01-07".into()),
        ]);
        let mut ctx = DataContext::new();
        run(
            "<%- promptDate('due', 'Due?') %><%- promptDateInterval('span', 'Span?') %>",
            &mut ctx,
            &prompts,
        );
        let calls = prompts.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), ["date:Due?", "interval:Span?"]);
    }

    #[test]
    fn cancellation_aborts_immediately() {
        let prompts = Scripted::new(vec![
            PromptReply::Value("one".into()),
            PromptReply::Cancelled,
        ]);
        let mut ctx = DataContext::new();
        let (resolution, _) = run(
            "<%- prompt('a') %><%- prompt('b') %><%- prompt('c') %>",
            &mut ctx,
            &prompts,
        );
        assert_eq!(resolution, Resolution::Cancelled);
        // The third prompt never ran.
        assert_eq!(prompts.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn malformed_placeholder_is_kept_and_reported() {
        let prompts = Scripted::new(vec![]);
        let mut ctx = DataContext::new();
        let (resolution, errors) = run("<%- prompt() %>", &mut ctx, &prompts);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].phase, PHASE);
        assert_eq!(
            resolution,
            Resolution::Resolved {
                document: "<%- prompt() %>".to_string()
            }
        );
    }

    #[test]
    fn variable_names_are_sanitized() {
        let prompts = Scripted::new(vec![PromptReply::Value("v".into())]);
        let mut ctx = DataContext::new();
        let (resolution, _) = run("<%- prompt('my project!') %>", &mut ctx, &prompts);
        assert_eq!(
            resolution,
            Resolution::Resolved {
                document: "<%- my_project_ %>".to_string()
            }
        );
        assert!(ctx.has("my_project_"));
    }
}
