/*
 * context.rs
 * Copyright (c) 2025 Stencil contributors
 */

//! Data context for template execution.
//!
//! The context layers several sources of variables: built-in helper
//! namespaces (date/time), user-supplied data, rendered header attributes
//! (merged both flat and under a `header` namespace), and a best-effort set
//! of names declared in the template itself.
//!
//! The declared-name set is a textual heuristic over `const`/`let`/`var`
//! statements. It exists for diagnostics and the analysis inventory only:
//! it is *not* evaluation, never supplies values, and never suppresses
//! placeholder prompting.

use crate::scan::{Segment, TagKind};
use chrono::{Duration, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;

static DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)").expect("valid regex")
});

/// Layered variable bindings for one render run.
///
/// Each render owns its context; built-ins are computed fresh per run so no
/// state is shared between concurrent renders.
#[derive(Debug, Clone, Default)]
pub struct DataContext {
    root: Map<String, Value>,
    /// Top-level names the executor exposes as callable.
    helpers: BTreeSet<String>,
    /// Names declared inside the template (heuristic, diagnostics only).
    declared: BTreeSet<String>,
}

impl DataContext {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context pre-populated with the date/time helper namespaces.
    pub fn with_builtins() -> Self {
        let now = Local::now();
        let today = now.date_naive();
        let mut ctx = Self::new();
        ctx.insert(
            "date",
            json!({
                "today": today.format("%Y-%m-%d").to_string(),
                "yesterday": (today - Duration::days(1)).format("%Y-%m-%d").to_string(),
                "tomorrow": (today + Duration::days(1)).format("%Y-%m-%d").to_string(),
                "now": now.format("%Y-%m-%d %H:%M").to_string(),
            }),
        );
        ctx.insert(
            "time",
            json!({
                "now": now.format("%H:%M").to_string(),
            }),
        );
        ctx
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.root.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    /// Resolve a dotted path like `["tasks", "open"]`.
    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.root.get(*first)?;
        for key in rest {
            current = current.as_object()?.get(*key)?;
        }
        Some(current)
    }

    /// Whether a variable is already bound, either at the top level or under
    /// the `data` namespace. Used to skip re-prompting for placeholders.
    pub fn has(&self, name: &str) -> bool {
        if self.root.contains_key(name) {
            return true;
        }
        self.root
            .get("data")
            .and_then(Value::as_object)
            .is_some_and(|data| data.contains_key(name))
    }

    /// Merge user-supplied data at the top level.
    pub fn merge_user_data(&mut self, data: &Map<String, Value>) {
        for (key, value) in data {
            self.root.insert(key.clone(), value.clone());
        }
    }

    /// Merge rendered header attributes, both flat and under `header`.
    pub fn merge_header_attributes(&mut self, attributes: &[(String, Value)]) {
        let mut namespace = Map::new();
        for (key, value) in attributes {
            self.root.insert(key.clone(), value.clone());
            namespace.insert(key.clone(), value.clone());
        }
        self.root.insert("header".to_string(), Value::Object(namespace));
    }

    /// Mark a top-level name as a callable helper for inventory purposes.
    pub fn register_helper(&mut self, name: impl Into<String>) {
        self.helpers.insert(name.into());
    }

    /// Record names declared in the template text.
    pub fn note_declared<I: IntoIterator<Item = String>>(&mut self, names: I) {
        self.declared.extend(names);
    }

    pub fn declared(&self) -> &BTreeSet<String> {
        &self.declared
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    /// Summarize top-level keys for the analysis prompt.
    ///
    /// Objects list their keys instead of being dumped in full; helpers are
    /// reported as functions.
    pub fn inventory(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (key, value) in &self.root {
            if self.helpers.contains(key) {
                lines.push(format!("{}: function", key));
                continue;
            }
            let summary = match value {
                Value::Object(map) => {
                    let keys: Vec<&str> = map.keys().take(8).map(String::as_str).collect();
                    format!("object with keys: {}", keys.join(", "))
                }
                Value::Array(items) => format!("array of {} items", items.len()),
                Value::String(_) => "string".to_string(),
                Value::Number(_) => "number".to_string(),
                Value::Bool(_) => "boolean".to_string(),
                Value::Null => "null".to_string(),
            };
            lines.push(format!("{}: {}", key, summary));
        }
        for name in &self.declared {
            if !self.root.contains_key(name) {
                lines.push(format!("{}: declared in template", name));
            }
        }
        lines
    }
}

/// Extract names declared with `const`/`let`/`var` inside statement tags.
///
/// Textual and approximate by design: destructuring patterns and multiple
/// declarators per statement are only partially captured.
pub fn extract_declared_variables(segments: &[Segment]) -> Vec<String> {
    let mut names = Vec::new();
    for segment in segments {
        let Segment::Tag(tag) = segment else { continue };
        if tag.kind != TagKind::ControlBlock && tag.kind != TagKind::BridgeCall {
            continue;
        }
        for caps in DECLARATION.captures_iter(&tag.content) {
            names.push(caps[1].to_string());
        }
    }
    names
}
