//! Header splitting and attribute parsing.

use crate::error::{Error, Result};
use std::borrow::Cow;
use std::fmt;
use yaml_rust2::{Yaml, YamlLoader};

/// The header delimiter line.
pub const DELIMITER: &str = "---";

/// Two-character shorthand accepted at the very top of a document and
/// normalized to [`DELIMITER`] before parsing.
pub const SHORTHAND: &str = "--";

/// Alternate body separator recognized by [`split_legacy`] for documents
/// with a preamble but no attribute block.
pub const LEGACY_SEPARATOR: &str = "*****";

/// A header attribute value: the flat scalar subset of YAML.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    String(String),
    Number(f64),
    Bool(bool),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::String(s) => write!(f, "{}", s),
            AttrValue::Number(n) => write!(f, "{}", n),
            AttrValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// A detected metadata header.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// The header block verbatim, both delimiter lines included, so that
    /// `raw_block + body` reconstructs the (normalized) document.
    pub raw_block: String,

    /// Flat key/value attributes. Order follows the document. Non-scalar
    /// values are skipped.
    pub attributes: Vec<(String, AttrValue)>,

    /// Everything strictly after the closing delimiter line.
    pub body: String,
}

impl Header {
    /// Look up an attribute by key.
    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end() == DELIMITER
}

fn is_shorthand(line: &str) -> bool {
    line.trim_end() == SHORTHAND
}

/// Lines of a document with byte ranges: (content, start, end) where `end`
/// includes the trailing newline if present.
fn line_spans(document: &str) -> Vec<(&str, usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    for piece in document.split_inclusive('\n') {
        let end = start + piece.len();
        spans.push((piece.trim_end_matches('\n'), start, end));
        start = end;
    }
    spans
}

/// Rewrite a leading `--` shorthand pair to the `---` form.
///
/// Applies only when the very first line is the shorthand and a matching
/// shorthand closing line appears before any full delimiter line.
fn normalize_shorthand(document: &str) -> Cow<'_, str> {
    let spans = line_spans(document);
    let Some(&(first, _, _)) = spans.first() else {
        return Cow::Borrowed(document);
    };
    if !is_shorthand(first) {
        return Cow::Borrowed(document);
    }

    let close = spans.iter().skip(1).find_map(|(line, start, _)| {
        if is_delimiter(line) {
            Some(None) // full delimiter comes first: leave alone
        } else if is_shorthand(line) {
            Some(Some(*start))
        } else {
            None
        }
    });

    match close {
        Some(Some(close_start)) => {
            let mut out = String::with_capacity(document.len() + 2);
            for (line, start, end) in &spans {
                if *start == 0 || *start == close_start {
                    out.push_str(DELIMITER);
                    out.push_str(&document[start + line.len()..*end]);
                } else {
                    out.push_str(&document[*start..*end]);
                }
            }
            Cow::Owned(out)
        }
        _ => Cow::Borrowed(document),
    }
}

/// Split a document into header and body.
///
/// Returns `None` when the document does not start with a delimiter line or
/// the closing delimiter is missing. Only the first delimiter pair bounds the
/// header; delimiter-like lines later in the body are body text.
pub fn split(document: &str) -> Option<Header> {
    let normalized = normalize_shorthand(document);
    let doc = normalized.as_ref();

    let spans = line_spans(doc);
    let (first, _, first_end) = *spans.first()?;
    if !is_delimiter(first) {
        return None;
    }

    let (_, close_start, close_end) = *spans
        .iter()
        .skip(1)
        .find(|(line, _, _)| is_delimiter(line))?;

    let inner = &doc[first_end..close_start];
    let attributes =
        parse_attributes(inner).unwrap_or_else(|_| fallback_attributes(inner));

    Some(Header {
        raw_block: doc[..close_end].to_string(),
        attributes,
        body: doc[close_end..].to_string(),
    })
}

/// Split at a `*****` separator line.
///
/// The legacy form carries no attributes: everything above the separator is
/// preamble, everything strictly below is the body. Returns `(head, body)`
/// with the separator line kept at the end of `head`.
pub fn split_legacy(document: &str) -> Option<(String, String)> {
    let spans = line_spans(document);
    let (_, _, sep_end) = *spans
        .iter()
        .find(|(line, _, _)| line.trim_end() == LEGACY_SEPARATOR)?;
    Some((document[..sep_end].to_string(), document[sep_end..].to_string()))
}

/// Strictly parse a header block as a flat key/value mapping.
///
/// Non-scalar values (nested mappings, sequences) are skipped; the header is
/// a flat attribute set by contract.
pub fn parse_attributes(block: &str) -> Result<Vec<(String, AttrValue)>> {
    let docs = YamlLoader::load_from_str(block)?;
    let Some(doc) = docs.first() else {
        return Ok(Vec::new());
    };

    let hash = match doc {
        Yaml::Hash(hash) => hash,
        Yaml::Null => return Ok(Vec::new()),
        _ => return Err(Error::NotAMapping),
    };

    let mut attributes = Vec::new();
    for (key, value) in hash {
        let Some(key) = key.as_str() else { continue };
        let value = match value {
            Yaml::String(s) => AttrValue::String(s.clone()),
            Yaml::Integer(i) => AttrValue::Number(*i as f64),
            Yaml::Real(r) => match r.parse::<f64>() {
                Ok(n) => AttrValue::Number(n),
                Err(_) => AttrValue::String(r.clone()),
            },
            Yaml::Boolean(b) => AttrValue::Bool(*b),
            _ => continue,
        };
        attributes.push((key.to_string(), value));
    }
    Ok(attributes)
}

/// Textual fallback used when strict parsing fails.
///
/// Splits each line at the first `:` and coerces obvious booleans and
/// numbers. Lines that do not look like `key: value` are skipped; the body
/// boundary has already been fixed by the delimiter scan, so nothing here can
/// leak header text into the body.
fn fallback_attributes(block: &str) -> Vec<(String, AttrValue)> {
    let mut attributes = Vec::new();
    for line in block.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || key.starts_with('#') {
            continue;
        }
        attributes.push((key.to_string(), coerce_scalar(value.trim())));
    }
    attributes
}

fn coerce_scalar(value: &str) -> AttrValue {
    match value {
        "true" => return AttrValue::Bool(true),
        "false" => return AttrValue::Bool(false),
        _ => {}
    }
    if let Ok(n) = value.parse::<f64>() {
        return AttrValue::Number(n);
    }
    let unquoted = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')));
    AttrValue::String(unquoted.unwrap_or(value).to_string())
}
