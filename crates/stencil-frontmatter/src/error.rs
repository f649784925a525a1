//! Error types for header attribute parsing.

use thiserror::Error;

/// Result type alias for stencil-frontmatter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the strict attribute-parsing path.
///
/// These never escape [`crate::split`]: a failed strict parse falls back to a
/// textual scan, so callers only see them through [`crate::parse_attributes`].
#[derive(Debug, Error)]
pub enum Error {
    /// YAML syntax error inside the header block.
    #[error("header parse error: {0}")]
    Scan(#[from] yaml_rust2::ScanError),

    /// The header block parsed but is not a flat key/value mapping.
    #[error("header is not a key/value mapping")]
    NotAMapping,
}
