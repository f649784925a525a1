//! # stencil-frontmatter
//!
//! Detection and parsing of the metadata header at the top of a template
//! document.
//!
//! A header is a block bounded by a pair of `---` delimiter lines at the top
//! of the document. A leading `--` shorthand pair is normalized to the full
//! form before parsing. Attributes inside the block are parsed as a flat
//! key/value set with `yaml-rust2`; when that fails (an attribute value may
//! itself contain unbalanced tag syntax), a textual fallback still yields the
//! correct body boundary; header text never leaks into the body.
//!
//! ## Example
//!
//! ```rust
//! use stencil_frontmatter::split;
//!
//! let doc = "---\ntitle: Daily note\n---\nBody text\n";
//! let header = split(doc).unwrap();
//! assert_eq!(header.body, "Body text\n");
//! assert_eq!(format!("{}{}", header.raw_block, header.body), doc);
//! ```

mod error;
mod header;

pub use error::{Error, Result};
pub use header::{
    AttrValue, DELIMITER, Header, LEGACY_SEPARATOR, SHORTHAND, parse_attributes, split,
    split_legacy,
};
