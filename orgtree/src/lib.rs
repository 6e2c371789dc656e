//! Org-mode parser.
//!
//! Text is classified line by line into tokens ([`lexer`]), then a recursive-descent
//! parser ([`parser`]) assembles them into a tree of [`Node`]s, building the document
//! [`outline`] and cross-reference registries along the way. [`format`] renders a tree
//! back to Org syntax.
//!
//! ```no_run
//! use orgtree::Configuration;
//!
//! let config = Configuration::new();
//! let doc = config.parse("#+TITLE: Notes\n* TODO Write docs", "./notes.org");
//! assert_eq!(doc.get("TITLE"), "Notes");
//! ```

pub mod config;
pub mod core;
pub mod document;
pub mod error;
pub mod format;
pub mod lexer;
pub mod outline;
pub mod parser;
pub mod store;

pub use config::{Configuration, FileReader, FsReader};
pub use crate::core::{Headline, Inline, Node};
pub use document::Document;
pub use error::OrgError;
pub use format::{OrgWriter, Writer, to_org_string};
pub use outline::{Outline, Section, SectionId};
pub use store::{IdStore, JsonIdStore};
