//! Hierarchical configuration language.
//!
//! Line-oriented and indentation-sensitive: a trailing `:` opens a nested
//! block, `#` starts a comment (`\#` for a literal hash), double quotes glue
//! atoms containing spaces together. `@include` splices other files in
//! place. Loaded once at startup and queried read-only afterwards.
//!
//! ```text
//! hostname mx.example.test
//! max_size 10M
//!
//! domain example.test:
//!     catch-all postmaster
//!     user postmaster:
//!         box /var/mail/example.test/postmaster
//!         password sha256 2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824
//! ```

mod dump;
mod parser;
mod preprocessor;
mod query;

use std::path::Path;

use crate::error::{Component, Error, Result};

pub use query::QueryResult;

/// One configuration line: a key, its values, and — when the line ended with
/// `:` — the indented block that followed it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Property {
    pub key: String,
    pub values: Vec<String>,
    pub block: Option<Block>,
}

/// An ordered run of properties sharing one parent and indent level.
/// Duplicate keys are allowed and document order is preserved.
pub type Block = Vec<Property>;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub data: Block,
}

impl Config {
    /// Loads a configuration file from disk, resolving `@include` directives
    /// relative to the file's own directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::io(Component::Config, e).with_info(format!("File {}", path.display()))
        })?;

        let data = parser::parse(path, &text)?;
        let data = preprocessor::process(path, data)?;
        Ok(Config { data })
    }

    /// Parses configuration text that does not live on disk. `@include`
    /// directives resolve relative to the current directory.
    pub fn parse_str(text: &str) -> Result<Config> {
        let origin = Path::new("<memory>");
        let data = parser::parse(origin, text)?;
        let data = preprocessor::process(origin, data)?;
        Ok(Config { data })
    }

    /// Collects every property matching a space-separated path of steps,
    /// in document order. See [`query::query_block`] for the step syntax.
    pub fn query(&self, path: &str) -> Result<Vec<&Property>> {
        query::query_block(&self.data, path)
    }

    /// [`Config::query`] scoped to an arbitrary block, used to descend into
    /// a property's children without repeating the outer path.
    pub fn query_sub<'a>(&self, path: &str, block: &'a Block) -> Result<Vec<&'a Property>> {
        query::query_block(block, path)
    }

    /// Resolves a query down to a single value. The last token of `path` is
    /// a positional selector: `N` (value N of the first match) or `M:N`
    /// (value N of match M).
    pub fn query_single(&self, path: &str) -> Result<String> {
        query::query_single(&self.data, path)
    }

    /// [`Config::query_single`] scoped to an arbitrary block.
    pub fn query_single_sub(&self, path: &str, block: &Block) -> Result<String> {
        query::query_single(block, path)
    }

    /// Renders the configuration back to parseable text.
    pub fn dump(&self) -> String {
        dump::dump(&self.data)
    }
}
