//! SQL-like query compiler: statement text to a resolved query object model.

use tracing::debug;

use crate::error::RepoResult;
use crate::types::TypeRegistry;

pub mod query_common;
pub mod query_lexer;
pub mod query_parse_select;
pub mod query_parse_where;
pub mod query_resolve;

pub use query_common::*;
pub use query_parse_select::parse_select;
pub use query_resolve::{normalize, resolve};

/// Compiles `statement` against the registry. Pure: equal inputs give structurally equal output.
pub fn parse(statement: &str, types: &TypeRegistry) -> RepoResult<Query> {
    let raw = parse_select(statement)?;
    let q = resolve(raw, types)?;
    debug!(target: "folio::query", "compiled query with {} selector(s), {} ordering(s)", q.selectors().len(), q.orderings.len());
    Ok(q)
}

#[cfg(test)]
mod tests;
