//! Search index seam used by the query executor, plus the in-memory reference index,
//! content readers and the synchronizer that keeps the index in step with the store.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::RepoResult;
use crate::value::Scalar;

pub mod extract;
pub mod memory;
pub mod sync;

pub use extract::{ContentReader, ContentReaderRegistry};
pub use memory::InMemoryIndex;
pub use sync::{IndexFailure, IndexSource, IndexSynchronizer};

/// Field carrying the ids of the folders an object is filed in; `""` for the root.
pub const PARENT_FIELD: &str = "@parent";

/// What the index stores per object: flattened property values plus the full-text body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub fields: BTreeMap<String, Vec<Scalar>>,
    pub fulltext: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WildcardToken {
    Literal(String),
    /// `_`
    AnyChar,
    /// `%`
    AnyString,
}

/// Bound of a range constraint; `inclusive` selects `<=`/`>=` over `<`/`>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub value: Scalar,
    pub inclusive: bool,
}

/// One full-text term or quoted phrase, lowercased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullTextTerm {
    pub words: Vec<String>,
    pub negated: bool,
}

/// Disjunction of conjunctions of terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullTextExpr {
    pub clauses: Vec<Vec<FullTextTerm>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NativeConstraint {
    All,
    And(Vec<NativeConstraint>),
    Or(Vec<NativeConstraint>),
    Not(Box<NativeConstraint>),
    Term { field: String, value: Scalar },
    Range { field: String, lower: Option<Bound>, upper: Option<Bound> },
    Wildcard { field: String, pattern: Vec<WildcardToken> },
    Exists { field: String },
    FullText(FullTextExpr),
    Ids(BTreeSet<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeQuery {
    pub constraint: NativeConstraint,
}

/// A matching object with its relevance score. Rows come back in the index's native order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRow {
    pub node_id: String,
    pub score: f32,
}

pub trait SearchIndex: Send + Sync {
    /// Insert or replace the document stored for `id`.
    fn index(&self, id: &str, document: IndexDocument) -> RepoResult<()>;
    fn retract(&self, id: &str) -> RepoResult<()>;
    fn search(&self, query: &NativeQuery) -> RepoResult<Vec<IndexRow>>;
}

/// Lowercased alphanumeric word tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}
