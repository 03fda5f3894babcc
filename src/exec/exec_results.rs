//! Lazily materialized query results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{RepoError, RepoResult};
use crate::index::IndexRow;
use crate::query::Column;
use crate::types::TypeDefinition;
use crate::value::Value;
use super::{ObjectResolver, PropertyFilter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// Alias of the `SCORE()` column
    pub column_name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub object_id: String,
    /// Keyed by column name; by property id for `*`
    pub properties: BTreeMap<String, Value>,
    /// Selected column names, `None` when `*` was selected
    pub property_names: Option<Vec<String>>,
    pub score: Option<Score>,
}

impl QueryResult {
    pub fn property(&self, name: &str) -> Option<&Value> { self.properties.get(name) }
}

#[derive(Debug, Clone)]
enum Projection {
    /// Property ids `*` expands to after filtering
    All(Vec<String>),
    Property { property: String, column_name: String },
    Score { column_name: String },
}

#[derive(Debug, Clone)]
pub(crate) struct Plan {
    columns: Vec<Projection>,
    names: Option<Vec<String>>,
}

/// Explicit columns are kept only when the filter admits their property or column name.
pub(crate) fn plan(columns: &[Column], t: &TypeDefinition, filter: &PropertyFilter) -> Plan {
    let mut star = false;
    let projections = columns.iter().filter_map(|c| match c {
        Column::AllProperties { .. } => {
            star = true;
            Some(Projection::All(t.property_definitions.values().filter(|p| filter.allows(p)).map(|p| p.id.clone()).collect()))
        }
        Column::Property { property, column_name, .. } => {
            let allowed = t.property(property).map(|p| filter.allows(p)).unwrap_or_else(|| filter.allows_id(property))
                || filter.allows_id(column_name);
            allowed.then(|| Projection::Property { property: property.clone(), column_name: column_name.clone() })
        }
        Column::Score { column_name, .. } => Some(Projection::Score { column_name: column_name.clone() }),
    }).collect::<Vec<_>>();
    let names = if star {
        None
    } else {
        Some(projections.iter().filter_map(|p| match p {
            Projection::Property { column_name, .. } => Some(column_name.clone()),
            _ => None,
        }).collect())
    };
    Plan { columns: projections, names }
}

/// Rows in final order; each row's properties are read from the store when it is reached.
pub struct QueryResults<'r> {
    rows: Vec<IndexRow>,
    pos: usize,
    total: usize,
    plan: Plan,
    resolver: &'r dyn super::ObjectResolver,
}

impl<'r> QueryResults<'r> {
    pub(crate) fn new(rows: Vec<IndexRow>, total: usize, plan: Plan, resolver: &'r dyn ObjectResolver) -> Self {
        Self { rows, pos: 0, total, plan, resolver }
    }

    /// Matching rows before offset and limit were applied.
    pub fn size(&self) -> usize { self.total }

    pub fn position(&self) -> usize { self.pos }

    pub fn remaining(&self) -> usize { self.rows.len() - self.pos }

    /// Consumes `n` rows without materializing them. Fails, moving nothing, when fewer remain.
    pub fn skip_rows(&mut self, n: usize) -> RepoResult<()> {
        if n > self.remaining() {
            return Err(RepoError::invalid(format!("Unable to skip {} rows, only {} remain", n, self.remaining())));
        }
        self.pos += n;
        Ok(())
    }

    fn materialize(&self, row: &IndexRow) -> QueryResult {
        let stored = self.resolver.properties(&row.node_id).unwrap_or_default();
        let mut properties = BTreeMap::new();
        let mut score = None;
        for c in &self.plan.columns {
            match c {
                Projection::All(ids) => {
                    for id in ids {
                        if let Some(v) = stored.get(id) { properties.insert(id.clone(), v.clone()); }
                    }
                }
                Projection::Property { property, column_name } => {
                    if let Some(v) = stored.get(property) { properties.insert(column_name.clone(), v.clone()); }
                }
                Projection::Score { column_name } => {
                    score = Some(Score { column_name: column_name.clone(), value: row.score as f64 });
                }
            }
        }
        QueryResult { object_id: row.node_id.clone(), properties, property_names: self.plan.names.clone(), score }
    }
}

impl Iterator for QueryResults<'_> {
    type Item = QueryResult;

    fn next(&mut self) -> Option<QueryResult> {
        let row = self.rows.get(self.pos)?;
        let out = self.materialize(row);
        self.pos += 1;
        Some(out)
    }

    fn size_hint(&self) -> (usize, Option<usize>) { (self.remaining(), Some(self.remaining())) }
}
