//! Query executor: runs a compiled [`Query`] against a [`SearchIndex`], resolving
//! hierarchy constraints and sort keys through an [`ObjectResolver`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RepoError, RepoResult};
use crate::index::{NativeConstraint, NativeQuery, SearchIndex};
use crate::query::query_resolve::coerce_literal;
use crate::query::{Constraint, DynamicOperand, Literal, Query, Source, StaticOperand};
use crate::types::{PropertyDefinition, TypeDefinition, TypeRegistry};
use crate::value::Value;

pub mod exec_results;
pub mod exec_sort;
pub mod exec_translate;

pub use exec_results::{QueryResult, QueryResults, Score};

/// Read access to the object store needed while executing a query.
pub trait ObjectResolver {
    /// Path through the first parent; `None` for unfiled objects.
    fn path_of(&self, id: &str) -> Option<String>;
    fn resolve_folder(&self, id_or_path: &str) -> RepoResult<String>;
    fn resolve_object(&self, id_or_path: &str) -> RepoResult<String>;
    /// Ids of every object below the folder.
    fn descendant_ids(&self, folder: &str) -> RepoResult<BTreeSet<String>>;
    fn property_value(&self, id: &str, property: &str) -> Option<Value>;
    fn properties(&self, id: &str) -> Option<BTreeMap<String, Value>>;
}

/// Which properties a result or snapshot carries: `*`, or listed ids / query names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyFilter {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl PropertyFilter {
    pub fn parse(spec: &str) -> Self {
        let names: BTreeSet<String> = spec.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()).map(|s| s.to_string()).collect();
        if names.is_empty() || names.contains("*") { PropertyFilter::All } else { PropertyFilter::Only(names) }
    }

    pub fn allows(&self, def: &PropertyDefinition) -> bool {
        match self {
            PropertyFilter::All => true,
            PropertyFilter::Only(names) => names.contains(&def.id) || names.contains(&def.query_name),
        }
    }

    pub fn allows_id(&self, id: &str) -> bool {
        match self {
            PropertyFilter::All => true,
            PropertyFilter::Only(names) => names.contains(id),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub limit: Option<usize>,
    pub offset: usize,
    pub property_filter: PropertyFilter,
    /// Values for `$name` and positional (`"1"`, `"2"`, ...) bind variables
    pub variables: HashMap<String, Literal>,
    pub search_all_versions: bool,
}

impl QueryOptions {
    pub fn limit(mut self, n: usize) -> Self { self.limit = Some(n); self }
    pub fn offset(mut self, n: usize) -> Self { self.offset = n; self }
    pub fn filter(mut self, f: PropertyFilter) -> Self { self.property_filter = f; self }
    pub fn bind<S: Into<String>>(mut self, name: S, value: Literal) -> Self { self.variables.insert(name.into(), value); self }
    pub fn all_versions(mut self, v: bool) -> Self { self.search_all_versions = v; self }
}

pub fn execute<'r>(
    query: &Query,
    types: &TypeRegistry,
    index: &dyn SearchIndex,
    resolver: &'r dyn ObjectResolver,
    options: &QueryOptions,
) -> RepoResult<QueryResults<'r>> {
    let Source::Selector(selector) = &query.source else {
        return Err(RepoError::invalid("Queries with joins are not supported by this repository"));
    };
    let t = types.definition(&selector.node_type)
        .ok_or_else(|| RepoError::not_found(format!("Type {} does not exist", selector.node_type)))?;

    let mut clauses = vec![exec_translate::type_filter(&types.query_type_ids(&t.id))];
    if !options.search_all_versions {
        clauses.push(exec_translate::latest_version_filter());
    }
    if let Some(c) = &query.constraint {
        let bound = bind_variables(c, t, &options.variables)?;
        clauses.push(exec_translate::translate(&bound, resolver)?);
    }
    let native = NativeQuery { constraint: NativeConstraint::And(clauses) };
    let rows = index.search(&native)?;
    let rows = exec_sort::sort_rows(rows, &query.orderings, resolver);
    let total = rows.len();
    let rows: Vec<_> = rows.into_iter().skip(options.offset).take(options.limit.unwrap_or(usize::MAX)).collect();
    debug!(target: "folio::query", "{} rows matched, {} returned: {}", total, rows.len(), query.statement);
    Ok(QueryResults::new(rows, total, exec_results::plan(&query.columns, t, &options.property_filter), resolver))
}

/// Replaces bind variables with literals fitted to the compared property.
fn bind_variables(c: &Constraint, t: &TypeDefinition, vars: &HashMap<String, Literal>) -> RepoResult<Constraint> {
    let bind = |operand: &DynamicOperand, v: &StaticOperand| -> RepoResult<StaticOperand> {
        let StaticOperand::BindVariable(name) = v else { return Ok(v.clone()) };
        let lit = vars.get(name)
            .ok_or_else(|| RepoError::invalid(format!("Bind variable {} has no value", name)))?;
        let coerced = match operand {
            DynamicOperand::PropertyValue { property, .. } => match t.property(property) {
                Some(def) => coerce_literal(lit.clone(), def).map_err(RepoError::invalid)?,
                None => lit.clone(),
            },
            DynamicOperand::FullTextSearchScore { .. } => lit.clone(),
        };
        Ok(StaticOperand::Literal(coerced))
    };
    Ok(match c {
        Constraint::And(a, b) => Constraint::And(Box::new(bind_variables(a, t, vars)?), Box::new(bind_variables(b, t, vars)?)),
        Constraint::Or(a, b) => Constraint::Or(Box::new(bind_variables(a, t, vars)?), Box::new(bind_variables(b, t, vars)?)),
        Constraint::Not(a) => Constraint::Not(Box::new(bind_variables(a, t, vars)?)),
        Constraint::Comparison { operand, op, value } => Constraint::Comparison { operand: operand.clone(), op: *op, value: bind(operand, value)? },
        Constraint::In { operand, values } => Constraint::In {
            operand: operand.clone(),
            values: values.iter().map(|v| bind(operand, v)).collect::<RepoResult<_>>()?,
        },
        Constraint::NotIn { operand, values } => Constraint::NotIn {
            operand: operand.clone(),
            values: values.iter().map(|v| bind(operand, v)).collect::<RepoResult<_>>()?,
        },
        other => other.clone(),
    })
}
