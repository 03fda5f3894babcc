//! Result ordering. Sorts are stable, so equal keys keep the index's native row order.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;

use crate::index::IndexRow;
use crate::query::{DynamicOperand, Order, Ordering};
use crate::value::Scalar;
use super::ObjectResolver;

/// Missing keys sort before present ones.
fn cmp_keys(a: &Option<Scalar>, b: &Option<Scalar>) -> CmpOrdering {
    match (a, b) {
        (None, None) => CmpOrdering::Equal,
        (None, Some(_)) => CmpOrdering::Less,
        (Some(_), None) => CmpOrdering::Greater,
        (Some(x), Some(y)) => x.total_cmp(y),
    }
}

pub fn sort_rows(rows: Vec<IndexRow>, orderings: &[Ordering], resolver: &dyn ObjectResolver) -> Vec<IndexRow> {
    if orderings.is_empty() { return sort_by_path(rows, resolver); }
    let mut keyed: Vec<(Vec<Option<Scalar>>, IndexRow)> = rows.into_iter()
        .map(|row| {
            let keys = orderings.iter().map(|o| match &o.operand {
                DynamicOperand::PropertyValue { property, .. } => resolver.property_value(&row.node_id, property).and_then(|v| v.first_scalar()),
                DynamicOperand::FullTextSearchScore { .. } => Some(Scalar::Number(row.score as f64)),
            }).collect();
            (keys, row)
        })
        .collect();
    keyed.sort_by(|(a, _), (b, _)| {
        for (i, o) in orderings.iter().enumerate() {
            let ord = cmp_keys(&a[i], &b[i]);
            let ord = if o.order == Order::Descending { ord.reverse() } else { ord };
            if ord != CmpOrdering::Equal { return ord; }
        }
        CmpOrdering::Equal
    });
    keyed.into_iter().map(|(_, row)| row).collect()
}

/// Ascending path; unfiled objects go last.
fn sort_by_path(rows: Vec<IndexRow>, resolver: &dyn ObjectResolver) -> Vec<IndexRow> {
    let mut cache: HashMap<String, Option<String>> = HashMap::new();
    let mut keyed: Vec<(Option<String>, IndexRow)> = rows.into_iter()
        .map(|row| {
            let path = cache.entry(row.node_id.clone()).or_insert_with(|| resolver.path_of(&row.node_id)).clone();
            (path, row)
        })
        .collect();
    keyed.sort_by(|(a, _), (b, _)| match (a, b) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => CmpOrdering::Less,
        (None, Some(_)) => CmpOrdering::Greater,
        (None, None) => CmpOrdering::Equal,
    });
    keyed.into_iter().map(|(_, row)| row).collect()
}
