use crate::error::{RepoError, RepoResult};
use crate::query::query_common::*;
use crate::query::query_parse_where::parse_timestamp;
use crate::types::{PropertyDefinition, TypeDefinition, TypeRegistry};
use crate::value::PropertyType;

struct Scope<'t> {
    statement: &'t str,
    selectors: Vec<(String, &'t TypeDefinition)>,
}

impl<'t> Scope<'t> {
    fn fail(&self, msg: String, near: &str) -> RepoError {
        let position = if near.is_empty() { None } else { self.statement.find(near) };
        RepoError::query(msg, position)
    }

    fn selector(&self, name: &str) -> RepoResult<(&str, &'t TypeDefinition)> {
        if name.is_empty() {
            return match self.selectors.as_slice() {
                [(n, t)] => Ok((n.as_str(), *t)),
                _ => Err(self.fail("A selector qualifier is required when the query has more than one selector".into(), "")),
            };
        }
        self.selectors.iter().find(|(n, _)| n == name).map(|(n, t)| (n.as_str(), *t))
            .ok_or_else(|| self.fail(format!("Selector {} is not defined", name), name))
    }

    /// Resolves a property reference as written to (selector name, property definition).
    fn property(&self, selector: &str, name: &str) -> RepoResult<(String, &'t PropertyDefinition)> {
        if !selector.is_empty() {
            let (sel, t) = self.selector(selector)?;
            let p = t.property_by_query_name(name)
                .ok_or_else(|| self.fail(format!("Column {} does not exist on table {}", name, t.query_name), name))?;
            return Ok((sel.to_string(), p));
        }
        let hits: Vec<(&String, &'t PropertyDefinition)> = self.selectors.iter()
            .filter_map(|(n, t)| t.property_by_query_name(name).map(|p| (n, p)))
            .collect();
        match hits.as_slice() {
            [(n, p)] => Ok(((*n).clone(), *p)),
            [] => {
                let tables: Vec<&str> = self.selectors.iter().map(|(_, t)| t.query_name.as_str()).collect();
                Err(self.fail(format!("Column {} does not exist on table {}", name, tables.join(", ")), name))
            }
            _ => Err(self.fail(format!("Column {} is ambiguous; qualify it with a selector", name), name)),
        }
    }
}

/// Binds names of a parsed query to the registry: type query names become type ids,
/// property names become property ids, every operand gets its selector. The result is normalized.
pub fn resolve(query: Query, types: &TypeRegistry) -> RepoResult<Query> {
    let Query { source, columns, constraint, orderings, statement } = query;
    let mut scope = Scope { statement: &statement, selectors: Vec::new() };
    let source = resolve_source(source, types, &mut scope)?;

    let columns = columns.into_iter().map(|c| resolve_column(c, &scope)).collect::<RepoResult<Vec<_>>>()?;
    let constraint = match constraint {
        Some(c) => Some(normalize(resolve_constraint(c, &scope)?)),
        None => None,
    };
    let orderings = orderings.into_iter().map(|o| resolve_ordering(o, &scope)).collect::<RepoResult<Vec<_>>>()?;
    drop(scope);
    Ok(Query { source, columns, constraint, orderings, statement })
}

fn resolve_source<'t>(source: Source, types: &'t TypeRegistry, scope: &mut Scope<'t>) -> RepoResult<Source> {
    match source {
        Source::Selector(sel) => {
            let t = types.by_query_name(&sel.node_type)
                .ok_or_else(|| scope.fail(format!("Table {} does not exist", sel.node_type), &sel.node_type))?;
            if !t.queryable {
                return Err(scope.fail(format!("Table {} is not queryable", sel.node_type), &sel.node_type));
            }
            if scope.selectors.iter().any(|(n, _)| *n == sel.name) {
                return Err(scope.fail(format!("Selector {} is defined more than once", sel.name), &sel.name));
            }
            scope.selectors.push((sel.name.clone(), t));
            Ok(Source::Selector(Selector { node_type: t.id.clone(), name: sel.name }))
        }
        Source::Join(j) => {
            let Join { left, right, join_type, condition } = *j;
            let left = resolve_source(left, types, scope)?;
            let right = resolve_source(right, types, scope)?;
            let JoinCondition::Equi { selector1, property1, selector2, property2 } = condition;
            let (s1, p1) = scope.property(&selector1, &property1)?;
            let (s2, p2) = scope.property(&selector2, &property2)?;
            let condition = JoinCondition::Equi { selector1: s1, property1: p1.id.clone(), selector2: s2, property2: p2.id.clone() };
            Ok(Source::Join(Box::new(Join { left, right, join_type, condition })))
        }
    }
}

fn resolve_column(col: Column, scope: &Scope<'_>) -> RepoResult<Column> {
    match col {
        Column::AllProperties { selector: Some(s) } => {
            let (name, _) = scope.selector(&s)?;
            Ok(Column::AllProperties { selector: Some(name.to_string()) })
        }
        Column::AllProperties { selector: None } => Ok(Column::AllProperties { selector: None }),
        Column::Property { selector, property, column_name } => {
            let (sel, p) = scope.property(&selector, &property)?;
            Ok(Column::Property { selector: sel, property: p.id.clone(), column_name })
        }
        Column::Score { selector, column_name } => {
            let (sel, _) = scope.selector(&selector)?;
            Ok(Column::Score { selector: sel.to_string(), column_name })
        }
    }
}

fn resolve_ordering(o: Ordering, scope: &Scope<'_>) -> RepoResult<Ordering> {
    let operand = match o.operand {
        DynamicOperand::PropertyValue { selector, property } => {
            let (sel, p) = scope.property(&selector, &property)?;
            if !p.orderable {
                return Err(scope.fail(format!("Column {} is not orderable", property), &property));
            }
            DynamicOperand::PropertyValue { selector: sel, property: p.id.clone() }
        }
        DynamicOperand::FullTextSearchScore { selector } => {
            let (sel, _) = scope.selector(&selector)?;
            DynamicOperand::FullTextSearchScore { selector: sel.to_string() }
        }
    };
    Ok(Ordering { operand, order: o.order })
}

/// Property operand usable in WHERE, with its definition.
fn where_operand<'t>(operand: DynamicOperand, scope: &Scope<'t>) -> RepoResult<(DynamicOperand, &'t PropertyDefinition)> {
    match operand {
        DynamicOperand::PropertyValue { selector, property } => {
            let (sel, p) = scope.property(&selector, &property)?;
            if !p.queryable {
                return Err(scope.fail(format!("Column {} is not queryable", property), &property));
            }
            Ok((DynamicOperand::PropertyValue { selector: sel, property: p.id.clone() }, p))
        }
        DynamicOperand::FullTextSearchScore { .. } => Err(scope.fail("SCORE() cannot be used in WHERE".into(), "SCORE")),
    }
}

fn resolve_constraint(c: Constraint, scope: &Scope<'_>) -> RepoResult<Constraint> {
    Ok(match c {
        Constraint::And(a, b) => Constraint::And(Box::new(resolve_constraint(*a, scope)?), Box::new(resolve_constraint(*b, scope)?)),
        Constraint::Or(a, b) => Constraint::Or(Box::new(resolve_constraint(*a, scope)?), Box::new(resolve_constraint(*b, scope)?)),
        Constraint::Not(a) => Constraint::Not(Box::new(resolve_constraint(*a, scope)?)),
        Constraint::Comparison { operand, op, value } => {
            let (operand, p) = where_operand(operand, scope)?;
            if matches!(p.property_type(), PropertyType::Boolean) && !matches!(op, Operator::Eq | Operator::Ne) {
                return Err(scope.fail(format!("Operator {} is not supported for boolean column {}", op.as_str(), p.query_name), &p.query_name));
            }
            Constraint::Comparison { operand, op, value: check_static(value, p, scope)? }
        }
        Constraint::In { operand, values } => {
            let (operand, p) = where_operand(operand, scope)?;
            Constraint::In { operand, values: values.into_iter().map(|v| check_static(v, p, scope)).collect::<RepoResult<_>>()? }
        }
        Constraint::NotIn { operand, values } => {
            let (operand, p) = where_operand(operand, scope)?;
            Constraint::NotIn { operand, values: values.into_iter().map(|v| check_static(v, p, scope)).collect::<RepoResult<_>>()? }
        }
        Constraint::Like { operand, pattern } => {
            let (operand, p) = where_operand(operand, scope)?;
            if !p.property_type().is_textual() {
                return Err(scope.fail(format!("LIKE requires a string column, {} is {}", p.query_name, p.property_type().as_str()), &p.query_name));
            }
            Constraint::Like { operand, pattern }
        }
        Constraint::IsNull { operand } => Constraint::IsNull { operand: where_operand(operand, scope)?.0 },
        Constraint::IsNotNull { operand } => Constraint::IsNotNull { operand: where_operand(operand, scope)?.0 },
        Constraint::FullTextSearch { selector, expression } => {
            let (sel, t) = scope.selector(&selector)?;
            if !t.fulltext_indexed {
                return Err(scope.fail(format!("Table {} is not full-text indexed", t.query_name), "CONTAINS"));
            }
            if expression.trim().is_empty() {
                return Err(scope.fail("CONTAINS requires a non-empty search expression".into(), "CONTAINS"));
            }
            Constraint::FullTextSearch { selector: sel.to_string(), expression }
        }
        Constraint::SameNode { selector, path } => Constraint::SameNode { selector: scope.selector(&selector)?.0.to_string(), path },
        Constraint::ChildNode { selector, folder } => Constraint::ChildNode { selector: scope.selector(&selector)?.0.to_string(), folder },
        Constraint::DescendantNode { selector, folder } => Constraint::DescendantNode { selector: scope.selector(&selector)?.0.to_string(), folder },
    })
}

fn check_static(v: StaticOperand, p: &PropertyDefinition, scope: &Scope<'_>) -> RepoResult<StaticOperand> {
    match v {
        StaticOperand::BindVariable(_) => Ok(v),
        StaticOperand::Literal(lit) => coerce_literal(lit, p)
            .map(StaticOperand::Literal)
            .map_err(|m| scope.fail(m, &p.query_name)),
    }
}

/// Fits a literal to the property type, widening integers for decimal columns.
pub fn coerce_literal(lit: Literal, p: &PropertyDefinition) -> Result<Literal, String> {
    let ty = p.property_type();
    match (ty, lit) {
        (t, Literal::String(s)) if t.is_textual() => Ok(Literal::String(s)),
        (PropertyType::Integer, Literal::Integer(i)) => Ok(Literal::Integer(i)),
        (PropertyType::Decimal, Literal::Integer(i)) => Ok(Literal::Decimal(i as f64)),
        (PropertyType::Decimal, Literal::Decimal(d)) => Ok(Literal::Decimal(d)),
        (PropertyType::Boolean, Literal::Boolean(b)) => Ok(Literal::Boolean(b)),
        (PropertyType::DateTime, Literal::DateTime(d)) => Ok(Literal::DateTime(d)),
        (PropertyType::DateTime, Literal::String(s)) => parse_timestamp(&s)
            .map(Literal::DateTime)
            .ok_or_else(|| format!("'{}' is not a valid timestamp for column {}", s, p.query_name)),
        (t, lit) => Err(format!("Literal of type {} is not compatible with column {} of type {}", lit.kind_name(), p.query_name, t.as_str())),
    }
}

/// Pushes negations into IN and IS NULL and removes double negation.
pub fn normalize(c: Constraint) -> Constraint {
    match c {
        Constraint::Not(inner) => match *inner {
            Constraint::Not(x) => normalize(*x),
            Constraint::In { operand, values } => Constraint::NotIn { operand, values },
            Constraint::NotIn { operand, values } => Constraint::In { operand, values },
            Constraint::IsNull { operand } => Constraint::IsNotNull { operand },
            Constraint::IsNotNull { operand } => Constraint::IsNull { operand },
            other => Constraint::Not(Box::new(normalize(other))),
        },
        Constraint::And(a, b) => Constraint::And(Box::new(normalize(*a)), Box::new(normalize(*b))),
        Constraint::Or(a, b) => Constraint::Or(Box::new(normalize(*a)), Box::new(normalize(*b))),
        other => other,
    }
}
