//! Constraint tree to native index constraint.

use std::collections::BTreeSet;

use crate::error::{RepoError, RepoResult};
use crate::index::{tokenize, Bound, FullTextExpr, FullTextTerm, NativeConstraint, WildcardToken, PARENT_FIELD};
use crate::query::{Constraint, DynamicOperand, Literal, Operator, StaticOperand};
use crate::types::props;
use crate::value::Scalar;
use super::ObjectResolver;

pub fn type_filter(type_ids: &[String]) -> NativeConstraint {
    NativeConstraint::Or(type_ids.iter()
        .map(|t| NativeConstraint::Term { field: props::OBJECT_TYPE_ID.to_string(), value: Scalar::Text(t.clone()) })
        .collect())
}

/// Objects without version flags (folders, policies) pass as well.
pub fn latest_version_filter() -> NativeConstraint {
    NativeConstraint::Or(vec![
        NativeConstraint::Not(Box::new(NativeConstraint::Exists { field: props::IS_LATEST_VERSION.to_string() })),
        NativeConstraint::Term { field: props::IS_LATEST_VERSION.to_string(), value: Scalar::Bool(true) },
    ])
}

pub fn literal_scalar(lit: &Literal) -> Scalar {
    match lit {
        Literal::String(s) => Scalar::Text(s.clone()),
        Literal::Decimal(d) => Scalar::Number(*d),
        Literal::Integer(i) => Scalar::Integer(*i),
        Literal::Boolean(b) => Scalar::Bool(*b),
        Literal::DateTime(t) => Scalar::Time(t.timestamp_millis()),
    }
}

fn field_of(operand: &DynamicOperand) -> RepoResult<&str> {
    match operand {
        DynamicOperand::PropertyValue { property, .. } => Ok(property),
        DynamicOperand::FullTextSearchScore { .. } => Err(RepoError::invalid("SCORE() cannot be used as a constraint operand")),
    }
}

fn static_scalar(v: &StaticOperand) -> RepoResult<Scalar> {
    match v {
        StaticOperand::Literal(l) => Ok(literal_scalar(l)),
        StaticOperand::BindVariable(name) => Err(RepoError::invalid(format!("Bind variable {} has no value", name))),
    }
}

fn exists(field: &str) -> NativeConstraint { NativeConstraint::Exists { field: field.to_string() } }

/// Negation restricted to objects that carry the property at all.
fn not_present(field: &str, c: NativeConstraint) -> NativeConstraint {
    NativeConstraint::And(vec![exists(field), NativeConstraint::Not(Box::new(c))])
}

fn terms(field: &str, values: &[StaticOperand]) -> RepoResult<NativeConstraint> {
    Ok(NativeConstraint::Or(values.iter()
        .map(|v| Ok(NativeConstraint::Term { field: field.to_string(), value: static_scalar(v)? }))
        .collect::<RepoResult<_>>()?))
}

pub fn translate(c: &Constraint, resolver: &dyn ObjectResolver) -> RepoResult<NativeConstraint> {
    Ok(match c {
        Constraint::And(a, b) => NativeConstraint::And(vec![translate(a, resolver)?, translate(b, resolver)?]),
        Constraint::Or(a, b) => NativeConstraint::Or(vec![translate(a, resolver)?, translate(b, resolver)?]),
        Constraint::Not(inner) => match inner.as_ref() {
            Constraint::Comparison { operand, .. } | Constraint::Like { operand, .. } => not_present(field_of(operand)?, translate(inner, resolver)?),
            other => NativeConstraint::Not(Box::new(translate(other, resolver)?)),
        },
        Constraint::Comparison { operand, op, value } => {
            let field = field_of(operand)?.to_string();
            let value = static_scalar(value)?;
            let term = NativeConstraint::Term { field: field.clone(), value: value.clone() };
            let bound = |inclusive| Some(Bound { value, inclusive });
            match op {
                Operator::Eq => term,
                Operator::Ne => not_present(&field, term),
                Operator::Lt => NativeConstraint::Range { field, lower: None, upper: bound(false) },
                Operator::Le => NativeConstraint::Range { field, lower: None, upper: bound(true) },
                Operator::Gt => NativeConstraint::Range { field, lower: bound(false), upper: None },
                Operator::Ge => NativeConstraint::Range { field, lower: bound(true), upper: None },
            }
        }
        Constraint::In { operand, values } => terms(field_of(operand)?, values)?,
        Constraint::NotIn { operand, values } => {
            let field = field_of(operand)?;
            not_present(field, terms(field, values)?)
        }
        Constraint::Like { operand, pattern } => NativeConstraint::Wildcard {
            field: field_of(operand)?.to_string(),
            pattern: like_pattern(pattern),
        },
        Constraint::IsNull { operand } => NativeConstraint::Not(Box::new(exists(field_of(operand)?))),
        Constraint::IsNotNull { operand } => exists(field_of(operand)?),
        Constraint::FullTextSearch { expression, .. } => NativeConstraint::FullText(fulltext(expression)?),
        Constraint::SameNode { path, .. } => {
            NativeConstraint::Ids(BTreeSet::from([resolver.resolve_object(path)?]))
        }
        Constraint::ChildNode { folder, .. } => NativeConstraint::Term {
            field: PARENT_FIELD.to_string(),
            value: Scalar::Text(resolver.resolve_folder(folder)?),
        },
        Constraint::DescendantNode { folder, .. } => NativeConstraint::Ids(resolver.descendant_ids(folder)?),
    })
}

/// `%` and `_` become wildcards; `\` makes the next character literal.
pub fn like_pattern(pattern: &str) -> Vec<WildcardToken> {
    let mut out = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        let token = match ch {
            '\\' => { literal.push(chars.next().unwrap_or('\\')); continue; }
            '%' => WildcardToken::AnyString,
            '_' => WildcardToken::AnyChar,
            c => { literal.push(c); continue; }
        };
        if !literal.is_empty() { out.push(WildcardToken::Literal(std::mem::take(&mut literal))); }
        out.push(token);
    }
    if !literal.is_empty() { out.push(WildcardToken::Literal(literal)); }
    out
}

/// Parses a CONTAINS expression: whitespace is AND, `OR` separates alternatives,
/// a leading `-` negates a term, quotes group a phrase.
pub fn fulltext(expression: &str) -> RepoResult<FullTextExpr> {
    let mut clauses: Vec<Vec<FullTextTerm>> = vec![Vec::new()];
    let mut chars = expression.chars().peekable();
    loop {
        while chars.peek().map(|c| c.is_whitespace()).unwrap_or(false) { chars.next(); }
        let Some(&first) = chars.peek() else { break };
        let negated = first == '-';
        if negated { chars.next(); }
        let raw: String = match chars.peek() {
            Some(&q) if q == '"' || q == '\'' => {
                chars.next();
                let phrase: String = chars.by_ref().take_while(|c| *c != q).collect();
                phrase
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() { break; }
                    word.push(c);
                    chars.next();
                }
                if !negated && word == "OR" {
                    clauses.push(Vec::new());
                    continue;
                }
                word
            }
        };
        let words = tokenize(&raw);
        if words.is_empty() { continue; }
        if let Some(clause) = clauses.last_mut() { clause.push(FullTextTerm { words, negated }); }
    }
    if clauses.iter().any(|c| c.is_empty() || c.iter().all(|t| t.negated)) {
        return Err(RepoError::invalid(format!("Full-text expression '{}' has an empty or purely negative alternative", expression)));
    }
    Ok(FullTextExpr { clauses })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_escapes_make_metacharacters_literal() {
        assert_eq!(like_pattern(r"ad\%min%"), vec![WildcardToken::Literal("ad%min".into()), WildcardToken::AnyString]);
        assert_eq!(like_pattern("_x"), vec![WildcardToken::AnyChar, WildcardToken::Literal("x".into())]);
        assert_eq!(like_pattern(r"a\\b"), vec![WildcardToken::Literal(r"a\b".into())]);
    }

    #[test]
    fn fulltext_and_or_not_phrases() {
        let e = fulltext("moon -earth OR \"lunar module\"").unwrap();
        assert_eq!(e.clauses.len(), 2);
        assert_eq!(e.clauses[0], vec![
            FullTextTerm { words: vec!["moon".into()], negated: false },
            FullTextTerm { words: vec!["earth".into()], negated: true },
        ]);
        assert_eq!(e.clauses[1], vec![FullTextTerm { words: vec!["lunar".into(), "module".into()], negated: false }]);
    }

    #[test]
    fn fulltext_rejects_empty_alternatives() {
        assert!(fulltext("moon OR").is_err());
        assert!(fulltext("-earth").is_err());
        assert!(fulltext("  ").is_err());
    }
}
