use crate::error::RepoResult;
use crate::query::query_common::*;
use crate::query::query_lexer::{Cursor, TKind};
use crate::query::query_parse_where::{parse_constraint, parse_dynamic_operand};

// Words that end a table reference or column and therefore never act as an implicit alias
const RESERVED: &[&str] = &[
    "SELECT", "FROM", "WHERE", "ORDER", "BY", "AS", "JOIN", "INNER", "LEFT", "RIGHT", "OUTER", "ON",
    "AND", "OR", "NOT", "IN", "LIKE", "IS", "NULL", "ASC", "DESC", "ANY",
];

pub(crate) fn is_reserved(word: &str) -> bool { RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word)) }

/// Splits `sel.name` at the first dot.
pub(crate) fn split_qualified(ident: &str) -> (Option<&str>, &str) {
    match ident.split_once('.') {
        Some((sel, name)) if !sel.is_empty() => (Some(sel), name),
        _ => (None, ident),
    }
}

/// Syntactic parse of a SELECT statement. Names are left as written; selector fields of
/// unqualified references stay empty until resolution.
pub fn parse_select(statement: &str) -> RepoResult<Query> {
    let mut c = Cursor::new(statement)?;
    c.expect_kw("SELECT")?;
    let columns = parse_columns(&mut c)?;
    c.expect_kw("FROM")?;
    let source = parse_source(&mut c)?;
    let constraint = if c.eat_kw("WHERE") { Some(parse_constraint(&mut c)?) } else { None };
    let mut orderings = Vec::new();
    if c.eat_kw("ORDER") {
        c.expect_kw("BY")?;
        loop {
            orderings.push(parse_ordering(&mut c)?);
            if !c.eat(&TKind::Comma) { break; }
        }
    }
    c.eat(&TKind::Semicolon);
    if !c.at_end() { return Err(c.err("unexpected token")); }
    Ok(Query { source, columns, constraint, orderings, statement: statement.to_string() })
}

fn parse_columns(c: &mut Cursor<'_>) -> RepoResult<Vec<Column>> {
    let mut cols = Vec::new();
    loop {
        cols.push(parse_column(c)?);
        if !c.eat(&TKind::Comma) { break; }
    }
    Ok(cols)
}

fn parse_alias(c: &mut Cursor<'_>) -> RepoResult<Option<String>> {
    if c.eat_kw("AS") {
        return match c.next().map(|t| t.kind) {
            Some(TKind::Ident(a)) if !a.contains('.') => Ok(Some(a)),
            _ => Err(c.err("expected alias after AS")),
        };
    }
    if let Some(TKind::Ident(a)) = c.peek_kind() {
        if !is_reserved(a) && !a.contains('.') {
            let a = a.clone();
            c.next();
            return Ok(Some(a));
        }
    }
    Ok(None)
}

fn parse_column(c: &mut Cursor<'_>) -> RepoResult<Column> {
    if c.eat(&TKind::Star) { return Ok(Column::AllProperties { selector: None }); }
    if c.is_kw("SCORE") && c.peek_at(1).map(|t| t.kind == TKind::LParen).unwrap_or(false) {
        c.next();
        c.expect(&TKind::LParen, "'('")?;
        c.expect(&TKind::RParen, "')'")?;
        let alias = parse_alias(c)?;
        return Ok(Column::Score { selector: String::new(), column_name: alias.unwrap_or_else(|| "SEARCH_SCORE".to_string()) });
    }
    match c.peek_kind().cloned() {
        Some(TKind::Ident(name)) if !is_reserved(&name) => {
            c.next();
            if let Some(sel) = name.strip_suffix(".*") {
                return Ok(Column::AllProperties { selector: Some(sel.to_string()) });
            }
            let (sel, prop) = split_qualified(&name);
            let (sel, prop) = (sel.unwrap_or("").to_string(), prop.to_string());
            let alias = parse_alias(c)?;
            Ok(Column::Property { column_name: alias.unwrap_or_else(|| prop.clone()), selector: sel, property: prop })
        }
        _ => Err(c.err("expected column")),
    }
}

fn parse_table_ref(c: &mut Cursor<'_>) -> RepoResult<Selector> {
    match c.peek_kind().cloned() {
        Some(TKind::Ident(name)) if !is_reserved(&name) => {
            c.next();
            let alias = parse_alias(c)?;
            Ok(Selector { name: alias.unwrap_or_else(|| name.clone()), node_type: name })
        }
        _ => Err(c.err("expected table name")),
    }
}

fn parse_source(c: &mut Cursor<'_>) -> RepoResult<Source> {
    let mut source = Source::Selector(parse_table_ref(c)?);
    loop {
        if c.peek_kind() == Some(&TKind::Comma) {
            return Err(c.err("multiple selectors require an explicit JOIN ... ON condition"));
        }
        let join_type = if c.eat_kw("JOIN") {
            JoinType::Inner
        } else if c.is_kw("INNER") {
            c.next();
            c.expect_kw("JOIN")?;
            JoinType::Inner
        } else if c.is_kw("LEFT") || c.is_kw("RIGHT") {
            let left = c.eat_kw("LEFT");
            if !left { c.next(); }
            c.eat_kw("OUTER");
            c.expect_kw("JOIN")?;
            if left { JoinType::LeftOuter } else { JoinType::RightOuter }
        } else {
            break;
        };
        let right = parse_table_ref(c)?;
        c.expect_kw("ON")?;
        let (selector1, property1) = parse_join_side(c)?;
        c.expect(&TKind::Eq, "'=' in join condition")?;
        let (selector2, property2) = parse_join_side(c)?;
        source = Source::Join(Box::new(Join {
            left: source,
            right: Source::Selector(right),
            join_type,
            condition: JoinCondition::Equi { selector1, property1, selector2, property2 },
        }));
    }
    Ok(source)
}

fn parse_join_side(c: &mut Cursor<'_>) -> RepoResult<(String, String)> {
    match c.peek_kind().cloned() {
        Some(TKind::Ident(name)) => {
            let (sel, prop) = split_qualified(&name);
            let Some(sel) = sel else { return Err(c.err("join condition columns must be qualified with a selector")); };
            let out = (sel.to_string(), prop.to_string());
            c.next();
            Ok(out)
        }
        _ => Err(c.err("expected qualified column in join condition")),
    }
}

fn parse_ordering(c: &mut Cursor<'_>) -> RepoResult<Ordering> {
    let operand = parse_dynamic_operand(c)?;
    // relevance ordering reads most relevant first unless told otherwise
    let default = match operand { DynamicOperand::FullTextSearchScore { .. } => Order::Descending, _ => Order::Ascending };
    let order = if c.eat_kw("ASC") { Order::Ascending } else if c.eat_kw("DESC") { Order::Descending } else { default };
    Ok(Ordering { operand, order })
}
