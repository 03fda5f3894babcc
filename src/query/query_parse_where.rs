use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::RepoResult;
use crate::query::query_common::*;
use crate::query::query_lexer::{syntax_error, Cursor, TKind};
use crate::query::query_parse_select::{is_reserved, split_qualified};

// constraint := and_expr { OR and_expr }
pub fn parse_constraint(c: &mut Cursor<'_>) -> RepoResult<Constraint> {
    let mut left = parse_and(c)?;
    while c.eat_kw("OR") {
        let right = parse_and(c)?;
        left = Constraint::Or(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_and(c: &mut Cursor<'_>) -> RepoResult<Constraint> {
    let mut left = parse_not(c)?;
    while c.eat_kw("AND") {
        let right = parse_not(c)?;
        left = Constraint::And(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_not(c: &mut Cursor<'_>) -> RepoResult<Constraint> {
    if c.eat_kw("NOT") {
        return Ok(Constraint::Not(Box::new(parse_not(c)?)));
    }
    parse_primary(c)
}

fn is_call(c: &Cursor<'_>, name: &str) -> bool {
    c.is_kw(name) && c.peek_at(1).map(|t| t.kind == TKind::LParen).unwrap_or(false)
}

fn parse_primary(c: &mut Cursor<'_>) -> RepoResult<Constraint> {
    if c.eat(&TKind::LParen) {
        let inner = parse_constraint(c)?;
        c.expect(&TKind::RParen, "')'")?;
        return Ok(inner);
    }
    if is_call(c, "CONTAINS") {
        c.next();
        c.next();
        let selector = parse_call_qualifier(c)?;
        let expression = match c.next().map(|t| t.kind) {
            Some(TKind::Str(s)) => unescape(&s),
            Some(TKind::DStr(s)) => s,
            _ => return Err(c.err("expected quoted text in CONTAINS")),
        };
        c.expect(&TKind::RParen, "')'")?;
        return Ok(Constraint::FullTextSearch { selector, expression });
    }
    for func in ["IN_FOLDER", "IN_TREE", "ISSAMENODE"] {
        if is_call(c, func) {
            c.next();
            c.next();
            let selector = parse_call_qualifier(c)?;
            let target = match c.next().map(|t| t.kind) {
                Some(TKind::Str(s)) => unescape(&s),
                _ => return Err(c.err(&format!("expected object id or path in {}", func))),
            };
            c.expect(&TKind::RParen, "')'")?;
            return Ok(match func {
                "IN_FOLDER" => Constraint::ChildNode { selector, folder: target },
                "IN_TREE" => Constraint::DescendantNode { selector, folder: target },
                _ => Constraint::SameNode { selector, path: target },
            });
        }
    }
    // ANY p [NOT] IN (...)
    if c.is_kw("ANY") {
        c.next();
        let operand = parse_property_ref(c)?;
        let negated = c.eat_kw("NOT");
        c.expect_kw("IN")?;
        let values = parse_in_list(c)?;
        return Ok(if negated { Constraint::NotIn { operand, values } } else { Constraint::In { operand, values } });
    }
    // 'v' = ANY p
    if is_literal_start(c) {
        let value = parse_static_operand(c)?;
        c.expect(&TKind::Eq, "'=' before ANY")?;
        c.expect_kw("ANY")?;
        let operand = parse_property_ref(c)?;
        return Ok(Constraint::Comparison { operand, op: Operator::Eq, value });
    }

    let operand = parse_dynamic_operand(c)?;
    if c.eat_kw("IS") {
        let negated = c.eat_kw("NOT");
        c.expect_kw("NULL")?;
        return Ok(if negated { Constraint::IsNotNull { operand } } else { Constraint::IsNull { operand } });
    }
    let negated = c.eat_kw("NOT");
    if c.eat_kw("IN") {
        let values = parse_in_list(c)?;
        return Ok(if negated { Constraint::NotIn { operand, values } } else { Constraint::In { operand, values } });
    }
    if c.eat_kw("LIKE") {
        let pattern = match c.next().map(|t| t.kind) {
            Some(TKind::Str(s)) => s,
            _ => return Err(c.err("expected quoted pattern after LIKE")),
        };
        let like = Constraint::Like { operand, pattern };
        return Ok(if negated { Constraint::Not(Box::new(like)) } else { like });
    }
    if negated { return Err(c.err("expected IN or LIKE after NOT")); }
    let op = match c.peek_kind() {
        Some(TKind::Eq) => Operator::Eq,
        Some(TKind::Ne) => Operator::Ne,
        Some(TKind::Lt) => Operator::Lt,
        Some(TKind::Gt) => Operator::Gt,
        Some(TKind::Le) => Operator::Le,
        Some(TKind::Ge) => Operator::Ge,
        _ => return Err(c.err("expected comparison operator")),
    };
    c.next();
    let value = parse_static_operand(c)?;
    Ok(Constraint::Comparison { operand, op, value })
}

/// Optional `qualifier ,` in CONTAINS / IN_FOLDER / IN_TREE.
fn parse_call_qualifier(c: &mut Cursor<'_>) -> RepoResult<String> {
    if let (Some(TKind::Ident(q)), Some(TKind::Comma)) = (c.peek_kind().cloned(), c.peek_at(1).map(|t| t.kind.clone())) {
        c.next();
        c.next();
        return Ok(q);
    }
    Ok(String::new())
}

fn parse_in_list(c: &mut Cursor<'_>) -> RepoResult<Vec<StaticOperand>> {
    c.expect(&TKind::LParen, "'(' after IN")?;
    let mut values = vec![parse_static_operand(c)?];
    while c.eat(&TKind::Comma) { values.push(parse_static_operand(c)?); }
    c.expect(&TKind::RParen, "')'")?;
    Ok(values)
}

fn parse_property_ref(c: &mut Cursor<'_>) -> RepoResult<DynamicOperand> {
    match c.peek_kind().cloned() {
        Some(TKind::Ident(name)) if !is_reserved(&name) => {
            c.next();
            let (sel, prop) = split_qualified(&name);
            Ok(DynamicOperand::PropertyValue { selector: sel.unwrap_or("").to_string(), property: prop.to_string() })
        }
        _ => Err(c.err("expected property name")),
    }
}

/// `SCORE()` or a property reference.
pub fn parse_dynamic_operand(c: &mut Cursor<'_>) -> RepoResult<DynamicOperand> {
    if is_call(c, "SCORE") {
        c.next();
        c.next();
        c.expect(&TKind::RParen, "')'")?;
        return Ok(DynamicOperand::FullTextSearchScore { selector: String::new() });
    }
    parse_property_ref(c)
}

fn is_literal_start(c: &Cursor<'_>) -> bool {
    match c.peek_kind() {
        Some(TKind::Str(_)) | Some(TKind::Num(_)) | Some(TKind::Param(_)) | Some(TKind::Question) => true,
        Some(TKind::Ident(s)) => s.eq_ignore_ascii_case("TRUE") || s.eq_ignore_ascii_case("FALSE") || s.eq_ignore_ascii_case("TIMESTAMP"),
        _ => false,
    }
}

fn parse_static_operand(c: &mut Cursor<'_>) -> RepoResult<StaticOperand> {
    let pos = c.pos();
    let Some(tok) = c.next() else { return Err(c.err("expected literal")); };
    let lit = match tok.kind {
        TKind::Str(s) => Literal::String(unescape(&s)),
        TKind::Num(n) => parse_number(&n).ok_or_else(|| syntax_error(c.src, pos, &format!("invalid number '{}'", n)))?,
        TKind::Param(name) => return Ok(StaticOperand::BindVariable(name)),
        TKind::Question => return Ok(StaticOperand::BindVariable(c.next_positional())),
        TKind::Ident(w) if w.eq_ignore_ascii_case("TRUE") => Literal::Boolean(true),
        TKind::Ident(w) if w.eq_ignore_ascii_case("FALSE") => Literal::Boolean(false),
        TKind::Ident(w) if w.eq_ignore_ascii_case("TIMESTAMP") => {
            let tpos = c.pos();
            match c.next().map(|t| t.kind) {
                Some(TKind::Str(s)) => Literal::DateTime(parse_timestamp(&s).ok_or_else(|| syntax_error(c.src, tpos, &format!("invalid timestamp '{}'", s)))?),
                _ => return Err(syntax_error(c.src, tpos, "expected quoted timestamp after TIMESTAMP")),
            }
        }
        _ => return Err(syntax_error(c.src, pos, "expected literal")),
    };
    Ok(StaticOperand::Literal(lit))
}

fn parse_number(n: &str) -> Option<Literal> {
    if !n.contains(['.', 'e', 'E']) {
        if let Ok(i) = n.parse::<i64>() { return Some(Literal::Integer(i)); }
    }
    n.parse::<f64>().ok().filter(|f| f.is_finite()).map(Literal::Decimal)
}

pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) { return Some(dt.with_timezone(&Utc)); }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok().map(|n| n.and_utc())
}

/// Outside LIKE patterns a doubled backslash stands for one backslash.
pub(crate) fn unescape(s: &str) -> String { s.replace("\\\\", "\\") }
