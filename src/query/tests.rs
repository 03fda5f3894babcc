use super::*;
use crate::types::{BaseType, PropertyDefinition, PropertyKind, TypeDefinition, TypeRegistry};

fn registry() -> TypeRegistry {
    let mut reg = TypeRegistry::new();
    reg.add_type(
        TypeDefinition::new("nasa:mission", BaseType::Document, "cmis:document")
            .with_property(PropertyDefinition::new("nasa:commander", PropertyKind::string()).query_name("commander"))
            .with_property(PropertyDefinition::new("nasa:boosterMass", PropertyKind::decimal()).query_name("boosterMass"))
            .with_property(PropertyDefinition::new("nasa:crew", PropertyKind::string()).query_name("crew").multi())
            .with_property(PropertyDefinition::new("nasa:secret", PropertyKind::string()).query_name("secret").not_queryable()),
    ).unwrap();
    reg.add_type(
        TypeDefinition::new("test:note", BaseType::Document, "cmis:document")
            .with_property(PropertyDefinition::new("test:commander", PropertyKind::string()).query_name("commander2"))
            .fulltext_indexed(false),
    ).unwrap();
    reg
}

fn compile(sql: &str) -> Query { parse(sql, &registry()).unwrap() }

fn compile_err(sql: &str) -> crate::RepoError { parse(sql, &registry()).unwrap_err() }

fn prop(property: &str) -> DynamicOperand {
    DynamicOperand::PropertyValue { selector: "nasa:mission".into(), property: property.into() }
}

fn lit(s: &str) -> StaticOperand { StaticOperand::Literal(Literal::String(s.into())) }

#[test]
fn select_star_resolves_type() {
    let q = compile("SELECT * FROM nasa:mission");
    assert_eq!(q.source, Source::Selector(Selector { node_type: "nasa:mission".into(), name: "nasa:mission".into() }));
    assert_eq!(q.columns, vec![Column::AllProperties { selector: None }]);
    assert!(q.constraint.is_none());
    assert!(q.orderings.is_empty());
}

#[test]
fn columns_aliases_and_score() {
    let q = compile("SELECT d.commander AS boss, SCORE() AS scoreCol, cmis:name FROM nasa:mission AS d WHERE CONTAINS('moon')");
    assert_eq!(q.columns, vec![
        Column::Property { selector: "d".into(), property: "nasa:commander".into(), column_name: "boss".into() },
        Column::Score { selector: "d".into(), column_name: "scoreCol".into() },
        Column::Property { selector: "d".into(), property: "cmis:name".into(), column_name: "cmis:name".into() },
    ]);
    assert_eq!(q.constraint, Some(Constraint::FullTextSearch { selector: "d".into(), expression: "moon".into() }));
}

#[test]
fn unknown_table_and_column() {
    let e = compile_err("SELECT * FROM nasa:nope");
    assert_eq!(e.code_str(), "query_compilation");
    assert!(e.message().contains("Table nasa:nope does not exist"));
    assert_eq!(e.position(), Some(14));

    let e = compile_err("SELECT pilot FROM nasa:mission");
    assert!(e.message().contains("Column pilot does not exist on table nasa:mission"));
}

#[test]
fn where_precedence_and_operators() {
    let q = compile("SELECT * FROM nasa:mission WHERE commander = 'a' OR boosterMass > 5 AND boosterMass <= 3038.5");
    let expected = Constraint::Or(
        Box::new(Constraint::Comparison { operand: prop("nasa:commander"), op: Operator::Eq, value: lit("a") }),
        Box::new(Constraint::And(
            Box::new(Constraint::Comparison { operand: prop("nasa:boosterMass"), op: Operator::Gt, value: StaticOperand::Literal(Literal::Decimal(5.0)) }),
            Box::new(Constraint::Comparison { operand: prop("nasa:boosterMass"), op: Operator::Le, value: StaticOperand::Literal(Literal::Decimal(3038.5)) }),
        )),
    );
    assert_eq!(q.constraint, Some(expected));
}

#[test]
fn not_not_in_normalizes_to_in() {
    let q = compile("SELECT * FROM nasa:mission WHERE NOT (commander NOT IN ('James A. Lovell, Jr.'))");
    assert_eq!(q.constraint, Some(Constraint::In { operand: prop("nasa:commander"), values: vec![lit("James A. Lovell, Jr.")] }));

    let q = compile("SELECT * FROM nasa:mission WHERE NOT NOT commander IS NULL");
    assert_eq!(q.constraint, Some(Constraint::IsNull { operand: prop("nasa:commander") }));

    let q = compile("SELECT * FROM nasa:mission WHERE NOT commander IS NULL");
    assert_eq!(q.constraint, Some(Constraint::IsNotNull { operand: prop("nasa:commander") }));

    let q = compile("SELECT * FROM nasa:mission WHERE NOT CONTAINS(\"world\")");
    assert!(matches!(q.constraint, Some(Constraint::Not(ref inner)) if matches!(**inner, Constraint::FullTextSearch { .. })));
}

#[test]
fn like_keeps_escapes_raw() {
    let q = compile(r"SELECT * FROM nasa:mission WHERE commander LIKE 'ad\%min%'");
    assert_eq!(q.constraint, Some(Constraint::Like { operand: prop("nasa:commander"), pattern: r"ad\%min%".into() }));
    let q = compile("SELECT * FROM nasa:mission WHERE commander NOT LIKE 'J%'");
    assert!(matches!(q.constraint, Some(Constraint::Not(_))));
    let e = compile_err("SELECT * FROM nasa:mission WHERE boosterMass LIKE '3%'");
    assert!(e.message().contains("LIKE requires a string column"));
}

#[test]
fn folder_predicates_and_any() {
    let q = compile("SELECT * FROM nasa:mission AS m WHERE IN_FOLDER(m, '/space') AND IN_TREE('abc') AND 'Lovell' = ANY crew AND ANY crew IN ('a', 'b')");
    let Some(Constraint::And(left, any_in)) = q.constraint else { panic!("expected AND") };
    assert_eq!(*any_in, Constraint::In {
        operand: DynamicOperand::PropertyValue { selector: "m".into(), property: "nasa:crew".into() },
        values: vec![lit("a"), lit("b")],
    });
    let Constraint::And(left, any_eq) = *left else { panic!("expected AND") };
    assert!(matches!(*any_eq, Constraint::Comparison { op: Operator::Eq, .. }));
    let Constraint::And(folder, tree) = *left else { panic!("expected AND") };
    assert_eq!(*folder, Constraint::ChildNode { selector: "m".into(), folder: "/space".into() });
    assert_eq!(*tree, Constraint::DescendantNode { selector: "m".into(), folder: "abc".into() });
}

#[test]
fn same_node_predicate() {
    let q = compile("SELECT * FROM nasa:mission AS m WHERE ISSAMENODE('/space/apollo') OR issamenode(m, 'abc')");
    let Some(Constraint::Or(path, id)) = q.constraint else { panic!("expected OR") };
    assert_eq!(*path, Constraint::SameNode { selector: "m".into(), path: "/space/apollo".into() });
    assert_eq!(*id, Constraint::SameNode { selector: "m".into(), path: "abc".into() });
    let e = compile_err("SELECT * FROM nasa:mission WHERE ISSAMENODE(42)");
    assert!(e.message().contains("expected object id or path"));
}

#[test]
fn ordering_defaults() {
    let q = compile("SELECT * FROM nasa:mission WHERE CONTAINS('moon') ORDER BY SCORE(), commander, cmis:name DESC");
    assert_eq!(q.orderings[0].order, Order::Descending);
    assert!(matches!(q.orderings[0].operand, DynamicOperand::FullTextSearchScore { .. }));
    assert_eq!(q.orderings[1].order, Order::Ascending);
    assert_eq!(q.orderings[2].order, Order::Descending);
    let e = compile_err("SELECT * FROM nasa:mission ORDER BY crew");
    assert!(e.message().contains("not orderable"));
}

#[test]
fn queryability_and_literal_types() {
    assert!(compile_err("SELECT * FROM nasa:mission WHERE secret = 'x'").message().contains("not queryable"));
    assert!(compile_err("SELECT * FROM nasa:mission WHERE boosterMass = 'heavy'").message().contains("not compatible"));
    assert!(compile_err("SELECT * FROM test:note WHERE CONTAINS('x')").message().contains("not full-text indexed"));
    assert!(compile_err("SELECT * FROM nasa:mission WHERE SCORE() > 1").message().contains("SCORE()"));
    let q = compile("SELECT * FROM nasa:mission WHERE cmis:creationDate > TIMESTAMP '2009-01-01T00:00:00.000Z' AND boosterMass <> 3");
    let Some(Constraint::And(a, b)) = q.constraint else { panic!("expected AND") };
    assert!(matches!(*a, Constraint::Comparison { value: StaticOperand::Literal(Literal::DateTime(_)), .. }));
    assert!(matches!(*b, Constraint::Comparison { value: StaticOperand::Literal(Literal::Decimal(d)), .. } if d == 3.0));
}

#[test]
fn bind_variables() {
    let q = compile("SELECT * FROM nasa:mission WHERE commander = ? OR commander = $who OR boosterMass > ?");
    let mut names = Vec::new();
    fn collect(c: &Constraint, out: &mut Vec<String>) {
        match c {
            Constraint::Or(a, b) | Constraint::And(a, b) => { collect(a, out); collect(b, out); }
            Constraint::Comparison { value: StaticOperand::BindVariable(n), .. } => out.push(n.clone()),
            _ => {}
        }
    }
    collect(q.constraint.as_ref().unwrap(), &mut names);
    assert_eq!(names, vec!["1", "who", "2"]);
}

#[test]
fn joins_parse_but_comma_lists_fail() {
    let q = compile("SELECT a.commander FROM nasa:mission a JOIN test:note n ON a.commander = n.commander2");
    let Source::Join(j) = &q.source else { panic!("expected join") };
    assert_eq!(j.join_type, JoinType::Inner);
    assert_eq!(j.condition, JoinCondition::Equi {
        selector1: "a".into(), property1: "nasa:commander".into(), selector2: "n".into(), property2: "test:commander".into(),
    });
    let e = compile_err("SELECT * FROM nasa:mission, test:note");
    assert!(e.message().contains("explicit JOIN"));
    assert_eq!(e.position(), Some(26));
    // cmis:name exists on both sides
    let e = compile_err("SELECT cmis:name FROM nasa:mission a JOIN test:note n ON a.commander = n.commander2");
    assert!(e.message().contains("ambiguous"));
}

#[test]
fn syntax_errors_point_at_token() {
    let e = compile_err("SELECT * FROM nasa:mission WHERE commander = ");
    assert_eq!(e.position(), Some(45));
    let e = compile_err("SELECT * FROM nasa:mission WHERE commander 'x'");
    assert!(e.message().starts_with("Syntax error at position 43"));
    assert!(compile_err("SELECT * FROM nasa:mission extra tokens").message().contains("unexpected token"));
}

#[test]
fn compilation_is_pure() {
    let reg = registry();
    let sql = "SELECT commander FROM nasa:mission WHERE CONTAINS('moon') AND boosterMass > 5 ORDER BY commander DESC";
    assert_eq!(parse(sql, &reg).unwrap(), parse(sql, &reg).unwrap());
}
