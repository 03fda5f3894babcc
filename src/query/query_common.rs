//! Query object model produced by the compiler.
//! After resolution every property reference carries a property id and a selector name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub source: Source,
    pub columns: Vec<Column>,
    pub constraint: Option<Constraint>,
    pub orderings: Vec<Ordering>,
    pub statement: String,
}

impl Query {
    /// Selectors in source order.
    pub fn selectors(&self) -> Vec<&Selector> {
        fn walk<'a>(s: &'a Source, out: &mut Vec<&'a Selector>) {
            match s {
                Source::Selector(sel) => out.push(sel),
                Source::Join(j) => { walk(&j.left, out); walk(&j.right, out); }
            }
        }
        let mut out = Vec::new();
        walk(&self.source, &mut out);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    /// Type query name as written, type id once resolved
    pub node_type: String,
    /// Alias, or the type query name when none was given
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Source {
    Selector(Selector),
    Join(Box<Join>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType { Inner, LeftOuter, RightOuter }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub left: Source,
    pub right: Source,
    pub join_type: JoinType,
    pub condition: JoinCondition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JoinCondition {
    Equi { selector1: String, property1: String, selector2: String, property2: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Property { selector: String, property: String, column_name: String },
    /// `*` when `selector` is None, `sel.*` otherwise
    AllProperties { selector: Option<String> },
    Score { selector: String, column_name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator { Eq, Ne, Lt, Gt, Le, Ge }

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self { Operator::Eq => "=", Operator::Ne => "<>", Operator::Lt => "<", Operator::Gt => ">", Operator::Le => "<=", Operator::Ge => ">=" }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DynamicOperand {
    PropertyValue { selector: String, property: String },
    FullTextSearchScore { selector: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    String(String),
    Decimal(f64),
    Integer(i64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
}

impl Literal {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Literal::String(_) => "string",
            Literal::Decimal(_) => "decimal",
            Literal::Integer(_) => "integer",
            Literal::Boolean(_) => "boolean",
            Literal::DateTime(_) => "timestamp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StaticOperand {
    Literal(Literal),
    /// `$name`, or the 1-based position of a `?`
    BindVariable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    And(Box<Constraint>, Box<Constraint>),
    Or(Box<Constraint>, Box<Constraint>),
    Not(Box<Constraint>),
    Comparison { operand: DynamicOperand, op: Operator, value: StaticOperand },
    In { operand: DynamicOperand, values: Vec<StaticOperand> },
    NotIn { operand: DynamicOperand, values: Vec<StaticOperand> },
    /// Pattern kept as written: `%` and `_` are wildcards, `\` escapes
    Like { operand: DynamicOperand, pattern: String },
    IsNull { operand: DynamicOperand },
    IsNotNull { operand: DynamicOperand },
    FullTextSearch { selector: String, expression: String },
    /// ISSAMENODE: object given by id or absolute path
    SameNode { selector: String, path: String },
    /// IN_FOLDER: folder given by id or absolute path
    ChildNode { selector: String, folder: String },
    /// IN_TREE
    DescendantNode { selector: String, folder: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order { Ascending, Descending }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ordering {
    pub operand: DynamicOperand,
    pub order: Order,
}
