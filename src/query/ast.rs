//! Expression Abstract Syntax Tree
//!
//! A closed sum type over every node shape the grammar can produce.
//! Exhaustive matching in the compiler means adding a node kind is a
//! compile-time-checked change, not a runtime default-case risk.
//!
//! # Example expressions
//!
//! ```text
//! level == "error" and http_status >= 500
//! message contains "timeout"
//! level in ["error", "fatal"]
//! fields.status == "200"
//! timestamp > now() - duration("1h")
//! ```

use std::collections::HashSet;

/// A parsed filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Binary operation: comparisons, logic, membership, arithmetic
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Unary operation: `not`
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// Field reference
    Ident(String),
    /// Member access into a JSON field: `fields.x`, `labels.x`
    Member { object: String, property: String },
    /// Function call: `now()`, `duration("1h")`
    Call { name: String, args: Vec<Expr> },
    /// Literal value
    Literal(Literal),
}

/// Binary operators accepted by the grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    And,
    Or,
    Add,
    Sub,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
}

impl BinaryOp {
    /// Operator name as used in the field registry's allow-lists
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::In => "in",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Contains => "contains",
            BinaryOp::StartsWith => "startsWith",
            BinaryOp::EndsWith => "endsWith",
            BinaryOp::Matches => "matches",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
}

/// Literal values
///
/// `StrSet` is the constant-set form: the parser folds an all-string
/// array literal into a hash set. Its iteration order is unspecified, so
/// nothing downstream may depend on element order.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<Literal>),
    StrSet(HashSet<String>),
}

impl Literal {
    /// Human-readable kind name for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Literal::Str(_) => "string",
            Literal::Int(_) => "int",
            Literal::Float(_) => "float",
            Literal::Bool(_) => "bool",
            Literal::Array(_) => "array",
            Literal::StrSet(_) => "set",
        }
    }
}
