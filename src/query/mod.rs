//! Loghouse Query Engine
//!
//! Turns untrusted, human-written filter expressions into safe,
//! parameterized SQL against the fixed log-event schema:
//!
//! - **Schema**: registry of queryable fields, their types, and legal operators
//! - **AST**: expression syntax tree types
//! - **Parser**: expression text to AST (nom)
//! - **Compiler**: AST to SQL fragment + positional argument list
//!
//! # Expression Language
//!
//! ```text
//! level == "error" and http_status >= 500
//! message contains "timeout"
//! level in ["error", "fatal"]
//! fields.status == "200"
//! timestamp > now() - duration("1h")
//! ```
//!
//! # Example
//!
//! ```rust
//! use loghouse::query::compile_expression;
//!
//! let compiled = compile_expression(r#"level == "error""#).unwrap();
//! assert_eq!(compiled.sql, "(lower(level) = ?)");
//! ```

mod ast;
mod compiler;
mod error;
mod parser;
pub mod schema;

pub use ast::{BinaryOp, Expr, Literal, UnaryOp};
pub use compiler::{compile, CompiledFilter};
pub use error::{CompileError, ParseError, QueryResult};
pub use parser::parse_expression;
pub use schema::{FieldDefinition, FieldType};

/// Maximum accepted expression length in characters
pub const MAX_EXPRESSION_LEN: usize = 1000;

/// Errors from either stage of expression processing
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ExpressionError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Parse and compile an expression in one step
pub fn compile_expression(input: &str) -> Result<CompiledFilter, ExpressionError> {
    let ast = parse_expression(input)?;
    Ok(compile(&ast)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_expression_end_to_end() {
        let out = compile_expression(r#"level == "error""#).unwrap();
        assert_eq!(out.sql, "(lower(level) = ?)");
    }

    #[test]
    fn test_compile_expression_errors() {
        assert!(matches!(
            compile_expression(""),
            Err(ExpressionError::Parse(ParseError::Empty))
        ));
        assert!(matches!(
            compile_expression(r#"level > "error""#),
            Err(ExpressionError::Compile(CompileError::OperatorNotAllowed { .. }))
        ));
    }
}
