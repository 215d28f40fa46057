//! SQL Compiler
//!
//! Walks an expression AST and emits a parameterized SQL fragment plus a
//! positional argument list for the column store. The one rule everything
//! else hangs off: **no literal value from the expression ever appears in
//! the SQL text**. Every literal becomes a `?` placeholder and the value
//! moves into the argument list, in emission order. The single controlled
//! exception is a JSON property name, which names a key rather than a
//! value and is allow-listed to `[A-Za-z0-9_-]` before interpolation.
//!
//! Each call gets its own accumulator; compilation is pure and may run
//! from any number of threads concurrently.

use crate::query::ast::{BinaryOp, Expr, Literal, UnaryOp};
use crate::query::error::CompileError;
use crate::query::schema::{self, FieldDefinition, FieldType};
use crate::storage::SqlValue;

/// A compiled filter: SQL fragment plus positional arguments
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    pub sql: String,
    pub args: Vec<SqlValue>,
}

/// Compile an AST into a parameterized SQL fragment
pub fn compile(expr: &Expr) -> Result<CompiledFilter, CompileError> {
    let mut compiler = Compiler { args: Vec::new() };
    let sql = compiler.emit_bool(expr)?;
    Ok(CompiledFilter {
        sql,
        args: compiler.args,
    })
}

/// Per-call accumulator for the argument list
struct Compiler {
    args: Vec<SqlValue>,
}

impl Compiler {
    /// Emit a boolean-valued expression
    fn emit_bool(&mut self, expr: &Expr) -> Result<String, CompileError> {
        match expr {
            Expr::Binary { op, lhs, rhs } => match op {
                BinaryOp::And | BinaryOp::Or => {
                    let left = self.emit_bool(lhs)?;
                    let right = self.emit_bool(rhs)?;
                    let word = if *op == BinaryOp::And { "AND" } else { "OR" };
                    Ok(format!("({left} {word} {right})"))
                }
                BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::Lt
                | BinaryOp::Le => self.emit_comparison(*op, lhs, rhs),
                BinaryOp::In => self.emit_in(lhs, rhs),
                BinaryOp::Contains
                | BinaryOp::StartsWith
                | BinaryOp::EndsWith
                | BinaryOp::Matches => self.emit_string_predicate(*op, lhs, rhs),
                BinaryOp::Add | BinaryOp::Sub => Err(CompileError::Unsupported(
                    "arithmetic outside a comparison".to_string(),
                )),
            },
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => {
                let inner = self.emit_bool(operand)?;
                Ok(format!("(NOT {inner})"))
            }
            Expr::Ident(name) => Err(CompileError::Unsupported(format!(
                "bare field '{name}' is not a condition"
            ))),
            Expr::Member { object, .. } => Err(CompileError::Unsupported(format!(
                "bare member access on '{object}' is not a condition"
            ))),
            Expr::Call { name, .. } => Err(CompileError::Unsupported(format!(
                "call to '{name}' is not a condition"
            ))),
            Expr::Literal(lit) => Err(CompileError::Unsupported(format!(
                "bare {} literal is not a condition",
                lit.kind()
            ))),
        }
    }

    /// Equality / ordering comparison against a column
    fn emit_comparison(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<String, CompileError> {
        let target = self.resolve_column(lhs, op)?;
        let sql_op = match op {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "!=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            _ => unreachable!("emit_comparison called with {op:?}"),
        };

        // String equality is case-insensitive: the column is lowered and
        // the argument was lowercased when stored. JSON extraction is
        // compared as-is.
        let column = match (&target.kind, op) {
            (ColumnKind::String, BinaryOp::Eq | BinaryOp::Ne) => {
                format!("lower({})", target.expr)
            }
            _ => target.expr.clone(),
        };

        let value = self.emit_value(rhs)?;
        Ok(format!("({column} {sql_op} {value})"))
    }

    /// `in` membership against an array or constant-set literal
    fn emit_in(&mut self, lhs: &Expr, rhs: &Expr) -> Result<String, CompileError> {
        let target = self.resolve_column(lhs, BinaryOp::In)?;

        let mut placeholders = Vec::new();
        match rhs {
            Expr::Literal(Literal::Array(items)) => {
                for item in items {
                    match item {
                        Literal::Str(s) => {
                            self.args.push(SqlValue::Str(s.to_lowercase()));
                        }
                        Literal::Int(i) => self.args.push(SqlValue::Int(*i)),
                        Literal::Float(f) => self.args.push(SqlValue::Float(*f)),
                        Literal::Bool(b) => self.args.push(SqlValue::Bool(*b)),
                        Literal::Array(_) | Literal::StrSet(_) => {
                            return Err(CompileError::Unsupported(
                                "nested array in 'in' list".to_string(),
                            ))
                        }
                    }
                    placeholders.push("?");
                }
            }
            // Constant set: iteration order is unspecified, which is fine
            // because IN is order-independent.
            Expr::Literal(Literal::StrSet(set)) => {
                for s in set {
                    self.args.push(SqlValue::Str(s.to_lowercase()));
                    placeholders.push("?");
                }
            }
            _ => {
                return Err(CompileError::Unsupported(
                    "'in' requires a literal array".to_string(),
                ))
            }
        }

        if placeholders.is_empty() {
            return Err(CompileError::Unsupported(
                "'in' with an empty list".to_string(),
            ));
        }

        Ok(format!("{} IN ({})", target.expr, placeholders.join(", ")))
    }

    /// contains / startsWith / endsWith / matches
    fn emit_string_predicate(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<String, CompileError> {
        let target = self.resolve_column(lhs, op)?;

        let pattern = match rhs {
            Expr::Literal(Literal::Str(s)) => s,
            _ => {
                return Err(CompileError::Unsupported(format!(
                    "'{}' requires a string literal",
                    op.name()
                )))
            }
        };

        if op == BinaryOp::Matches {
            // Unconditional safety gate: nested-quantifier shapes are the
            // classic catastrophic-backtracking patterns.
            if has_nested_quantifier(pattern) {
                return Err(CompileError::RedosPattern(pattern.clone()));
            }
            regex::Regex::new(pattern)
                .map_err(|e| CompileError::InvalidRegex(e.to_string()))?;
        }

        self.args.push(SqlValue::Str(pattern.to_lowercase()));
        let column = format!("lower({})", target.expr);

        Ok(match op {
            BinaryOp::Contains => format!("position({column}, ?) > 0"),
            BinaryOp::StartsWith => format!("startsWith({column}, ?)"),
            BinaryOp::EndsWith => format!("endsWith({column}, ?)"),
            BinaryOp::Matches => format!("match({column}, ?)"),
            _ => unreachable!("emit_string_predicate called with {op:?}"),
        })
    }

    /// Resolve the left-hand side of an operator to a column expression,
    /// enforcing registry membership and operator legality.
    fn resolve_column(&self, lhs: &Expr, op: BinaryOp) -> Result<ColumnTarget, CompileError> {
        match lhs {
            Expr::Ident(name) => {
                let def = lookup_field(name)?;
                require_operator(def, op)?;
                Ok(ColumnTarget {
                    expr: def.column.to_string(),
                    kind: match def.field_type {
                        FieldType::String => ColumnKind::String,
                        _ => ColumnKind::Other,
                    },
                })
            }
            Expr::Member { object, property } => {
                let def = lookup_field(object)?;
                if def.field_type != FieldType::Json {
                    return Err(CompileError::NotJsonField(object.clone()));
                }
                require_operator(def, op)?;
                // The property names a JSON key, not a value, so it cannot
                // travel as a placeholder. Allow-list before interpolating.
                if !is_safe_property(property) {
                    return Err(CompileError::InvalidJsonProperty(property.clone()));
                }
                Ok(ColumnTarget {
                    expr: format!("JSONExtractString({}, '{}')", def.column, property),
                    kind: ColumnKind::Json,
                })
            }
            other => Err(CompileError::Unsupported(format!(
                "left side of '{}' must be a field, got {other:?}",
                op.name()
            ))),
        }
    }

    /// Emit a value-position expression: a literal placeholder, or an
    /// inline time expression built from now()/duration() arithmetic.
    fn emit_value(&mut self, expr: &Expr) -> Result<String, CompileError> {
        match expr {
            Expr::Literal(Literal::Str(s)) => {
                self.args.push(SqlValue::Str(s.to_lowercase()));
                Ok("?".to_string())
            }
            Expr::Literal(Literal::Int(i)) => {
                self.args.push(SqlValue::Int(*i));
                Ok("?".to_string())
            }
            Expr::Literal(Literal::Float(f)) => {
                self.args.push(SqlValue::Float(*f));
                Ok("?".to_string())
            }
            Expr::Literal(Literal::Bool(b)) => {
                self.args.push(SqlValue::Bool(*b));
                Ok("?".to_string())
            }
            Expr::Literal(lit @ (Literal::Array(_) | Literal::StrSet(_))) => Err(
                CompileError::Unsupported(format!("{} literal outside 'in'", lit.kind())),
            ),
            Expr::Call { name, args } => self.emit_call(name, args),
            Expr::Binary {
                op: op @ (BinaryOp::Add | BinaryOp::Sub),
                lhs,
                rhs,
            } => {
                let left = self.emit_value(lhs)?;
                let right = self.emit_value(rhs)?;
                let sign = if *op == BinaryOp::Add { "+" } else { "-" };
                Ok(format!("({left} {sign} {right})"))
            }
            other => Err(CompileError::Unsupported(format!(
                "unsupported value expression: {other:?}"
            ))),
        }
    }

    /// now() and duration() are the only built-ins
    fn emit_call(&mut self, name: &str, args: &[Expr]) -> Result<String, CompileError> {
        match name {
            "now" => {
                if !args.is_empty() {
                    return Err(CompileError::Unsupported(
                        "now() takes no arguments".to_string(),
                    ));
                }
                Ok("now()".to_string())
            }
            "duration" => {
                let text = match args {
                    [Expr::Literal(Literal::Str(s))] => s,
                    _ => {
                        return Err(CompileError::Unsupported(
                            "duration() takes one string literal".to_string(),
                        ))
                    }
                };
                let secs = parse_duration_secs(text)?;
                Ok(interval_sql(secs))
            }
            other => Err(CompileError::UnknownFunction(other.to_string())),
        }
    }
}

/// Resolved column reference
struct ColumnTarget {
    expr: String,
    kind: ColumnKind,
}

enum ColumnKind {
    String,
    Json,
    Other,
}

fn lookup_field(name: &str) -> Result<&'static FieldDefinition, CompileError> {
    schema::lookup(name).ok_or_else(|| CompileError::UnknownField(name.to_string()))
}

fn require_operator(def: &FieldDefinition, op: BinaryOp) -> Result<(), CompileError> {
    if def.allows(op.name()) {
        Ok(())
    } else {
        Err(CompileError::OperatorNotAllowed {
            field: def.name.to_string(),
            op: op.name().to_string(),
        })
    }
}

/// JSON property allow-list: letters, digits, underscore, hyphen
fn is_safe_property(property: &str) -> bool {
    !property.is_empty()
        && property
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Static detection of catastrophic-backtracking shapes: a quantified
/// group whose body itself contains a quantifier or an alternation,
/// e.g. `(a+)+` or `(a|a)+`.
fn has_nested_quantifier(pattern: &str) -> bool {
    let bytes = pattern.as_bytes();
    // For each open group: does its body contain a quantifier or '|'
    let mut groups: Vec<bool> = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1, // skip escaped char
            b'(' => groups.push(false),
            b')' => {
                let risky = groups.pop().unwrap_or(false);
                if risky {
                    if let Some(&next) = bytes.get(i + 1) {
                        if matches!(next, b'+' | b'*' | b'{') {
                            return true;
                        }
                    }
                    // A risky body also taints the enclosing group
                    if let Some(outer) = groups.last_mut() {
                        *outer = true;
                    }
                }
            }
            b'+' | b'*' | b'|' | b'{' => {
                if let Some(top) = groups.last_mut() {
                    *top = true;
                }
            }
            _ => {}
        }
        i += 1;
    }
    false
}

/// Parse a go-style duration literal (`1h30m`, `90m`, `2d`) to seconds.
/// Sub-second units are not representable as store intervals.
fn parse_duration_secs(text: &str) -> Result<u64, CompileError> {
    let bad = || CompileError::BadDuration(text.to_string());

    if text.is_empty() {
        return Err(bad());
    }

    let mut total: u64 = 0;
    let mut rest = text;
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(bad)?;
        if digits_end == 0 {
            return Err(bad());
        }
        let number: u64 = rest[..digits_end].parse().map_err(|_| bad())?;

        let unit_end = digits_end
            + rest[digits_end..]
                .find(|c: char| c.is_ascii_digit())
                .unwrap_or(rest.len() - digits_end);
        let unit_secs = match &rest[digits_end..unit_end] {
            "d" => 86_400,
            "h" => 3_600,
            "m" => 60,
            "s" => 1,
            _ => return Err(bad()),
        };

        total = total
            .checked_add(number.checked_mul(unit_secs).ok_or_else(bad)?)
            .ok_or_else(bad)?;
        rest = &rest[unit_end..];
    }

    Ok(total)
}

/// Render seconds as a store-native interval using the largest whole
/// unit that evenly divides: 24h becomes `1 DAY`, but 90m stays
/// `90 MINUTE` rather than collapsing to a fractional hour.
fn interval_sql(secs: u64) -> String {
    if secs >= 86_400 && secs % 86_400 == 0 {
        format!("INTERVAL {} DAY", secs / 86_400)
    } else if secs >= 3_600 && secs % 3_600 == 0 {
        format!("INTERVAL {} HOUR", secs / 3_600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("INTERVAL {} MINUTE", secs / 60)
    } else {
        format!("INTERVAL {secs} SECOND")
    }
}
