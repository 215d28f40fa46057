//! Expression Parser
//!
//! Parses filter expression strings into an [`Expr`] AST.
//!
//! # Supported Syntax
//!
//! ```text
//! level == "error" and http_status >= 500
//! message contains "timeout" or not (source startsWith "db-")
//! level in ["error", "fatal"]
//! fields.status == "200"
//! timestamp > now() - duration("1h30m")
//! ```
//!
//! Operator precedence, loosest first: `or`, `and`, `not`, comparisons,
//! `+`/`-`, primaries. Parsing is stateless and side-effect free; any
//! number of threads may parse concurrently.
//!
//! Identifiers are validated against the field schema registry after the
//! grammar pass, so an expression referencing a non-queryable field is a
//! [`ParseError`], never a compile- or run-time surprise.

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_while},
    character::complete::{alpha1, char, digit1, multispace0},
    combinator::{map, map_res, opt, recognize, value},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};
use std::collections::HashSet;

use crate::query::ast::{BinaryOp, Expr, Literal, UnaryOp};
use crate::query::error::{ParseError, QueryResult};
use crate::query::schema;
use crate::query::MAX_EXPRESSION_LEN;

/// Parse an expression string into an AST
pub fn parse_expression(input: &str) -> QueryResult<Expr> {
    let input = input.trim();

    if input.is_empty() {
        return Err(ParseError::Empty);
    }
    // The length limit is in characters, not bytes
    let length = input.chars().count();
    if length > MAX_EXPRESSION_LEN {
        return Err(ParseError::TooLong(length));
    }

    match expression(input) {
        Ok((remaining, expr)) => {
            if !remaining.trim().is_empty() {
                return Err(ParseError::Syntax(remaining.trim().to_string()));
            }
            validate_fields(&expr)?;
            Ok(expr)
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(ParseError::Syntax(excerpt(e.input)))
        }
        Err(nom::Err::Incomplete(_)) => Err(ParseError::Syntax(excerpt(input))),
    }
}

/// Short excerpt of the offending input for error messages
fn excerpt(input: &str) -> String {
    input.chars().take(24).collect()
}

/// Check every identifier in the tree against the field registry
fn validate_fields(expr: &Expr) -> QueryResult<()> {
    match expr {
        Expr::Binary { lhs, rhs, .. } => {
            validate_fields(lhs)?;
            validate_fields(rhs)
        }
        Expr::Unary { operand, .. } => validate_fields(operand),
        Expr::Ident(name) => {
            if schema::lookup(name).is_none() {
                return Err(ParseError::UnknownField(name.clone()));
            }
            Ok(())
        }
        Expr::Member { object, .. } => {
            if schema::lookup(object).is_none() {
                return Err(ParseError::UnknownField(object.clone()));
            }
            Ok(())
        }
        // Function names are not fields; legality is the compiler's call
        Expr::Call { args, .. } => args.iter().try_for_each(validate_fields),
        Expr::Literal(_) => Ok(()),
    }
}

/// Top-level rule: `or` has the loosest binding
fn expression(input: &str) -> IResult<&str, Expr> {
    or_expr(input)
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(
        delimited(multispace0, keyword("or"), multispace0),
        and_expr,
    ))(input)?;
    Ok((input, fold_binary(first, BinaryOp::Or, rest)))
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = not_expr(input)?;
    let (input, rest) = many0(preceded(
        delimited(multispace0, keyword("and"), multispace0),
        not_expr,
    ))(input)?;
    Ok((input, fold_binary(first, BinaryOp::And, rest)))
}

fn not_expr(input: &str) -> IResult<&str, Expr> {
    alt((
        map(
            preceded(pair(keyword("not"), multispace0), not_expr),
            |operand| Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            },
        ),
        comparison,
    ))(input)
}

/// A comparison, or a bare additive expression when no operator follows
fn comparison(input: &str) -> IResult<&str, Expr> {
    let (input, lhs) = additive(input)?;
    let (input, tail) = opt(pair(
        delimited(multispace0, comparison_op, multispace0),
        additive,
    ))(input)?;

    match tail {
        Some((op, rhs)) => Ok((
            input,
            Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        )),
        None => Ok((input, lhs)),
    }
}

fn comparison_op(input: &str) -> IResult<&str, BinaryOp> {
    alt((
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::Ne, tag("!=")),
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Gt, char('>')),
        value(BinaryOp::Lt, char('<')),
        value(BinaryOp::In, keyword("in")),
        value(BinaryOp::Contains, keyword("contains")),
        value(BinaryOp::StartsWith, keyword("startsWith")),
        value(BinaryOp::EndsWith, keyword("endsWith")),
        value(BinaryOp::Matches, keyword("matches")),
    ))(input)
}

/// `+` / `-`, used for time arithmetic like `now() - duration("1h")`
fn additive(input: &str) -> IResult<&str, Expr> {
    let (input, first) = primary(input)?;
    let (input, rest) = many0(pair(
        delimited(
            multispace0,
            alt((
                value(BinaryOp::Add, char('+')),
                value(BinaryOp::Sub, char('-')),
            )),
            multispace0,
        ),
        primary,
    ))(input)?;

    let expr = rest.into_iter().fold(first, |lhs, (op, rhs)| Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    });
    Ok((input, expr))
}

fn primary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(literal, Expr::Literal),
        map(array_literal, Expr::Literal),
        function_call,
        member_access,
        map(identifier, |s| Expr::Ident(s.to_string())),
        delimited(
            pair(char('('), multispace0),
            expression,
            pair(multispace0, char(')')),
        ),
    ))(input)
}

/// Function call like `now()` or `duration("1h")`
fn function_call(input: &str) -> IResult<&str, Expr> {
    let (input, name) = identifier(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char('(')(input)?;
    let (input, _) = multispace0(input)?;
    let (input, args) = separated_list0(
        delimited(multispace0, char(','), multispace0),
        expression,
    )(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char(')')(input)?;

    Ok((
        input,
        Expr::Call {
            name: name.to_string(),
            args,
        },
    ))
}

/// Member access like `fields.status` or `fields."status"`
///
/// A quoted property is accepted by the grammar so the compiler can
/// reject bad names itself rather than masking them as syntax errors.
fn member_access(input: &str) -> IResult<&str, Expr> {
    let (input, object) = identifier(input)?;
    let (input, _) = char('.')(input)?;
    let (input, property) = alt((map(identifier, str::to_string), quoted_string))(input)?;

    Ok((
        input,
        Expr::Member {
            object: object.to_string(),
            property,
        },
    ))
}

/// Scalar literal: string, float, int, bool
fn literal(input: &str) -> IResult<&str, Literal> {
    alt((
        map(quoted_string, Literal::Str),
        number,
        value(Literal::Bool(true), keyword("true")),
        value(Literal::Bool(false), keyword("false")),
    ))(input)
}

/// Array literal `[a, b, ...]`
///
/// An all-string array is folded into a constant set ([`Literal::StrSet`])
/// for membership tests; mixed or numeric arrays keep their order.
fn array_literal(input: &str) -> IResult<&str, Literal> {
    let (input, items) = delimited(
        pair(char('['), multispace0),
        separated_list0(delimited(multispace0, char(','), multispace0), literal),
        pair(multispace0, char(']')),
    )(input)?;

    let all_strings = !items.is_empty() && items.iter().all(|l| matches!(l, Literal::Str(_)));
    if all_strings {
        let set: HashSet<String> = items
            .into_iter()
            .map(|l| match l {
                Literal::Str(s) => s,
                _ => unreachable!(),
            })
            .collect();
        Ok((input, Literal::StrSet(set)))
    } else {
        Ok((input, Literal::Array(items)))
    }
}

/// Double-quoted string with `\"` and `\\` escapes
fn quoted_string(input: &str) -> IResult<&str, String> {
    let (input, _) = char('"')(input)?;
    let mut out = String::new();
    let mut rest = input;
    loop {
        let (next, chunk) = opt(is_not("\"\\"))(rest)?;
        if let Some(chunk) = chunk {
            out.push_str(chunk);
        }
        rest = next;
        match rest.chars().next() {
            Some('"') => return Ok((&rest[1..], out)),
            Some('\\') => {
                let mut chars = rest[1..].chars();
                match chars.next() {
                    Some(c @ ('"' | '\\')) => {
                        out.push(c);
                        rest = &rest[1 + c.len_utf8()..];
                    }
                    Some('n') => {
                        out.push('\n');
                        rest = &rest[2..];
                    }
                    _ => {
                        return Err(nom::Err::Error(nom::error::Error::new(
                            rest,
                            nom::error::ErrorKind::Escaped,
                        )))
                    }
                }
            }
            _ => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    rest,
                    nom::error::ErrorKind::Char,
                )))
            }
        }
    }
}

/// Integer or float, with optional leading minus
fn number(input: &str) -> IResult<&str, Literal> {
    map_res(
        recognize(tuple((
            opt(char('-')),
            digit1,
            opt(pair(char('.'), digit1)),
        ))),
        |s: &str| -> Result<Literal, std::num::ParseFloatError> {
            if s.contains('.') {
                Ok(Literal::Float(s.parse::<f64>()?))
            } else {
                // i64 range overflow falls back to float
                match s.parse::<i64>() {
                    Ok(i) => Ok(Literal::Int(i)),
                    Err(_) => Ok(Literal::Float(s.parse::<f64>()?)),
                }
            }
        },
    )(input)
}

/// Identifier: letter or underscore, then letters/digits/underscores
fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

/// Word operator: matches `kw` only at an identifier boundary, so
/// `in` never eats the front of `insert`.
fn keyword(kw: &'static str) -> impl Fn(&str) -> IResult<&str, &str> {
    move |input: &str| {
        let (rest, word) = identifier(input)?;
        if word == kw {
            Ok((rest, word))
        } else {
            Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )))
        }
    }
}

fn fold_binary(first: Expr, op: BinaryOp, rest: Vec<Expr>) -> Expr {
    rest.into_iter().fold(first, |lhs, rhs| Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_equality() {
        let expr = parse_expression(r#"level == "error""#).unwrap();
        match expr {
            Expr::Binary { op, lhs, rhs } => {
                assert_eq!(op, BinaryOp::Eq);
                assert_eq!(*lhs, Expr::Ident("level".into()));
                assert_eq!(*rhs, Expr::Literal(Literal::Str("error".into())));
            }
            other => panic!("unexpected AST: {other:?}"),
        }
    }

    #[test]
    fn test_parse_and_precedence() {
        // and binds tighter than or
        let expr =
            parse_expression(r#"level == "a" or level == "b" and level == "c""#).unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Or, rhs, .. } => match *rhs {
                Expr::Binary { op: BinaryOp::And, .. } => {}
                other => panic!("rhs should be and-expr: {other:?}"),
            },
            other => panic!("top should be or-expr: {other:?}"),
        }
    }

    #[test]
    fn test_parse_not() {
        let expr = parse_expression(r#"not level == "debug""#).unwrap();
        assert!(matches!(expr, Expr::Unary { op: UnaryOp::Not, .. }));
    }

    #[test]
    fn test_parse_parens() {
        let expr = parse_expression(r#"(level == "a" or level == "b") and http_status >= 500"#)
            .unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::And, lhs, .. } => {
                assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Or, .. }));
            }
            other => panic!("unexpected AST: {other:?}"),
        }
    }

    #[test]
    fn test_parse_numbers() {
        let expr = parse_expression("http_status >= 500").unwrap();
        match expr {
            Expr::Binary { rhs, .. } => assert_eq!(*rhs, Expr::Literal(Literal::Int(500))),
            other => panic!("unexpected AST: {other:?}"),
        }

        let expr = parse_expression("http_status > -1.5").unwrap();
        match expr {
            Expr::Binary { rhs, .. } => assert_eq!(*rhs, Expr::Literal(Literal::Float(-1.5))),
            other => panic!("unexpected AST: {other:?}"),
        }
    }

    #[test]
    fn test_parse_string_predicates() {
        for (text, op) in [
            (r#"message contains "timeout""#, BinaryOp::Contains),
            (r#"message startsWith "warn""#, BinaryOp::StartsWith),
            (r#"message endsWith "!""#, BinaryOp::EndsWith),
            (r#"message matches "^ERROR""#, BinaryOp::Matches),
        ] {
            let expr = parse_expression(text).unwrap();
            match expr {
                Expr::Binary { op: parsed, .. } => assert_eq!(parsed, op),
                other => panic!("unexpected AST for {text}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_in_folds_to_set() {
        let expr = parse_expression(r#"level in ["error", "fatal"]"#).unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::In, rhs, .. } => match *rhs {
                Expr::Literal(Literal::StrSet(set)) => {
                    let expected: HashSet<String> =
                        ["error".to_string(), "fatal".to_string()].into_iter().collect();
                    assert_eq!(set, expected);
                }
                other => panic!("rhs should be a constant set: {other:?}"),
            },
            other => panic!("unexpected AST: {other:?}"),
        }
    }

    #[test]
    fn test_parse_int_array_keeps_order() {
        let expr = parse_expression("http_status in [500, 502, 503]").unwrap();
        match expr {
            Expr::Binary { rhs, .. } => assert_eq!(
                *rhs,
                Expr::Literal(Literal::Array(vec![
                    Literal::Int(500),
                    Literal::Int(502),
                    Literal::Int(503),
                ]))
            ),
            other => panic!("unexpected AST: {other:?}"),
        }
    }

    #[test]
    fn test_parse_member_access() {
        let expr = parse_expression(r#"fields.status == "200""#).unwrap();
        match expr {
            Expr::Binary { lhs, .. } => assert_eq!(
                *lhs,
                Expr::Member {
                    object: "fields".into(),
                    property: "status".into(),
                }
            ),
            other => panic!("unexpected AST: {other:?}"),
        }
    }

    #[test]
    fn test_parse_quoted_member_property() {
        // Grammar accepts it; the compiler is the one to reject bad names
        let expr = parse_expression(r#"fields."bad; DROP" == "x""#).unwrap();
        match expr {
            Expr::Binary { lhs, .. } => assert_eq!(
                *lhs,
                Expr::Member {
                    object: "fields".into(),
                    property: "bad; DROP".into(),
                }
            ),
            other => panic!("unexpected AST: {other:?}"),
        }
    }

    #[test]
    fn test_parse_time_arithmetic() {
        let expr = parse_expression(r#"timestamp > now() - duration("1h")"#).unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Gt, rhs, .. } => match *rhs {
                Expr::Binary { op: BinaryOp::Sub, lhs, rhs } => {
                    assert_eq!(
                        *lhs,
                        Expr::Call {
                            name: "now".into(),
                            args: vec![],
                        }
                    );
                    assert_eq!(
                        *rhs,
                        Expr::Call {
                            name: "duration".into(),
                            args: vec![Expr::Literal(Literal::Str("1h".into()))],
                        }
                    );
                }
                other => panic!("rhs should be subtraction: {other:?}"),
            },
            other => panic!("unexpected AST: {other:?}"),
        }
    }

    #[test]
    fn test_parse_string_escapes() {
        let expr = parse_expression(r#"message contains "say \"hi\"""#).unwrap();
        match expr {
            Expr::Binary { rhs, .. } => {
                assert_eq!(*rhs, Expr::Literal(Literal::Str("say \"hi\"".into())));
            }
            other => panic!("unexpected AST: {other:?}"),
        }
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(parse_expression(""), Err(ParseError::Empty));
        assert_eq!(parse_expression("   "), Err(ParseError::Empty));
    }

    #[test]
    fn test_parse_too_long() {
        let long = format!(r#"message contains "{}""#, "x".repeat(1200));
        assert!(matches!(
            parse_expression(&long),
            Err(ParseError::TooLong(_))
        ));
    }

    #[test]
    fn test_length_limit_counts_chars_not_bytes() {
        // 600 two-byte characters: over 1000 bytes, well under 1000 chars
        let expr = format!(r#"message contains "{}""#, "é".repeat(600));
        assert!(parse_expression(&expr).is_ok());

        // The reported length is in characters too
        let over = format!(r#"message contains "{}""#, "é".repeat(1100));
        match parse_expression(&over) {
            Err(ParseError::TooLong(n)) => assert_eq!(n, 1100 + 19),
            other => panic!("expected TooLong, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_unknown_field() {
        assert_eq!(
            parse_expression(r#"password == "hunter2""#),
            Err(ParseError::UnknownField("password".into()))
        );
        assert_eq!(
            parse_expression(r#"secrets.key == "x""#),
            Err(ParseError::UnknownField("secrets".into()))
        );
    }

    #[test]
    fn test_parse_trailing_garbage() {
        assert!(matches!(
            parse_expression(r#"level == "error" garbage"#),
            Err(ParseError::Syntax(_))
        ));
    }

    #[test]
    fn test_parse_keyword_boundary() {
        // "in" must not match the front of an identifier
        assert!(parse_expression(r#"level invalid"#).is_err());
    }
}
