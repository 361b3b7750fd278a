// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing for the expectation/filter expression DSL.
//!
//! The grammar is intentionally small: boolean combinators (`&&`, `||`,
//! `!`), comparisons (`==`, `!=`, `<`, `<=`, `>`, `>=`), an `in` membership
//! test, dotted identifier paths (`data.value`), string/number/bool
//! literals, and single-argument function calls (`isIPv4(s)`).

use crate::ast::{BinOp, Expr};
use crate::errors::ParseError;
use winnow::{
    ascii::{digit1, multispace0},
    combinator::{alt, cut_err, delimited, opt, preceded, repeat, separated},
    error::{ContextError, ErrMode, StrContext, StrContextValue},
    token::{one_of, take_while},
    PResult, Parser,
};

type Input<'i> = &'i str;

/// Parses a full expression, requiring the entire input to be consumed.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let mut i = input;
    let expr = ws(parse_or)
        .parse_next(&mut i)
        .map_err(|_| ParseError::syntax(input))?;
    if !i.trim().is_empty() {
        let consumed = input.len() - i.len();
        let leading_ws = i.len() - i.trim_start().len();
        let rest = &i[leading_ws..];
        return Err(ParseError::trailing(input, rest.trim_end(), consumed + leading_ws));
    }
    Ok(expr)
}

fn ws<'i, O>(
    mut parser: impl Parser<Input<'i>, O, ContextError>,
) -> impl Parser<Input<'i>, O, ContextError> {
    move |input: &mut Input<'i>| {
        multispace0.parse_next(input)?;
        let out = parser.parse_next(input)?;
        multispace0.parse_next(input)?;
        Ok(out)
    }
}

fn parse_or(input: &mut Input<'_>) -> PResult<Expr> {
    let first = parse_and.parse_next(input)?;
    let rest: Vec<Expr> = repeat(0.., preceded(ws("||"), parse_and)).parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, |acc, rhs| Expr::Binary(BinOp::Or, Box::new(acc), Box::new(rhs))))
}

fn parse_and(input: &mut Input<'_>) -> PResult<Expr> {
    let first = parse_not.parse_next(input)?;
    let rest: Vec<Expr> = repeat(0.., preceded(ws("&&"), parse_not)).parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, |acc, rhs| Expr::Binary(BinOp::And, Box::new(acc), Box::new(rhs))))
}

fn parse_not(input: &mut Input<'_>) -> PResult<Expr> {
    alt((
        preceded(ws("!"), parse_not).map(|e| Expr::Not(Box::new(e))),
        parse_comparison,
    ))
    .parse_next(input)
}

fn parse_comparison(input: &mut Input<'_>) -> PResult<Expr> {
    let lhs = parse_primary.parse_next(input)?;
    let op = opt(ws(alt((
        "==".value(BinOp::Eq),
        "!=".value(BinOp::Ne),
        "<=".value(BinOp::Le),
        ">=".value(BinOp::Ge),
        "<".value(BinOp::Lt),
        ">".value(BinOp::Gt),
        "in".value(BinOp::In),
    ))))
    .parse_next(input)?;
    match op {
        Some(op) => {
            let rhs = ws(parse_primary).parse_next(input)?;
            Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
        }
        None => Ok(lhs),
    }
}

fn parse_primary(input: &mut Input<'_>) -> PResult<Expr> {
    alt((
        delimited(ws("("), parse_or, ws(")")),
        "true".value(Expr::Bool(true)),
        "false".value(Expr::Bool(false)),
        parse_call,
        parse_ident,
        parse_string,
        parse_number,
    ))
    .parse_next(input)
}

fn parse_call(input: &mut Input<'_>) -> PResult<Expr> {
    let name = parse_bare_ident.parse_next(input)?;
    let args: Vec<Expr> = delimited(
        ws("("),
        separated(0.., parse_or, ws(",")),
        cut_err(ws(")")),
    )
    .parse_next(input)?;
    Ok(Expr::Call(name.to_string(), args))
}

fn parse_ident(input: &mut Input<'_>) -> PResult<Expr> {
    let first = parse_bare_ident.parse_next(input)?;
    let rest: Vec<&str> = repeat(0.., preceded('.', parse_bare_ident)).parse_next(input)?;
    let mut path = vec![first.to_string()];
    path.extend(rest.into_iter().map(|s| s.to_string()));
    Ok(Expr::Ident(path))
}

fn parse_bare_ident<'i>(input: &mut Input<'i>) -> PResult<&'i str> {
    (
        one_of(|c: char| c.is_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

fn parse_string(input: &mut Input<'_>) -> PResult<Expr> {
    delimited(
        '"',
        take_while(0.., |c: char| c != '"').map(|s: &str| s.to_string()),
        cut_err('"'.context(StrContext::Expected(StrContextValue::CharLiteral('"')))),
    )
    .map(Expr::Str)
    .parse_next(input)
}

fn parse_number(input: &mut Input<'_>) -> PResult<Expr> {
    (opt('-'), digit1, opt(preceded('.', digit1)))
        .take()
        .try_map(|s: &str| s.parse::<f64>().map_err(|_| ErrMode::Backtrack(ContextError::new())))
        .map(Expr::Number)
        .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test]
    fn parses_simple_comparison() {
        let expr = parse("data.size > 100").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinOp::Gt,
                Box::new(Expr::Ident(vec!["data".into(), "size".into()])),
                Box::new(Expr::Number(100.0)),
            )
        );
    }

    #[test]
    fn parses_logical_combinators() {
        let expr = parse("status == true && !(data.size < 1)").unwrap();
        assert!(matches!(expr, Expr::Binary(BinOp::And, _, _)));
    }

    #[test]
    fn parses_function_call() {
        let expr = parse(r#"isIPv4(data.address)"#).unwrap();
        match expr {
            Expr::Call(name, args) => {
                assert_eq!(name, "isIPv4");
                assert_eq!(args.len(), 1);
            }
            other => panic!("unexpected expr: {other:?}"),
        }
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse("true true").is_err());
    }

    #[test]
    fn trailing_garbage_reports_the_exact_unparsed_span() {
        let err = parse("true true").unwrap_err();
        match err {
            ParseError::Trailing { span, trailing, .. } => {
                assert_eq!(trailing, "true");
                assert_eq!(span, (5, 4).into());
            }
            other => panic!("expected Trailing, got {other:?}"),
        }
    }

    #[test_case(BinOp::Eq; "equals")]
    #[test_case(BinOp::Ne; "not equals")]
    #[test_case(BinOp::Lt; "less than")]
    #[test_case(BinOp::Le; "less than or equal")]
    #[test_case(BinOp::Gt; "greater than")]
    #[test_case(BinOp::Ge; "greater than or equal")]
    fn parses_every_comparison_operator(op: BinOp) {
        let source = format!("data.value {} 1", op.as_str());
        let expr = parse(&source).unwrap();
        assert!(matches!(expr, Expr::Binary(actual, _, _) if actual == op));
    }

    fn ident_fragment() -> impl Strategy<Value = String> {
        // Excludes tokens the grammar reserves as literals/operators so a
        // generated identifier segment can never be swallowed as a keyword.
        "[a-z][a-z0-9_]{0,8}"
            .prop_filter("not a reserved word", |s| !matches!(s.as_str(), "true" | "false" | "in"))
    }

    fn comparison_op() -> impl Strategy<Value = BinOp> {
        prop_oneof![
            Just(BinOp::Eq),
            Just(BinOp::Ne),
            Just(BinOp::Lt),
            Just(BinOp::Le),
            Just(BinOp::Gt),
            Just(BinOp::Ge),
        ]
    }

    proptest! {
        /// Any `<ident>.<ident> <op> <number>` comparison parses to a
        /// `Binary` node carrying the same operator and a two-segment
        /// `Ident` path, regardless of which identifiers or operator are
        /// chosen.
        #[test]
        fn arbitrary_field_comparisons_parse_to_the_matching_binary_node(
            root in ident_fragment(),
            field in ident_fragment(),
            op in comparison_op(),
            n in -1000i64..1000,
        ) {
            let source = format!("{root}.{field} {} {n}", op.as_str());
            let expr = parse(&source).unwrap();
            match expr {
                Expr::Binary(actual_op, lhs, rhs) => {
                    prop_assert_eq!(actual_op, op);
                    prop_assert_eq!(*lhs, Expr::Ident(vec![root, field]));
                    prop_assert_eq!(*rhs, Expr::Number(n as f64));
                }
                other => prop_assert!(false, "unexpected expr: {:?}", other),
            }
        }

        /// Wrapping any parseable expression in redundant parentheses never
        /// changes the parsed tree.
        #[test]
        fn redundant_parentheses_are_transparent(
            root in ident_fragment(),
            field in ident_fragment(),
            op in comparison_op(),
            n in -1000i64..1000,
        ) {
            let source = format!("{root}.{field} {} {n}", op.as_str());
            let bare = parse(&source).unwrap();
            let parenthesized = parse(&format!("({source})")).unwrap();
            prop_assert_eq!(bare, parenthesized);
        }
    }
}
