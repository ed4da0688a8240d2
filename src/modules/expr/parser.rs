//! nom parser for the filter expression language.
//!
//! Precedence, loosest first: `||`, `&&`, comparisons, unary `!`, primaries.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{opt, value},
    multi::{many0, separated_list0},
    number::complete::double,
    sequence::{delimited, pair, preceded},
    IResult,
};

use super::ast::{BinOp, EvalValue, Expr};
use super::ExprError;

pub fn parse(input: &str) -> Result<Expr, ExprError> {
    let (rest, expr) = parse_or(input).map_err(|err| ExprError::Parse(err.to_string()))?;
    let rest = rest.trim();
    if !rest.is_empty() {
        return Err(ExprError::Parse(format!("trailing input: {rest}")));
    }
    Ok(expr)
}

fn parse_or(input: &str) -> IResult<&str, Expr> {
    let (input, first) = parse_and(input)?;
    let (input, rest) = many0(preceded(preceded(multispace0, tag("||")), parse_and))(input)?;
    Ok((input, fold_binary(BinOp::Or, first, rest)))
}

fn parse_and(input: &str) -> IResult<&str, Expr> {
    let (input, first) = parse_cmp(input)?;
    let (input, rest) = many0(preceded(preceded(multispace0, tag("&&")), parse_cmp))(input)?;
    Ok((input, fold_binary(BinOp::And, first, rest)))
}

fn fold_binary(op: BinOp, first: Expr, rest: Vec<Expr>) -> Expr {
    rest.into_iter()
        .fold(first, |lhs, rhs| Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
}

fn parse_cmp(input: &str) -> IResult<&str, Expr> {
    let (input, lhs) = parse_unary(input)?;
    let (input, tail) = opt(pair(preceded(multispace0, comparison_op), parse_unary))(input)?;
    Ok((input, match tail {
        Some((op, rhs)) => Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
        None => lhs,
    }))
}

fn comparison_op(input: &str) -> IResult<&str, BinOp> {
    alt((
        value(BinOp::Eq, tag("==")),
        value(BinOp::Ne, tag("!=")),
        value(BinOp::Le, tag("<=")),
        value(BinOp::Ge, tag(">=")),
        value(BinOp::Lt, tag("<")),
        value(BinOp::Gt, tag(">")),
    ))(input)
}

fn parse_unary(input: &str) -> IResult<&str, Expr> {
    let (input, _) = multispace0(input)?;
    if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>('!')(input) {
        let (rest, inner) = parse_unary(rest)?;
        return Ok((rest, Expr::Not(Box::new(inner))));
    }
    parse_primary(input)
}

fn parse_primary(input: &str) -> IResult<&str, Expr> {
    preceded(
        multispace0,
        alt((parse_paren, parse_string, parse_ident_expr, parse_number)),
    )(input)
}

fn parse_paren(input: &str) -> IResult<&str, Expr> {
    delimited(
        char('('),
        parse_or,
        preceded(multispace0, char(')')),
    )(input)
}

fn parse_string(input: &str) -> IResult<&str, Expr> {
    let (input, text) = alt((
        delimited(char('"'), take_while(|c| c != '"'), char('"')),
        delimited(char('\''), take_while(|c| c != '\''), char('\'')),
    ))(input)?;
    Ok((input, Expr::Literal(EvalValue::Str(text.to_string()))))
}

fn parse_number(input: &str) -> IResult<&str, Expr> {
    let (input, num) = double(input)?;
    Ok((input, Expr::Literal(EvalValue::Num(num))))
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

/// Keywords, `doc`-rooted paths, and function calls all start with an
/// identifier; disambiguate on what follows it.
fn parse_ident_expr(input: &str) -> IResult<&str, Expr> {
    let (input, name) = identifier(input)?;
    match name {
        "true" => Ok((input, Expr::Literal(EvalValue::Bool(true)))),
        "false" => Ok((input, Expr::Literal(EvalValue::Bool(false)))),
        "null" => Ok((input, Expr::Literal(EvalValue::Null))),
        "doc" => {
            let (input, segments) = many0(preceded(char('.'), identifier))(input)?;
            Ok((
                input,
                Expr::Path(segments.into_iter().map(str::to_string).collect()),
            ))
        }
        _ => {
            let (input, args) = delimited(
                preceded(multispace0, char('(')),
                separated_list0(preceded(multispace0, char(',')), parse_or),
                preceded(multispace0, char(')')),
            )(input)?;
            Ok((input, Expr::Call(name.to_string(), args)))
        }
    }
}
