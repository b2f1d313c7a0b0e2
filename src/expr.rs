// src/expr.rs
// Scalar symbolic expressions. The tree, its derivative and its parser come from RustedSciThe;
// this module adds the constructors the derivation uses and the text form equations are saved in.
// The text form is fully parenthesized, with `^` for powers, so the parser reads back the same tree.

use std::collections::{BTreeMap, BTreeSet};
use std::panic;

pub use RustedSciThe::symbolic::symbolic_engine::Expr;

use crate::error::ParseError;

pub fn sym(name: &str) -> Expr {
    Expr::Var(name.to_string())
}

pub fn num(value: f64) -> Expr {
    Expr::Const(value)
}

pub fn zero() -> Expr {
    num(0.0)
}

pub fn one() -> Expr {
    num(1.0)
}

pub fn sin(arg: Expr) -> Expr {
    Expr::sin(Box::new(arg))
}

pub fn cos(arg: Expr) -> Expr {
    Expr::cos(Box::new(arg))
}

/// `base^n`. Negative powers are written as a division.
pub fn powi(base: Expr, n: i32) -> Expr {
    match n {
        0 => one(),
        1 => base,
        n if n < 0 => one() / powi(base, -n),
        n => Expr::Pow(Box::new(base), Box::new(num(f64::from(n)))),
    }
}

/// Left-nested sum; zero when empty.
pub fn sum<I: IntoIterator<Item = Expr>>(terms: I) -> Expr {
    terms.into_iter().reduce(|acc, t| acc + t).unwrap_or_else(zero)
}

/// Left-nested product; one when empty.
pub fn product<I: IntoIterator<Item = Expr>>(factors: I) -> Expr {
    factors.into_iter().reduce(|acc, f| acc * f).unwrap_or_else(one)
}

pub fn is_zero(e: &Expr) -> bool {
    matches!(e, Expr::Const(v) if *v == 0.0)
}

pub fn free_symbols(e: &Expr) -> BTreeSet<String> {
    e.all_arguments_are_variables().into_iter().collect()
}

/// Replaces every symbol named in `values` by its number.
pub fn substitute(e: &Expr, values: &BTreeMap<String, f64>) -> Expr {
    values
        .iter()
        .fold(e.clone(), |acc, (name, value)| acc.set_variable(name, *value))
}

/// Text form read back by [`parse_expr`].
pub fn to_text(e: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, e);
    out
}

fn write_expr(out: &mut String, e: &Expr) {
    match e {
        Expr::Var(name) => out.push_str(name),
        Expr::Const(v) if *v < 0.0 => {
            out.push_str("(0-");
            out.push_str(&(-v).to_string());
            out.push(')');
        }
        Expr::Const(v) => out.push_str(&v.to_string()),
        Expr::Add(a, b) => write_binary(out, a, '+', b),
        Expr::Sub(a, b) => write_binary(out, a, '-', b),
        Expr::Mul(a, b) => write_binary(out, a, '*', b),
        Expr::Div(a, b) => write_binary(out, a, '/', b),
        Expr::Pow(a, b) => write_binary(out, a, '^', b),
        Expr::sin(a) => write_call(out, "sin", a),
        Expr::cos(a) => write_call(out, "cos", a),
        Expr::Exp(a) => write_call(out, "exp", a),
        Expr::Ln(a) => write_call(out, "ln", a),
        other => out.push_str(&format!("({other})")),
    }
}

fn write_binary(out: &mut String, a: &Expr, op: char, b: &Expr) {
    out.push('(');
    write_expr(out, a);
    out.push(op);
    write_expr(out, b);
    out.push(')');
}

fn write_call(out: &mut String, name: &str, arg: &Expr) {
    out.push_str(name);
    out.push('(');
    write_expr(out, arg);
    out.push(')');
}

const FUNCTIONS: [&str; 4] = ["sin", "cos", "exp", "ln"];

/// Checks the token sequence before handing the text to the RustedSciThe parser,
/// so malformed input becomes a [`ParseError`] with a position.
fn check_syntax(text: &str) -> Result<(), ParseError> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut want_operand = true;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        match c {
            b' ' | b'\t' => {
                i += 1;
                continue;
            }
            b'(' if want_operand => {
                depth += 1;
                i += 1;
            }
            b')' if !want_operand => {
                if depth == 0 {
                    return Err(ParseError::UnexpectedChar { ch: ')', pos: start });
                }
                depth -= 1;
                i += 1;
            }
            b'-' if want_operand => i += 1, // Unary minus.
            b'+' | b'-' | b'*' | b'/' | b'^' if !want_operand => {
                want_operand = true;
                i += 1;
            }
            b'0'..=b'9' | b'.' if want_operand => {
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                let literal = &text[start..i];
                if literal.parse::<f64>().is_err() {
                    return Err(ParseError::InvalidNumber {
                        text: literal.to_string(),
                        pos: start,
                    });
                }
                want_operand = false;
            }
            c if want_operand && (c.is_ascii_alphabetic() || c == b'_') => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                let name = &text[start..i];
                if bytes.get(i) == Some(&b'(') {
                    if !FUNCTIONS.contains(&name) {
                        return Err(ParseError::UnknownFunction {
                            name: name.to_string(),
                            pos: start,
                        });
                    }
                    // The call parenthesis opens a group; an operand follows.
                    depth += 1;
                    i += 1;
                } else {
                    want_operand = false;
                }
            }
            _ => {
                return Err(ParseError::UnexpectedChar {
                    ch: char::from(c),
                    pos: start,
                })
            }
        }
    }
    if want_operand {
        return Err(ParseError::UnexpectedEnd {
            expected: "an operand",
        });
    }
    if depth > 0 {
        return Err(ParseError::UnexpectedEnd {
            expected: "a closing parenthesis",
        });
    }
    Ok(())
}

/// Parses one scalar expression.
pub fn parse_expr(text: &str) -> Result<Expr, ParseError> {
    let text = text.trim();
    check_syntax(text)?;
    let owned = text.to_string();
    panic::catch_unwind(move || Expr::parse_expression(&owned)).map_err(|_| {
        ParseError::Rejected {
            text: text.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simplify::expand;

    #[test]
    fn text_round_trips_through_the_parser() {
        let e = sym("a") * cos(sym("phi")) / (num(2.5) + powi(sym("b"), 2)) - sym("c");
        let text = to_text(&e);
        assert_eq!(text, "(((a*cos(phi))/(2.5+(b^2)))-c)");
        let back = parse_expr(&text).unwrap();
        assert_eq!(expand(&back), expand(&e));
    }

    #[test]
    fn negative_powers_are_divisions() {
        assert_eq!(to_text(&powi(sym("L"), -2)), "(1/(L^2))");
        assert_eq!(powi(sym("L"), 1), sym("L"));
        assert_eq!(powi(sym("L"), 0), one());
    }

    #[test]
    fn empty_sum_and_product() {
        assert!(is_zero(&sum(Vec::new())));
        assert_eq!(product(Vec::new()), one());
        assert_eq!(to_text(&sum([sym("a"), sym("b"), sym("c")])), "((a+b)+c)");
    }

    #[test]
    fn substitution_leaves_other_symbols() {
        let e = sym("g") * sym("r") * sin(sym("phi"));
        let mut values = BTreeMap::new();
        values.insert("g".to_string(), 9.81);
        let partial = substitute(&e, &values);
        let names: Vec<String> = free_symbols(&partial).into_iter().collect();
        assert_eq!(names, vec!["phi".to_string(), "r".to_string()]);
    }

    #[test]
    fn malformed_text_is_rejected_before_parsing() {
        assert!(matches!(
            parse_expr("phi +"),
            Err(ParseError::UnexpectedEnd { .. })
        ));
        assert!(matches!(
            parse_expr("(phi"),
            Err(ParseError::UnexpectedEnd { .. })
        ));
        assert!(matches!(
            parse_expr("phi)"),
            Err(ParseError::UnexpectedChar { ch: ')', pos: 3 })
        ));
        assert!(matches!(
            parse_expr("tan(phi)"),
            Err(ParseError::UnknownFunction { .. })
        ));
        assert!(matches!(
            parse_expr("1.2.3*x"),
            Err(ParseError::InvalidNumber { .. })
        ));
        assert!(matches!(
            parse_expr("x $ y"),
            Err(ParseError::UnexpectedChar { ch: '$', .. })
        ));
    }
}
