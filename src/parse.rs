// src/parse.rs
// Reads a matrix back from the text written by the Display impl of SymMatrix:
//   Matrix([[e00, e01], [e10, e11]])
// Rows and entries are split at top-level brackets and commas; every entry goes to expr::parse_expr.

use std::str::FromStr;

use crate::error::ParseError;
use crate::expr::{parse_expr, Expr};
use crate::matrix::SymMatrix;

/// Splits `text` at commas that are not nested in parentheses or brackets.
/// `offset` is the position of `text` in the whole input, for error messages.
fn split_top_level(text: &str, offset: usize) -> Result<Vec<(usize, &str)>, ParseError> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => {
                depth = depth.checked_sub(1).ok_or(ParseError::UnexpectedChar {
                    ch: c,
                    pos: offset + i,
                })?;
            }
            ',' if depth == 0 => {
                parts.push((offset + start, &text[start..i]));
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth > 0 {
        return Err(ParseError::UnexpectedEnd {
            expected: "a closing bracket",
        });
    }
    parts.push((offset + start, &text[start..]));
    Ok(parts)
}

/// Strips `open ... close` around `text`, reporting `expected` when they are missing.
fn unwrap<'a>(
    text: &'a str,
    offset: usize,
    open: &str,
    close: &str,
    expected: &'static str,
) -> Result<(usize, &'a str), ParseError> {
    let trimmed = text.trim_start();
    let lead = text.len() - trimmed.len();
    let trimmed = trimmed.trim_end();
    match trimmed.strip_prefix(open).and_then(|t| t.strip_suffix(close)) {
        Some(inner) => Ok((offset + lead + open.len(), inner)),
        None => Err(ParseError::UnexpectedToken {
            found: trimmed.chars().take(16).collect(),
            expected,
            pos: offset + lead,
        }),
    }
}

fn parse_entry(pos: usize, text: &str) -> Result<Expr, ParseError> {
    parse_expr(text).map_err(|e| match e {
        ParseError::UnexpectedChar { ch, pos: p } => ParseError::UnexpectedChar {
            ch,
            pos: pos + p + (text.len() - text.trim_start().len()),
        },
        other => other,
    })
}

/// Parses `Matrix([[..], [..]])`. A row may also be a bare expression, which is a 1-column row.
pub fn parse_matrix(text: &str) -> Result<SymMatrix, ParseError> {
    let (pos, inner) = unwrap(text, 0, "Matrix(", ")", "Matrix(")?;
    let (pos, rows_text) = unwrap(inner, pos, "[", "]", "[")?;
    let mut rows = Vec::new();
    for (row_pos, row_text) in split_top_level(rows_text, pos)? {
        let row = if row_text.trim_start().starts_with('[') {
            let (entries_pos, entries) = unwrap(row_text, row_pos, "[", "]", "[")?;
            split_top_level(entries, entries_pos)?
                .into_iter()
                .map(|(p, e)| parse_entry(p, e))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            vec![parse_entry(row_pos, row_text)?]
        };
        if let Some(first) = rows.first().map(Vec::len) {
            if row.len() != first {
                return Err(ParseError::RaggedMatrix {
                    row: rows.len(),
                    found: row.len(),
                    expected: first,
                });
            }
        }
        rows.push(row);
    }
    Ok(SymMatrix::from_rows(rows))
}

impl FromStr for SymMatrix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_matrix(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{cos, num, powi, sym};
    use crate::simplify::expand;

    #[test]
    fn reads_back_printed_matrix() {
        let m = SymMatrix::from_rows(vec![
            vec![sym("a") * cos(sym("phi")), powi(sym("L"), -2)],
            vec![num(0.5) * sym("mc"), sym("u") - sym("x")],
        ]);
        let back: SymMatrix = m.to_string().parse().unwrap();
        assert_eq!(back.shape(), (2, 2));
        assert_eq!(back.expand(), m.expand());
    }

    #[test]
    fn bare_rows_form_a_column() {
        let m = parse_matrix("Matrix([x, (2*y)])").unwrap();
        assert_eq!(m.shape(), (2, 1));
        assert_eq!(expand(&m[(1, 0)]), expand(&(num(2.0) * sym("y"))));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        assert_eq!(
            parse_matrix("Matrix([[a, b], [c]])"),
            Err(ParseError::RaggedMatrix {
                row: 1,
                found: 1,
                expected: 2
            })
        );
    }

    #[test]
    fn missing_wrapper_is_rejected() {
        assert!(matches!(
            parse_matrix("[[a]]"),
            Err(ParseError::UnexpectedToken { expected: "Matrix(", .. })
        ));
        assert!(matches!(
            parse_matrix("Matrix([[a]]"),
            Err(ParseError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn bad_entry_reports_its_position() {
        assert_eq!(
            parse_matrix("Matrix([[a, b $ c]])"),
            Err(ParseError::UnexpectedChar { ch: '$', pos: 14 })
        );
    }
}
