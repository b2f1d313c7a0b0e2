// src/matrix.rs
// Dense symbolic matrices, stored row-major.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops;

use crate::expr::{self, Expr};
use crate::simplify;

#[derive(Debug, Clone, PartialEq)]
pub struct SymMatrix {
    rows: usize,
    cols: usize,
    data: Vec<Expr>,
}

impl SymMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![expr::zero(); rows * cols],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.set(i, i, expr::one());
        }
        m
    }

    /// Panics on ragged input.
    pub fn from_rows(rows: Vec<Vec<Expr>>) -> Self {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        assert!(
            rows.iter().all(|r| r.len() == n_cols),
            "ragged matrix rows"
        );
        Self {
            rows: n_rows,
            cols: n_cols,
            data: rows.into_iter().flatten().collect(),
        }
    }

    pub fn column(entries: Vec<Expr>) -> Self {
        Self {
            rows: entries.len(),
            cols: 1,
            data: entries,
        }
    }

    /// Column of symbols.
    pub fn symbols(names: &[&str]) -> Self {
        Self::column(names.iter().map(|n| expr::sym(n)).collect())
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn entries(&self) -> &[Expr] {
        &self.data
    }

    pub fn get(&self, i: usize, j: usize) -> &Expr {
        &self.data[i * self.cols + j]
    }

    pub fn set(&mut self, i: usize, j: usize, value: Expr) {
        self.data[i * self.cols + j] = value;
    }

    pub fn map<F: Fn(&Expr) -> Expr>(&self, f: F) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(f).collect(),
        }
    }

    pub fn transpose(&self) -> Self {
        let mut out = Self::zeros(self.cols, self.rows);
        for i in 0..self.rows {
            for j in 0..self.cols {
                out.set(j, i, self.get(i, j).clone());
            }
        }
        out
    }

    pub fn scale(&self, factor: &Expr) -> Self {
        self.map(|e| e.clone() * factor.clone())
    }

    pub fn expand(&self) -> Self {
        self.map(simplify::expand)
    }

    pub fn simplify(&self) -> Self {
        self.map(simplify::simplify)
    }

    /// Replaces the named symbols by numbers.
    pub fn subs(&self, values: &BTreeMap<String, f64>) -> Self {
        self.map(|e| expr::substitute(e, values))
    }

    pub fn free_symbols(&self) -> BTreeSet<String> {
        self.data.iter().flat_map(expr::free_symbols).collect()
    }

    /// `J[i][j] = d self[i] / d vars[j]` for a column vector.
    pub fn jacobian(&self, vars: &[&str]) -> Self {
        assert_eq!(self.cols, 1, "jacobian needs a column vector");
        let mut out = Self::zeros(self.rows, vars.len());
        for i in 0..self.rows {
            for (j, var) in vars.iter().enumerate() {
                out.set(i, j, self.get(i, 0).diff(var));
            }
        }
        out
    }

    pub fn is_symmetric(&self) -> bool {
        self.rows == self.cols
            && (0..self.rows).all(|i| (0..i).all(|j| self.get(i, j) == self.get(j, i)))
    }

    /// Matrix with row `row` and column `col` removed.
    pub fn minor(&self, row: usize, col: usize) -> Self {
        let mut data = Vec::with_capacity((self.rows - 1) * (self.cols - 1));
        for i in (0..self.rows).filter(|&i| i != row) {
            for j in (0..self.cols).filter(|&j| j != col) {
                data.push(self.get(i, j).clone());
            }
        }
        Self {
            rows: self.rows - 1,
            cols: self.cols - 1,
            data,
        }
    }

    /// Determinant by cofactor expansion along the first row.
    pub fn det(&self) -> Expr {
        assert_eq!(self.rows, self.cols, "determinant of a non-square matrix");
        match self.rows {
            0 => expr::one(),
            1 => self.get(0, 0).clone(),
            2 => {
                self.get(0, 0).clone() * self.get(1, 1).clone()
                    - self.get(0, 1).clone() * self.get(1, 0).clone()
            }
            n => expr::sum((0..n).filter(|&j| !expr::is_zero(self.get(0, j))).map(|j| {
                expr::product([
                    expr::num(cofactor_sign(0, j)),
                    self.get(0, j).clone(),
                    self.minor(0, j).det(),
                ])
            })),
        }
    }

    /// Transposed cofactor matrix, so that `A * adj(A) = det(A) * I`.
    pub fn adjugate(&self) -> Self {
        assert_eq!(self.rows, self.cols, "adjugate of a non-square matrix");
        let n = self.rows;
        if n == 1 {
            return Self::identity(1);
        }
        let mut out = Self::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                let cofactor = expr::num(cofactor_sign(i, j)) * self.minor(i, j).det();
                out.set(j, i, cofactor);
            }
        }
        out
    }
}

fn cofactor_sign(i: usize, j: usize) -> f64 {
    if (i + j) % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

impl ops::Index<(usize, usize)> for SymMatrix {
    type Output = Expr;
    fn index(&self, (i, j): (usize, usize)) -> &Expr {
        self.get(i, j)
    }
}

impl ops::Add for &SymMatrix {
    type Output = SymMatrix;
    fn add(self, rhs: &SymMatrix) -> SymMatrix {
        assert_eq!(self.shape(), rhs.shape(), "shape mismatch in matrix sum");
        SymMatrix {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(&rhs.data)
                .map(|(a, b)| a.clone() + b.clone())
                .collect(),
        }
    }
}

impl ops::Sub for &SymMatrix {
    type Output = SymMatrix;
    fn sub(self, rhs: &SymMatrix) -> SymMatrix {
        assert_eq!(self.shape(), rhs.shape(), "shape mismatch in matrix difference");
        SymMatrix {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(&rhs.data)
                .map(|(a, b)| a.clone() - b.clone())
                .collect(),
        }
    }
}

impl ops::Mul for &SymMatrix {
    type Output = SymMatrix;
    fn mul(self, rhs: &SymMatrix) -> SymMatrix {
        assert_eq!(self.cols, rhs.rows, "shape mismatch in matrix product");
        let mut out = SymMatrix::zeros(self.rows, rhs.cols);
        for i in 0..self.rows {
            for j in 0..rhs.cols {
                out.set(
                    i,
                    j,
                    expr::sum((0..self.cols).map(|k| self.get(i, k).clone() * rhs.get(k, j).clone())),
                );
            }
        }
        out
    }
}

impl fmt::Display for SymMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Matrix([")?;
        for i in 0..self.rows {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str("[")?;
            for j in 0..self.cols {
                if j > 0 {
                    f.write_str(", ")?;
                }
                f.write_str(&expr::to_text(self.get(i, j)))?;
            }
            f.write_str("]")?;
        }
        f.write_str("])")
    }
}
