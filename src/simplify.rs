// src/simplify.rs
// Polynomial canonical form used for expansion, coefficient matching and the sin^2 + cos^2 rule.
// A Poly is a sum of monomials; a monomial maps atoms (symbols, sin/cos of a canonical argument,
// or anything that does not expand, such as the inverse of a sum) to integer exponents.

use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::expr::{self, Expr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum AtomKind {
    Symbol,
    Sin,
    Cos,
    Opaque,
}

/// A factor that Poly does not look inside. Atoms compare by kind and printed form.
#[derive(Debug, Clone)]
pub struct Atom {
    kind: AtomKind,
    key: String,
    expr: Expr,
}

impl Atom {
    pub fn symbol(name: &str) -> Atom {
        Atom {
            kind: AtomKind::Symbol,
            key: name.to_string(),
            expr: expr::sym(name),
        }
    }

    fn sin(arg: Expr) -> Atom {
        Atom {
            kind: AtomKind::Sin,
            key: expr::to_text(&arg),
            expr: expr::sin(arg),
        }
    }

    fn cos(arg: Expr) -> Atom {
        Atom {
            kind: AtomKind::Cos,
            key: expr::to_text(&arg),
            expr: expr::cos(arg),
        }
    }

    fn opaque(e: Expr) -> Atom {
        Atom {
            kind: AtomKind::Opaque,
            key: expr::to_text(&e),
            expr: e,
        }
    }

    /// `cos(a)` for the atom `sin(a)`.
    fn cos_partner(&self) -> Option<Atom> {
        match (&self.kind, &self.expr) {
            (AtomKind::Sin, Expr::sin(arg)) => Some(Atom::cos((**arg).clone())),
            _ => None,
        }
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.key == other.key
    }
}

impl Eq for Atom {}

impl PartialOrd for Atom {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Atom {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.kind, &self.key).cmp(&(other.kind, &other.key))
    }
}

pub type Monomial = BTreeMap<Atom, i32>;

/// Builds a monomial out of symbol names and exponents, e.g. `[("phidot", 1), ("xdot", 1)]`.
pub fn monomial(parts: &[(&str, i32)]) -> Monomial {
    parts
        .iter()
        .map(|(name, power)| (Atom::symbol(name), *power))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Poly {
    terms: BTreeMap<Monomial, f64>,
}

impl Poly {
    pub fn constant(value: f64) -> Poly {
        let mut p = Poly::default();
        p.insert(Monomial::new(), value);
        p
    }

    pub fn atom(atom: Atom, power: i32) -> Poly {
        let mut mono = Monomial::new();
        mono.insert(atom, power);
        let mut p = Poly::default();
        p.insert(mono, 1.0);
        p
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    fn insert(&mut self, mono: Monomial, c: f64) {
        match self.terms.entry(mono) {
            Entry::Occupied(mut e) => {
                *e.get_mut() += c;
                // Exact cancellation; the derivation only produces dyadic coefficients.
                if *e.get() == 0.0 {
                    e.remove();
                }
            }
            Entry::Vacant(e) => {
                if c != 0.0 {
                    e.insert(c);
                }
            }
        }
    }

    /// The value of a polynomial without atoms.
    pub fn as_constant(&self) -> Option<f64> {
        match self.terms.iter().next() {
            None => Some(0.0),
            Some((mono, c)) if self.len() == 1 && mono.is_empty() => Some(*c),
            _ => None,
        }
    }

    fn as_integer(&self) -> Option<i32> {
        self.as_constant()
            .filter(|v| v.fract() == 0.0 && v.abs() <= f64::from(i32::MAX))
            .map(|v| v as i32)
    }

    pub fn from_expr(e: &Expr) -> Poly {
        match e {
            Expr::Const(v) => Poly::constant(*v),
            Expr::Var(name) => Poly::atom(Atom::symbol(name), 1),
            Expr::Add(a, b) => Poly::from_expr(a).add(&Poly::from_expr(b)),
            Expr::Sub(a, b) => Poly::from_expr(a).add(&Poly::from_expr(b).scale(-1.0)),
            Expr::Mul(a, b) => Poly::from_expr(a).mul(&Poly::from_expr(b)),
            Expr::Div(a, b) => Poly::from_expr(a).mul(&Poly::from_expr(b).inverse()),
            Expr::Pow(base, exponent) => match Poly::from_expr(exponent).as_integer() {
                Some(n) if n >= 0 => Poly::from_expr(base).powi(n.unsigned_abs()),
                Some(n) => Poly::from_expr(base).inverse().powi(n.unsigned_abs()),
                None => Poly::atom(Atom::opaque(e.clone()), 1),
            },
            Expr::sin(arg) => {
                let arg = Poly::from_expr(arg);
                match arg.as_constant() {
                    Some(v) => Poly::constant(v.sin()),
                    None => Poly::atom(Atom::sin(arg.to_expr()), 1),
                }
            }
            Expr::cos(arg) => {
                let arg = Poly::from_expr(arg);
                match arg.as_constant() {
                    Some(v) => Poly::constant(v.cos()),
                    None => Poly::atom(Atom::cos(arg.to_expr()), 1),
                }
            }
            other => Poly::atom(Atom::opaque(other.clone()), 1),
        }
    }

    pub fn add(&self, other: &Poly) -> Poly {
        let mut out = self.clone();
        for (mono, c) in &other.terms {
            out.insert(mono.clone(), *c);
        }
        out
    }

    pub fn mul(&self, other: &Poly) -> Poly {
        let mut out = Poly::default();
        for (ma, ca) in &self.terms {
            for (mb, cb) in &other.terms {
                let mut mono = ma.clone();
                for (atom, p) in mb {
                    let e = mono.entry(atom.clone()).or_insert(0);
                    *e += p;
                    if *e == 0 {
                        mono.remove(atom);
                    }
                }
                out.insert(mono, ca * cb);
            }
        }
        out
    }

    pub fn powi(&self, n: u32) -> Poly {
        (0..n).fold(Poly::constant(1.0), |acc, _| acc.mul(self))
    }

    pub fn scale(&self, factor: f64) -> Poly {
        let mut out = Poly::default();
        for (mono, c) in &self.terms {
            out.insert(mono.clone(), c * factor);
        }
        out
    }

    /// 1/self. Only a single monomial inverts exactly; anything else becomes an opaque atom.
    pub fn inverse(&self) -> Poly {
        match self.terms.iter().next() {
            Some((mono, c)) if self.len() == 1 => {
                let inverted = mono.iter().map(|(a, p)| (a.clone(), -p)).collect();
                let mut out = Poly::default();
                out.insert(inverted, 1.0 / c);
                out
            }
            _ => Poly::atom(Atom::opaque(self.to_expr()), -1),
        }
    }

    /// Rewrites `c*m*sin(a)^2 + c*m*cos(a)^2` into `c*m` until nothing matches.
    pub fn trigsimp(mut self) -> Poly {
        while let Some((sin_term, cos_term, rest, c)) = self.find_pythagorean_pair() {
            self.terms.remove(&sin_term);
            self.terms.remove(&cos_term);
            self.insert(rest, c);
        }
        self
    }

    fn find_pythagorean_pair(&self) -> Option<(Monomial, Monomial, Monomial, f64)> {
        for (mono, c) in &self.terms {
            for (atom, p) in mono {
                let Some(cos_atom) = atom.cos_partner() else { continue };
                if *p < 2 {
                    continue;
                }
                let mut rest = mono.clone();
                if *p == 2 {
                    rest.remove(atom);
                } else {
                    rest.insert(atom.clone(), p - 2);
                }
                let mut partner = rest.clone();
                *partner.entry(cos_atom).or_insert(0) += 2;
                if self.terms.get(&partner) == Some(c) {
                    return Some((mono.clone(), partner, rest, *c));
                }
            }
        }
        None
    }

    /// Coefficient of `target`: the terms holding exactly those powers, with `target` divided out.
    pub fn coeff(&self, target: &Monomial) -> Poly {
        let mut out = Poly::default();
        for (mono, c) in &self.terms {
            if target.iter().all(|(atom, p)| mono.get(atom) == Some(p)) {
                let mut rest = mono.clone();
                for atom in target.keys() {
                    rest.remove(atom);
                }
                out.insert(rest, *c);
            }
        }
        out
    }

    /// Canonical tree: positive terms in monomial order, then the negative ones subtracted,
    /// with negative powers as a denominator, so every constant in the tree is non-negative.
    pub fn to_expr(&self) -> Expr {
        let positive = self.terms.iter().filter(|(_, c)| **c > 0.0);
        let negative = self.terms.iter().filter(|(_, c)| **c < 0.0);
        let mut acc = None;
        for (mono, c) in positive {
            let term = term_expr(mono, *c);
            acc = Some(match acc {
                None => term,
                Some(a) => a + term,
            });
        }
        for (mono, c) in negative {
            acc = Some(acc.unwrap_or_else(expr::zero) - term_expr(mono, -c));
        }
        acc.unwrap_or_else(expr::zero)
    }
}

fn term_expr(mono: &Monomial, magnitude: f64) -> Expr {
    let coefficient = (magnitude != 1.0 || mono.is_empty()).then(|| expr::num(magnitude));
    let numerator = coefficient.into_iter().chain(
        mono.iter()
            .filter(|(_, p)| **p > 0)
            .map(|(atom, p)| expr::powi(atom.expr.clone(), *p)),
    );
    let numerator = expr::product(numerator);
    let denominator: Vec<Expr> = mono
        .iter()
        .filter(|(_, p)| **p < 0)
        .map(|(atom, p)| expr::powi(atom.expr.clone(), -p))
        .collect();
    if denominator.is_empty() {
        numerator
    } else {
        numerator / expr::product(denominator)
    }
}

/// Fully distributes products and integer powers.
pub fn expand(e: &Expr) -> Expr {
    Poly::from_expr(e).to_expr()
}

/// Expansion followed by the Pythagorean identity.
pub fn simplify(e: &Expr) -> Expr {
    Poly::from_expr(e).trigsimp().to_expr()
}
