// src/lambdify.rs
// Turns a symbolic equation into a numeric callable.
// Physical constants are substituted first; every remaining entry is compiled with RustedSciThe's
// lambdify over the fixed argument order phi, theta, x, phidot, thetadot, xdot, u.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use crate::error::EvalError;
use crate::expr::Expr;
use crate::math::{DynamicsMatrices, CONSTANTS};
use crate::matrix::SymMatrix;

/// Argument order of every lambdified sliderbot function.
pub const ARGUMENTS: [&str; 7] = ["phi", "theta", "x", "phidot", "thetadot", "xdot", "u"];

/// Physical constants of one sliderbot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constants {
    pub g: f64, // Gravitational acceleration.
    pub r: f64, // Pendulum length (pivot to wheel center).
    pub l: f64, // Wheel radius, the symbol L.
    pub mp: f64, // Wheel mass.
    pub mc: f64, // Cart mass.
}

impl Default for Constants {
    fn default() -> Self {
        Self {
            g: 10.0,
            r: 1.0,
            l: 0.1,
            mp: 1.0,
            mc: 1.0,
        }
    }
}

impl Constants {
    pub fn values(&self) -> [f64; 5] {
        [self.g, self.r, self.l, self.mp, self.mc]
    }

    /// Symbol -> value map for every constant.
    pub fn substitutions(&self) -> BTreeMap<String, f64> {
        CONSTANTS
            .iter()
            .zip(self.values())
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }
}

/// A matrix expression with a fixed argument list, ready to be compiled.
#[derive(Debug, Clone)]
pub struct Lambdified {
    args: Vec<String>,
    shape: (usize, usize),
    entries: Vec<Expr>,
    free: BTreeSet<String>,
}

impl Lambdified {
    pub fn new(eq: &SymMatrix, args: &[&str]) -> Self {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let free = eq
            .free_symbols()
            .into_iter()
            .filter(|name| !args.contains(name))
            .collect();
        Self {
            args,
            shape: eq.shape(),
            entries: eq.entries().to_vec(),
            free,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Symbols that are neither arguments nor substituted.
    pub fn free_symbols(&self) -> BTreeSet<String> {
        self.free.clone()
    }

    /// Compiles every entry. Fails when a symbol has no value, since the compiled closures
    /// cannot report it at call time.
    pub fn compile(&self) -> Result<NumericFn<'_>, EvalError> {
        if let Some(name) = self.free.iter().next() {
            return Err(EvalError::UnboundSymbol(name.clone()));
        }
        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        let entries = self
            .entries
            .iter()
            .map(|e| e.lambdify(args.clone()))
            .collect();
        Ok(NumericFn {
            arity: self.args.len(),
            entries,
        })
    }

    /// Compiles and evaluates once. Use [`Lambdified::compile`] for repeated calls.
    pub fn call(&self, values: &[f64]) -> Result<Vec<f64>, EvalError> {
        check_arity(self.args.len(), values)?;
        self.compile()?.call(values)
    }
}

fn check_arity(expected: usize, values: &[f64]) -> Result<(), EvalError> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(EvalError::Arity {
            expected,
            got: values.len(),
        })
    }
}

/// Compiled entries of a [`Lambdified`], evaluated row-major.
pub struct NumericFn<'a> {
    arity: usize,
    entries: Vec<Box<dyn Fn(Vec<f64>) -> f64 + 'a>>,
}

impl NumericFn<'_> {
    pub fn call(&self, values: &[f64]) -> Result<Vec<f64>, EvalError> {
        check_arity(self.arity, values)?;
        Ok(self.entries.iter().map(|f| f(values.to_vec())).collect())
    }
}

/// Substitutes `substitutions` into `eq` and binds the rest to [`ARGUMENTS`].
pub fn lambdify(eq: &SymMatrix, substitutions: &BTreeMap<String, f64>) -> Lambdified {
    let f = Lambdified::new(&eq.subs(substitutions), &ARGUMENTS);
    let free = f.free_symbols();
    if free.is_empty() {
        debug!("lambdified {}x{} equation", f.shape.0, f.shape.1);
    } else {
        warn!("lambdified equation still has free symbols {free:?}; calls will fail");
    }
    f
}

/// D, C*qdot, G and B compiled separately; the accelerations come from a numeric linear solve
/// instead of the symbolic inverse.
#[derive(Debug, Clone)]
pub struct MatrixDynamics {
    pub inertia: Lambdified,
    pub coriolis: Lambdified,
    pub gravity: Lambdified,
    pub input: Lambdified,
}

impl MatrixDynamics {
    pub fn new(matrices: &DynamicsMatrices, substitutions: &BTreeMap<String, f64>) -> Self {
        Self {
            inertia: lambdify(&matrices.inertia, substitutions),
            coriolis: lambdify(&matrices.coriolis, substitutions),
            gravity: lambdify(&matrices.gravity, substitutions),
            input: lambdify(&matrices.input, substitutions),
        }
    }

    pub fn compile(&self) -> Result<NumericMatrices<'_>, EvalError> {
        Ok(NumericMatrices {
            inertia: self.inertia.compile()?,
            coriolis: self.coriolis.compile()?,
            gravity: self.gravity.compile()?,
            input: self.input.compile()?,
        })
    }
}

/// Compiled form of [`MatrixDynamics`].
pub struct NumericMatrices<'a> {
    pub inertia: NumericFn<'a>,
    pub coriolis: NumericFn<'a>,
    pub gravity: NumericFn<'a>,
    pub input: NumericFn<'a>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{self, sin, sym};
    use approx::assert_relative_eq;

    #[test]
    fn evaluates_in_argument_order() {
        let eq = SymMatrix::column(vec![
            sym("g") * sin(sym("phi")),
            sym("u") / sym("mp") + sym("xdot"),
        ]);
        let f = lambdify(&eq, &Constants::default().substitutions());
        assert!(f.free_symbols().is_empty());
        let compiled = f.compile().unwrap();
        let out = compiled.call(&[0.5, 0.0, 0.0, 0.0, 0.0, 2.0, 3.0]).unwrap();
        assert_relative_eq!(out[0], 10.0 * 0.5f64.sin());
        assert_relative_eq!(out[1], 5.0);
        assert_eq!(f.call(&[0.5, 0.0, 0.0, 0.0, 0.0, 2.0, 3.0]).unwrap(), out);
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let f = lambdify(&SymMatrix::symbols(&["phi"]), &BTreeMap::new());
        let expected = Err(EvalError::Arity {
            expected: 7,
            got: 2,
        });
        assert_eq!(f.call(&[1.0, 2.0]), expected);
        assert_eq!(f.compile().unwrap().call(&[1.0, 2.0]), expected);
    }

    #[test]
    fn partial_substitution_fails_on_call() {
        let eq = SymMatrix::column(vec![sym("g") * sym("r") * sym("phi")]);
        let mut partial = BTreeMap::new();
        partial.insert("g".to_string(), 9.81);
        let f = lambdify(&eq, &partial);
        assert_eq!(f.free_symbols().into_iter().collect::<Vec<_>>(), vec!["r"]);
        assert_eq!(
            f.call(&[0.0; 7]),
            Err(EvalError::UnboundSymbol("r".to_string()))
        );
        assert!(matches!(f.compile(), Err(EvalError::UnboundSymbol(_))));
    }

    #[test]
    fn substitution_map_names_every_constant() {
        let subs = Constants {
            g: 9.81,
            r: 0.3,
            l: 0.05,
            mp: 0.2,
            mc: 1.5,
        }
        .substitutions();
        assert_eq!(subs.len(), 5);
        assert_eq!(subs["L"], 0.05);
        assert_eq!(subs["mc"], 1.5);
    }

    #[test]
    fn constant_entries_ignore_arguments() {
        let eq = SymMatrix::column(vec![expr::num(4.0), expr::zero()]);
        let f = lambdify(&eq, &BTreeMap::new());
        let out = f.call(&[1.0; 7]).unwrap();
        assert_eq!(out, vec![4.0, 0.0]);
    }
}
