// src/error.rs
// Error types shared by the parser, the numeric evaluator and the simulation pipeline.

use std::io;

/// Failure while reading an equation back from its text form.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected character {ch:?} at offset {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unexpected token {found:?} at offset {pos}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        pos: usize,
    },

    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("unknown function {name:?} at offset {pos}")]
    UnknownFunction { name: String, pos: usize },

    #[error("expression {text:?} was rejected by the symbolic parser")]
    Rejected { text: String },

    #[error("matrix row {row} has {found} entries, expected {expected}")]
    RaggedMatrix {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("invalid number {text:?} at offset {pos}")]
    InvalidNumber { text: String, pos: usize },
}

/// Failure while evaluating a lambdified expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("expected {expected} arguments, got {got}")]
    Arity { expected: usize, got: usize },

    #[error("symbol {0:?} has no value; substitute every constant before evaluating")]
    UnboundSymbol(String),
}

/// Crate-wide error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("cannot parse equation: {0}")]
    Parse(#[from] ParseError),

    #[error("cannot evaluate dynamics: {0}")]
    Eval(#[from] EvalError),

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("bad initial condition: {0}")]
    InitialCondition(String),

    #[error("invalid time grid: tf={tf}, dt={dt}")]
    InvalidTimeGrid { tf: f64, dt: f64 },

    #[error("state became non-finite at t={t}")]
    Diverged { t: f64 },

    #[error("plotting failed: {0}")]
    Plot(String),

    #[error("bad configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
