// src/lib.rs
// Sliderbot: a cart carrying an inverted pendulum balanced by a reaction wheel.
// Symbolic derivation of the equations of motion, text persistence, numeric compilation,
// closed-loop simulation and plotting.

pub mod config;
pub mod error;
pub mod expr;
pub mod lambdify;
pub mod logic;
pub mod math;
pub mod matrix;
pub mod motor;
pub mod parse;
pub mod persist;
pub mod simplify;
pub mod ui;

pub use config::SimConfig;
pub use error::{Error, Result};
pub use expr::Expr;
pub use lambdify::{lambdify, Constants, Lambdified, MatrixDynamics, NumericFn};
pub use logic::{run_simulation, simulate, SliderbotSolver, Trajectory};
pub use matrix::SymMatrix;
