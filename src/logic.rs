// src/logic.rs
// Simulation driver: closed-loop sliderbot dynamics integrated with error-controlled RK4.
// State y = [phi, theta, x, phidot, thetadot, xdot]; dy/dt = [qdot, qddot] where qddot comes from the
// lambdified equation (or from the component matrices and a linear solve).
// The controller is evaluated inside every rhs call, so each RK4 stage sees its own control input.
// Samples are reported on the grid t_i = i*dt; between grid points the step size adapts, because the
// closed loop is stiff (fast eigenvalue near -290 with the default gains) and a plain dt = 0.01 RK4
// step is outside its stability region.

use std::sync::OnceLock;
use std::time::Instant;

use log::{debug, info};

use crate::config::SimConfig;
use crate::error::{Error, EvalError, Result};
use crate::lambdify::{lambdify, NumericFn, NumericMatrices};
use crate::math::{solve_dynam, N};
use crate::matrix::SymMatrix;
use crate::motor::Motor;
use crate::persist::load_equation;

/// Length of the state vector.
pub const STATE_LEN: usize = 2 * N;

pub type State = [f64; STATE_LEN];

/// Largest number of grid samples one run may produce.
pub const MAX_SAMPLES: usize = 1_000_000;

/// Relative and absolute tolerance of the step-doubling error test.
const RTOL: f64 = 1e-6;
const ATOL: f64 = 1e-9;

/// Accepted plus rejected substeps allowed between two grid points.
const MAX_SUBSTEPS: usize = 100_000;

/// Gaussian elimination with partial pivoting for a small dense system `a x = b`.
/// A zero pivot yields non-finite entries, which the integrator reports as divergence.
pub fn solve_linear_system<const M: usize>(mut a: [[f64; M]; M], mut b: [f64; M]) -> [f64; M] {
    for col in 0..M {
        // Largest magnitude in this column, at or below the diagonal.
        let pivot = (col..M)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        a.swap(col, pivot); // Row swap.
        b.swap(col, pivot); // Keep the rhs aligned.
        for row in (col + 1)..M {
            let factor = a[row][col] / a[col][col]; // Elimination coefficient.
            if factor == 0.0 {
                continue; // Already eliminated.
            }
            for k in col..M {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    // Back-substitution, bottom row first.
    let mut x = [0.0; M];
    for row in (0..M).rev() {
        let tail: f64 = ((row + 1)..M).map(|k| a[row][k] * x[k]).sum(); // Known part of the row.
        x[row] = (b[row] - tail) / a[row][row];
    }
    x
}

/// Generalized accelerations for a state and an input torque.
pub trait Dynamics {
    fn accelerations(&self, state: &State, u: f64) -> Result<[f64; N]>;
}

impl<D: Dynamics + ?Sized> Dynamics for &D {
    fn accelerations(&self, state: &State, u: f64) -> Result<[f64; N]> {
        (**self).accelerations(state, u)
    }
}

fn arguments(state: &State, u: f64) -> [f64; STATE_LEN + 1] {
    let mut args = [0.0; STATE_LEN + 1];
    args[..STATE_LEN].copy_from_slice(state);
    args[STATE_LEN] = u;
    args
}

fn first_n(values: Vec<f64>) -> Result<[f64; N]> {
    values
        .get(..N)
        .and_then(|head| <[f64; N]>::try_from(head).ok())
        .ok_or_else(|| {
            Error::Eval(EvalError::Arity {
                expected: N,
                got: values.len(),
            })
        })
}

impl Dynamics for NumericFn<'_> {
    fn accelerations(&self, state: &State, u: f64) -> Result<[f64; N]> {
        first_n(self.call(&arguments(state, u))?)
    }
}

impl Dynamics for NumericMatrices<'_> {
    fn accelerations(&self, state: &State, u: f64) -> Result<[f64; N]> {
        let args = arguments(state, u);
        let d = self.inertia.call(&args)?;
        let c = first_n(self.coriolis.call(&args)?)?;
        let g = first_n(self.gravity.call(&args)?)?;
        let b = first_n(self.input.call(&args)?)?;
        if d.len() != N * N {
            return Err(EvalError::Arity {
                expected: N * N,
                got: d.len(),
            }
            .into());
        }
        let mut inertia = [[0.0; N]; N];
        for (i, row) in inertia.iter_mut().enumerate() {
            row.copy_from_slice(&d[i * N..(i + 1) * N]);
        }
        let rhs: [f64; N] = std::array::from_fn(|i| b[i] - c[i] - g[i]);
        Ok(solve_linear_system(inertia, rhs))
    }
}

/// PD law on the pendulum angle: u = kp (reference - phi) - kd phidot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdController {
    pub kp: f64,
    pub kd: f64,
    pub reference: f64,
}

impl Default for PdController {
    fn default() -> Self {
        Self {
            kp: 10.0,
            kd: 1.0,
            reference: 0.0,
        }
    }
}

impl PdController {
    pub fn control(&self, state: &State) -> f64 {
        self.kp * (self.reference - state[0]) - self.kd * state[N]
    }
}

/// How the controller output becomes wheel torque.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Actuator {
    /// The output is the torque.
    Direct,
    /// The output is a motor voltage; the armature current is taken at steady state.
    SteadyState(Motor),
    /// Armature current as an extra state. Not implemented.
    Full(Motor),
}

impl Actuator {
    pub fn torque(&self, u: f64) -> Result<f64> {
        match self {
            Actuator::Direct => Ok(u),
            Actuator::SteadyState(motor) => Ok(motor.torque(motor.v2i_ss(u))),
            Actuator::Full(_) => Err(Error::NotImplemented("full motor dynamics")),
        }
    }
}

/// Sampled solution. `states[i]` and `inputs[i]` belong to `t[i]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    pub t: Vec<f64>,
    pub states: Vec<State>,
    pub inputs: Vec<f64>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// One state component over time.
    pub fn column(&self, index: usize) -> Vec<f64> {
        self.states.iter().map(|s| s[index]).collect()
    }

    pub fn last(&self) -> Option<&State> {
        self.states.last()
    }
}

pub struct SliderbotSolver<D: Dynamics> {
    dynamics: D,
    controller: PdController,
    actuator: Actuator,
}

impl<D: Dynamics> SliderbotSolver<D> {
    pub fn new(dynamics: D, controller: PdController, actuator: Actuator) -> Result<Self> {
        if let Actuator::Full(_) = actuator {
            return Err(Error::NotImplemented("full motor dynamics"));
        }
        Ok(Self {
            dynamics,
            controller,
            actuator,
        })
    }

    pub fn control(&self, y: &State) -> f64 {
        self.controller.control(y)
    }

    /// dy/dt at time `t`. The system is autonomous; `t` is kept for the usual rhs signature.
    pub fn deriv(&self, _t: f64, y: &State) -> Result<State> {
        let torque = self.actuator.torque(self.control(y))?;
        let qddot = self.dynamics.accelerations(y, torque)?;
        let mut dydt = [0.0; STATE_LEN];
        dydt[..N].copy_from_slice(&y[N..]);
        dydt[N..].copy_from_slice(&qddot);
        Ok(dydt)
    }

    /// One classical RK4 step: y + h/6 (k1 + 2 k2 + 2 k3 + k4).
    fn rk4_step(&self, t: f64, y: &State, h: f64) -> Result<State> {
        let shifted = |k: &State, dt: f64| -> State { std::array::from_fn(|i| y[i] + dt * k[i]) };
        let k1 = self.deriv(t, y)?; // Slope at the start.
        let k2 = self.deriv(t + 0.5 * h, &shifted(&k1, 0.5 * h))?; // Midpoint, using k1.
        let k3 = self.deriv(t + 0.5 * h, &shifted(&k2, 0.5 * h))?; // Midpoint, using k2.
        let k4 = self.deriv(t + h, &shifted(&k3, h))?; // End point.
        Ok(std::array::from_fn(|i| {
            y[i] + h / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]) // Weighted sum.
        }))
    }

    /// Advances `y` from `t0` by `span` with step-doubling RK4. `h` is the trial step size and is
    /// carried over to the next interval.
    fn advance(&self, t0: f64, y: &State, span: f64, h: &mut f64) -> Result<State> {
        let mut y = *y;
        let mut t = 0.0; // Time covered inside this interval.
        for _ in 0..MAX_SUBSTEPS {
            if span - t <= 1e-12 * span {
                return Ok(y);
            }
            let step = h.min(span - t); // Never step past the grid point.
            let full = self.rk4_step(t0 + t, &y, step)?; // One full step.
            let mid = self.rk4_step(t0 + t, &y, 0.5 * step)?; // Two half steps.
            let half = self.rk4_step(t0 + t + 0.5 * step, &mid, 0.5 * step)?;
            let err = step_error(&y, &full, &half);
            if err <= 1.0 {
                t += step;
                // Richardson extrapolation of the two estimates.
                y = std::array::from_fn(|i| half[i] + (half[i] - full[i]) / 15.0);
            }
            // NaN compares false above and shrinks the step here.
            let factor = if err == 0.0 {
                5.0
            } else {
                (0.9 * err.powf(-0.2)).clamp(0.2, 5.0)
            };
            *h = step * if factor.is_nan() { 0.2 } else { factor };
            if *h <= 1e-12 * span {
                return Err(Error::Diverged { t: t0 + t });
            }
        }
        Err(Error::Diverged { t: t0 + t })
    }

    /// Integrates from `x0` on the grid t_i = i*dt, i < ceil(tf/dt).
    pub fn solve(&self, x0: State, tf: f64, dt: f64) -> Result<Trajectory> {
        let steps = time_steps(tf, dt)?;
        let mut traj = Trajectory {
            t: Vec::with_capacity(steps),
            states: Vec::with_capacity(steps),
            inputs: Vec::with_capacity(steps),
        };
        let mut y = x0;
        let mut h = dt; // First trial step.
        for i in 0..steps {
            let t = i as f64 * dt;
            if i > 0 {
                y = self.advance((i - 1) as f64 * dt, &y, dt, &mut h)?;
                if y.iter().any(|v| !v.is_finite()) {
                    return Err(Error::Diverged { t });
                }
            }
            traj.t.push(t);
            traj.states.push(y);
            traj.inputs.push(self.control(&y));
        }
        Ok(traj)
    }
}

/// Local error of a step-doubling pair, scaled so that 1.0 is the tolerance.
/// The difference between one step and two half steps is 15 times the error of the half steps.
fn step_error(y: &State, full: &State, half: &State) -> f64 {
    let mut worst = 0.0_f64;
    for i in 0..STATE_LEN {
        let scale = ATOL + RTOL * y[i].abs().max(half[i].abs()); // Mixed tolerance per component.
        let e = (half[i] - full[i]).abs() / scale;
        if e.is_nan() {
            return f64::NAN; // f64::max would drop it.
        }
        worst = worst.max(e);
    }
    worst / 15.0
}

/// Number of grid samples, ceil(tf/dt). Rejects grids longer than [`MAX_SAMPLES`].
pub fn time_steps(tf: f64, dt: f64) -> Result<usize> {
    if !(tf > 0.0 && dt > 0.0) || !(tf / dt).is_finite() {
        return Err(Error::InvalidTimeGrid { tf, dt });
    }
    let steps = (tf / dt).ceil();
    if steps > MAX_SAMPLES as f64 {
        return Err(Error::InvalidTimeGrid { tf, dt });
    }
    Ok(steps as usize)
}

/// Parses "phi,theta,x,phidot,thetadot,xdot". Spaces are ignored.
pub fn parse_initial_condition(text: &str) -> Result<State> {
    let cleaned: String = text.chars().filter(|c| *c != ' ').collect();
    let values = cleaned
        .split(',')
        .map(|v| {
            v.parse::<f64>()
                .map_err(|_| Error::InitialCondition(format!("{v:?} is not a number")))
        })
        .collect::<Result<Vec<f64>>>()?;
    State::try_from(values.as_slice()).map_err(|_| {
        Error::InitialCondition(format!(
            "expected {STATE_LEN} values, got {}",
            values.len()
        ))
    })
}

static DERIVED: OnceLock<SymMatrix> = OnceLock::new();

/// Closed-form acceleration column, derived once per process.
pub fn derived_equation() -> &'static SymMatrix {
    DERIVED.get_or_init(|| {
        info!("Solving sliderbot dynamics...");
        let start = Instant::now();
        let eq = solve_dynam();
        debug!("derivation took {:?}", start.elapsed());
        eq
    })
}

/// Loads the configured equation file, or derives the equation when none is given.
pub fn load_or_derive(cfg: &SimConfig) -> Result<SymMatrix> {
    match &cfg.equation_file {
        Some(path) => load_equation(path),
        None => Ok(derived_equation().clone()),
    }
}

/// Lambdifies `equation` with the configured constants and integrates it.
pub fn simulate(cfg: &SimConfig, equation: &SymMatrix) -> Result<Trajectory> {
    cfg.validate()?;
    if equation.shape() != (N, 1) {
        return Err(Error::Config(format!(
            "equation must be a {N}x1 column, got {:?}",
            equation.shape()
        )));
    }
    let x0 = parse_initial_condition(&cfg.x0)?;
    let function = lambdify(equation, &cfg.constants().substitutions());
    let dynamics = function.compile()?;
    let solver = SliderbotSolver::new(dynamics, cfg.controller(), cfg.actuator())?;
    let start = Instant::now();
    let traj = solver.solve(x0, cfg.tf, cfg.dt)?;
    debug!("integrated {} steps in {:?}", traj.len(), start.elapsed());
    Ok(traj)
}

/// Full pipeline: validate, load or derive, lambdify, integrate.
pub fn run_simulation(cfg: &SimConfig) -> Result<Trajectory> {
    cfg.validate()?;
    let equation = load_or_derive(cfg)?;
    let traj = simulate(cfg, &equation)?;
    info!("Done!");
    Ok(traj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Linearised pendulum phi'' = phi + u with the other coordinates frozen.
    struct Toy;

    impl Dynamics for Toy {
        fn accelerations(&self, state: &State, u: f64) -> Result<[f64; N]> {
            Ok([state[0] + u, 0.0, 0.0])
        }
    }

    /// phi'' = -(a + b) phidot - a b phi, eigenvalues -a and -b.
    struct Stiff {
        a: f64,
        b: f64,
    }

    impl Dynamics for Stiff {
        fn accelerations(&self, state: &State, _u: f64) -> Result<[f64; N]> {
            let (a, b) = (self.a, self.b);
            Ok([-(a + b) * state[N] - a * b * state[0], 0.0, 0.0])
        }
    }

    struct Broken;

    impl Dynamics for Broken {
        fn accelerations(&self, _state: &State, _u: f64) -> Result<[f64; N]> {
            Ok([f64::NAN, 0.0, 0.0])
        }
    }

    fn uncontrolled() -> PdController {
        PdController {
            kp: 0.0,
            kd: 0.0,
            reference: 0.0,
        }
    }

    #[test]
    fn linear_solve_with_pivoting() {
        let a = [[0.0, 2.0, 1.0], [1.0, 1.0, 0.0], [3.0, 0.0, 1.0]];
        let x = solve_linear_system(a, [5.0, 3.0, 4.0]);
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(x[2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn grid_is_half_open() {
        let solver = SliderbotSolver::new(Toy, PdController::default(), Actuator::Direct).unwrap();
        let traj = solver.solve([0.0; STATE_LEN], 1.0, 0.25).unwrap();
        assert_eq!(traj.t, vec![0.0, 0.25, 0.5, 0.75]);
        let traj = solver.solve([0.0; STATE_LEN], 1.1, 0.25).unwrap();
        assert_eq!(traj.len(), 5);
    }

    #[test]
    fn bad_grid_is_rejected() {
        let solver = SliderbotSolver::new(Toy, PdController::default(), Actuator::Direct).unwrap();
        assert!(matches!(
            solver.solve([0.0; STATE_LEN], 1.0, 0.0),
            Err(Error::InvalidTimeGrid { .. })
        ));
        assert!(matches!(
            solver.solve([0.0; STATE_LEN], -1.0, 0.1),
            Err(Error::InvalidTimeGrid { .. })
        ));
    }

    #[test]
    fn rk4_tracks_exponential_growth() {
        let solver = SliderbotSolver::new(Toy, uncontrolled(), Actuator::Direct).unwrap();
        let mut x0 = [0.0; STATE_LEN];
        x0[0] = 1.0;
        let traj = solver.solve(x0, 1.001, 0.01).unwrap();
        let end = traj.last().unwrap();
        // phi = cosh(t) for phi'' = phi, phi(0) = 1, phidot(0) = 0.
        assert_relative_eq!(traj.t[100], 1.0, epsilon = 1e-12);
        assert_relative_eq!(end[0], 1f64.cosh(), epsilon = 1e-8);
    }

    #[test]
    fn stiff_mode_does_not_blow_up_at_coarse_dt() {
        // b * dt = 2.9 is outside the real stability interval of a single RK4 step.
        let (a, b) = (1.0, 290.0);
        let solver = SliderbotSolver::new(Stiff { a, b }, uncontrolled(), Actuator::Direct).unwrap();
        let mut x0 = [0.0; STATE_LEN];
        x0[0] = 1.0;
        let traj = solver.solve(x0, 1.001, 0.01).unwrap();
        let exact = |t: f64| (b * (-a * t).exp() - a * (-b * t).exp()) / (b - a);
        for (t, state) in traj.t.iter().zip(&traj.states) {
            assert_relative_eq!(state[0], exact(*t), epsilon = 1e-6, max_relative = 1e-5);
        }
        assert_relative_eq!(traj.last().unwrap()[0], exact(1.0), max_relative = 1e-5);
    }

    #[test]
    fn non_finite_rhs_is_divergence() {
        let solver = SliderbotSolver::new(Broken, uncontrolled(), Actuator::Direct).unwrap();
        assert!(matches!(
            solver.solve([0.0; STATE_LEN], 1.0, 0.1),
            Err(Error::Diverged { .. })
        ));
    }

    #[test]
    fn oversized_grid_is_rejected() {
        assert_eq!(time_steps(10.0, 0.01).unwrap(), 1000);
        assert!(matches!(
            time_steps(1.0, 1e-7),
            Err(Error::InvalidTimeGrid { .. })
        ));
        let solver = SliderbotSolver::new(Toy, PdController::default(), Actuator::Direct).unwrap();
        assert!(matches!(
            solver.solve([0.0; STATE_LEN], 1e15, 1.0),
            Err(Error::InvalidTimeGrid { .. })
        ));
    }

    #[test]
    fn pd_control_sign() {
        let pd = PdController::default();
        let mut y = [0.0; STATE_LEN];
        y[0] = 0.2;
        y[N] = -1.0;
        assert_relative_eq!(pd.control(&y), -2.0 + 1.0);
    }

    #[test]
    fn full_motor_refused_up_front() {
        let result = SliderbotSolver::new(Toy, PdController::default(), Actuator::Full(Motor::default()));
        assert!(matches!(result, Err(Error::NotImplemented(_))));
    }

    #[test]
    fn steady_state_motor_scales_torque() {
        let motor = Motor::new(1e-3, 2.0, 0.5);
        assert_relative_eq!(Actuator::SteadyState(motor).torque(4.0).unwrap(), 1.0);
        assert_relative_eq!(Actuator::Direct.torque(4.0).unwrap(), 4.0);
    }

    #[test]
    fn initial_condition_parsing() {
        let x0 = parse_initial_condition(" 0.1, 0,0 ,0,0, -2").unwrap();
        assert_eq!(x0, [0.1, 0.0, 0.0, 0.0, 0.0, -2.0]);
        assert!(matches!(
            parse_initial_condition("0.1,0,0"),
            Err(Error::InitialCondition(_))
        ));
        assert!(matches!(
            parse_initial_condition("0.1,0,0,0,0,abc"),
            Err(Error::InitialCondition(_))
        ));
    }
}
