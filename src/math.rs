// src/math.rs
// Symbolic equations of motion for the sliderbot: a cart (position x) carrying a pendulum of
// length r (angle phi from vertical) whose tip holds a reaction wheel of radius L (relative angle theta).
// Pedantically the wheel is two point masses at the ends of a diameter, which has the same
// inertia as a disk of radius L.
// It computes the inertia matrix D, the Coriolis/centrifugal vector C*qdot, the gravity vector G and the
// input vector B for D*qddot + C*qdot + G = B, then combines them into a closed-form acceleration column.
// Kinetic energy is written as KE = qdot^T D qdot, so D is read off KE as polynomial coefficients.

use log::debug;

use crate::expr::{self, cos, num, powi, sin, Expr};
use crate::matrix::SymMatrix;
use crate::simplify::{expand, monomial, simplify, Poly};

/// Degrees of freedom.
pub const N: usize = 3;

/// Generalized coordinates q.
pub const COORDINATES: [&str; N] = ["phi", "theta", "x"];

/// Generalized velocities qdot, index-aligned with COORDINATES.
pub const VELOCITIES: [&str; N] = ["phidot", "thetadot", "xdot"];

/// Scalar control input (wheel torque).
pub const INPUT: &str = "u";

/// Physical constants left symbolic by the derivation.
pub const CONSTANTS: [&str; 5] = ["g", "r", "L", "mp", "mc"];

fn s(name: &str) -> Expr {
    expr::sym(name)
}

/// Column vector of generalized velocities.
pub fn generalized_velocities() -> SymMatrix {
    SymMatrix::symbols(&VELOCITIES)
}

/// Time derivative by the chain rule: d/dt f(q) = sum_i df/dq_i * qdot_i.
pub fn time_derivative(e: &Expr) -> Expr {
    expr::sum(
        COORDINATES
            .iter()
            .zip(VELOCITIES.iter())
            .map(|(q, qdot)| e.diff(q) * s(qdot)),
    )
}

/// The four component matrices of D*qddot + C*qdot + G = B.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicsMatrices {
    pub inertia: SymMatrix,
    pub coriolis: SymMatrix,
    pub gravity: SymMatrix,
    pub input: SymMatrix,
}

impl DynamicsMatrices {
    /// Closed-form acceleration column D^-1 (B - C*qdot - G), with D^-1 = adj(D) / det(D).
    pub fn combined(&self) -> SymMatrix {
        let det = simplify(&self.inertia.det());
        let adjugate = self.inertia.adjugate().simplify();
        let rhs = &(&self.input - &self.coriolis) - &self.gravity;
        let numerator = (&adjugate * &rhs).simplify();
        numerator.map(|e| {
            if expr::is_zero(e) {
                expr::zero()
            } else {
                e.clone() / det.clone()
            }
        })
    }
}

/// Kinematics and energies of the sliderbot, kept symbolic.
pub struct SliderbotMath {
    pub positions: SymMatrix,  // (x1, y1, x2, y2) of the two wheel masses.
    pub velocities: SymMatrix, // J * qdot.
    pub kinetic: Expr,
    pub potential: Expr,
}

impl Default for SliderbotMath {
    fn default() -> Self {
        Self::new()
    }
}

impl SliderbotMath {
    pub fn new() -> Self {
        let (phi, theta, x) = (s("phi"), s("theta"), s("x"));
        let (r, l) = (s("r"), s("L"));
        let (mp, mc, g) = (s("mp"), s("mc"), s("g"));
        let half = num(0.5);

        let rel = phi.clone() - theta;
        let rsin = r.clone() * sin(phi.clone());
        let rcos = r * cos(phi);
        let lcos = l.clone() * cos(rel.clone());
        let lsin = l * sin(rel);

        let x1 = rsin.clone() + lcos.clone() + x.clone();
        let x2 = rsin - lcos + x;
        let y1 = rcos.clone() - lsin.clone();
        let y2 = rcos + lsin;
        let positions = SymMatrix::column(vec![x1, y1.clone(), x2, y2.clone()]);

        let jacobian = positions.jacobian(&COORDINATES);
        let velocities = (&jacobian * &generalized_velocities()).expand();
        debug_assert!(velocities
            .entries()
            .iter()
            .zip(positions.entries())
            .all(|(v, p)| *v == expand(&time_derivative(p))));

        let cart = half.clone() * mc * powi(s("xdot"), 2);
        let wheel = half.clone()
            * mp.clone()
            * expr::sum(velocities.entries().iter().map(|v| powi(v.clone(), 2)));
        let kinetic = simplify(&(cart + wheel));
        let potential = simplify(&(half * mp * g * (y1 + y2)));

        Self {
            positions,
            velocities,
            kinetic,
            potential,
        }
    }

    /// D[i][i] = coeff(KE, qdot_i^2), D[i][j] = coeff(KE, qdot_i*qdot_j) / 2.
    ///
    /// Panics if qdot^T D qdot does not reproduce KE; that would be a bug in the derivation.
    pub fn set_mass_matrix(&self) -> SymMatrix {
        let ke = Poly::from_expr(&self.kinetic); // KE as a polynomial in the velocities.
        let mut d = SymMatrix::zeros(N, N);
        for i in 0..N {
            // Diagonal: qdot_i^2 carries D[i][i] once.
            d.set(i, i, ke.coeff(&monomial(&[(VELOCITIES[i], 2)])).to_expr());
            for j in (i + 1)..N {
                // Off-diagonal: qdot_i*qdot_j carries D[i][j] + D[j][i].
                let cross = ke
                    .coeff(&monomial(&[(VELOCITIES[i], 1), (VELOCITIES[j], 1)]))
                    .scale(0.5)
                    .to_expr();
                d.set(i, j, cross.clone()); // Upper triangle.
                d.set(j, i, cross); // Mirror.
            }
        }

        let qdot = generalized_velocities();
        let quadratic = (&(&qdot.transpose() * &d) * &qdot)[(0, 0)].clone(); // qdot^T D qdot.
        assert!(
            Poly::from_expr(&quadratic) == ke && d.is_symmetric(),
            "inertia matrix error"
        );
        d
    }

    /// C*qdot = (d(D qdot)/dq) qdot - 1/2 d(qdot^T D qdot)/dq.
    pub fn set_centripetal_matrix(&self, inertia: &SymMatrix) -> SymMatrix {
        let qdot = generalized_velocities();
        let momentum = inertia * &qdot;
        let coriolis = &momentum.jacobian(&COORDINATES) * &qdot;
        let energy = &(&qdot.transpose() * inertia) * &qdot;
        let centrifugal = energy
            .jacobian(&COORDINATES)
            .transpose()
            .scale(&num(0.5));
        (&coriolis - &centrifugal).simplify()
    }

    /// G = dPE/dq.
    pub fn set_grav_matrix(&self) -> SymMatrix {
        SymMatrix::column(vec![self.potential.clone()])
            .jacobian(&COORDINATES)
            .transpose()
            .simplify()
    }

    /// The wheel torque u enters the theta equation only.
    pub fn set_input_matrix(&self) -> SymMatrix {
        SymMatrix::column(vec![
            expr::zero(),
            s(INPUT) / (s("mp") * powi(s("L"), 2)),
            expr::zero(),
        ])
    }

    pub fn matrices(&self) -> DynamicsMatrices {
        let inertia = self.set_mass_matrix();
        let coriolis = self.set_centripetal_matrix(&inertia);
        let gravity = self.set_grav_matrix();
        let input = self.set_input_matrix();
        debug!("inertia matrix: {inertia}");
        debug!("coriolis vector: {coriolis}");
        debug!("gravity vector: {gravity}");
        DynamicsMatrices {
            inertia,
            coriolis,
            gravity,
            input,
        }
    }
}

/// Derives the component matrices from first principles.
pub fn derive_matrices() -> DynamicsMatrices {
    SliderbotMath::new().matrices()
}

/// Derives the closed-form acceleration column (3x1) in terms of
/// phi, theta, x, phidot, thetadot, xdot, u and the symbolic constants.
pub fn solve_dynam() -> SymMatrix {
    derive_matrices().combined()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn inertia_matrix_matches_hand_derivation() {
        let d = derive_matrices().inertia;
        let (mp, mc, r, l) = (s("mp"), s("mc"), s("r"), s("L"));
        let expected = SymMatrix::from_rows(vec![
            vec![
                mp.clone() * powi(r.clone(), 2) + mp.clone() * powi(l.clone(), 2),
                expr::zero() - mp.clone() * powi(l.clone(), 2),
                mp.clone() * r * cos(s("phi")),
            ],
            vec![
                expr::zero() - mp.clone() * powi(l.clone(), 2),
                mp.clone() * powi(l, 2),
                expr::zero(),
            ],
            vec![
                mp.clone() * cos(s("phi")) * s("r"),
                expr::zero(),
                mp + num(0.5) * mc,
            ],
        ])
        .expand();
        assert_eq!(d, expected);
    }

    #[test]
    fn inertia_reproduces_kinetic_energy() {
        let math = SliderbotMath::new();
        let d = math.set_mass_matrix();
        assert!(d.is_symmetric());
        let qdot = generalized_velocities();
        let quadratic = (&(&qdot.transpose() * &d) * &qdot)[(0, 0)].clone();
        assert_eq!(expand(&quadratic), expand(&math.kinetic));
    }

    #[test]
    fn gravity_and_coriolis_terms() {
        let m = derive_matrices();
        let mg = expr::zero() - s("g") * s("mp") * s("r") * sin(s("phi"));
        assert_eq!(
            m.gravity,
            SymMatrix::column(vec![expand(&mg), expr::zero(), expr::zero()])
        );

        let centripetal = expr::zero() - s("mp") * s("r") * sin(s("phi")) * powi(s("phidot"), 2);
        assert_eq!(
            m.coriolis,
            SymMatrix::column(vec![expr::zero(), expr::zero(), expand(&centripetal)])
        );
    }

    #[test]
    fn potential_energy_loses_wheel_terms() {
        let math = SliderbotMath::new();
        let expected = expand(&(s("g") * s("mp") * s("r") * cos(s("phi"))));
        assert_eq!(math.potential, expected);
    }

    #[test]
    fn input_enters_the_wheel_equation() {
        let b = derive_matrices().input;
        assert!(expr::is_zero(&b[(0, 0)]) && expr::is_zero(&b[(2, 0)]));
        let expected = s("u") * powi(s("mp"), -1) * powi(s("L"), -2);
        assert_eq!(expand(&b[(1, 0)]), expand(&expected));
    }

    #[test]
    fn combined_vanishes_at_upright_rest() {
        let eq = solve_dynam();
        assert_eq!(eq.shape(), (N, 1));
        let at_rest: BTreeMap<String, f64> = COORDINATES
            .iter()
            .chain(VELOCITIES.iter())
            .chain([INPUT].iter())
            .map(|name| (name.to_string(), 0.0))
            .collect();
        let settled = eq.subs(&at_rest).simplify();
        assert!(settled.entries().iter().all(expr::is_zero), "{settled}");
    }
}
