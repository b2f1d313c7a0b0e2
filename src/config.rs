// src/config.rs
// Run configuration shared by the command line and the web front end.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::lambdify::Constants;
use crate::logic::{time_steps, Actuator, PdController};
use crate::motor::Motor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub g: f64,
    pub r: f64,
    #[serde(rename = "L")]
    pub l: f64,
    pub mp: f64,
    pub mc: f64,
    pub tf: f64,
    pub dt: f64,
    /// Initial state as CSV: phi, theta, x, phidot, thetadot, xdot.
    pub x0: String,
    /// Previously saved equation to load instead of deriving.
    #[serde(rename = "fn")]
    pub equation_file: Option<PathBuf>,
    /// Treat the control output as a motor voltage (steady-state current).
    pub mtr: bool,
    /// Full armature-current motor model. Not implemented.
    pub full_mtr: bool,
    pub kp: f64,
    pub kd: f64,
    pub motor_r: f64,
    pub motor_k: f64,
    pub motor_l: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        let constants = Constants::default();
        let controller = PdController::default();
        let motor = Motor::default();
        Self {
            g: constants.g,
            r: constants.r,
            l: constants.l,
            mp: constants.mp,
            mc: constants.mc,
            tf: 10.0,
            dt: 0.01,
            x0: "0.1,0,0,0,0,0".to_string(),
            equation_file: None,
            mtr: false,
            full_mtr: false,
            kp: controller.kp,
            kd: controller.kd,
            motor_r: motor.resistance,
            motor_k: motor.k,
            motor_l: motor.inductance,
        }
    }
}

impl SimConfig {
    pub fn constants(&self) -> Constants {
        Constants {
            g: self.g,
            r: self.r,
            l: self.l,
            mp: self.mp,
            mc: self.mc,
        }
    }

    pub fn motor(&self) -> Motor {
        Motor::new(self.motor_l, self.motor_r, self.motor_k)
    }

    pub fn actuator(&self) -> Actuator {
        if self.full_mtr {
            Actuator::Full(self.motor())
        } else if self.mtr {
            Actuator::SteadyState(self.motor())
        } else {
            Actuator::Direct
        }
    }

    pub fn controller(&self) -> PdController {
        PdController {
            kp: self.kp,
            kd: self.kd,
            ..PdController::default()
        }
    }

    /// Rejects configurations that cannot run. The full motor model is refused before anything else;
    /// the time grid is checked last, so its size is bounded before any allocation.
    pub fn validate(&self) -> Result<()> {
        if self.full_mtr {
            return Err(Error::NotImplemented("full motor dynamics"));
        }
        if self.l == 0.0 || self.mp == 0.0 {
            return Err(Error::Config(format!(
                "wheel radius and mass must be nonzero (L={}, mp={})",
                self.l, self.mp
            )));
        }
        if self.mtr && self.motor_r <= 0.0 {
            return Err(Error::Config(format!(
                "motor resistance must be positive, got {}",
                self.motor_r
            )));
        }
        time_steps(self.tf, self.dt)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_uses_short_names_and_defaults() {
        let cfg: SimConfig =
            serde_json::from_str(r#"{"L": 0.2, "fn": "eq.txt", "tf": 2}"#).unwrap();
        assert_eq!(cfg.l, 0.2);
        assert_eq!(cfg.tf, 2.0);
        assert_eq!(cfg.equation_file, Some(PathBuf::from("eq.txt")));
        assert_eq!(cfg.dt, 0.01);
        assert_eq!(cfg.x0, "0.1,0,0,0,0,0");
        assert_eq!(cfg.actuator(), Actuator::Direct);
    }

    #[test]
    fn full_motor_wins_over_everything() {
        let cfg = SimConfig {
            full_mtr: true,
            mtr: true,
            l: 0.0,
            ..SimConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::NotImplemented(_))));
    }

    #[test]
    fn degenerate_wheel_is_rejected() {
        let cfg = SimConfig {
            mp: 0.0,
            ..SimConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn oversized_grid_is_rejected_up_front() {
        let cfg: SimConfig = serde_json::from_str(r#"{"tf": 1e15, "dt": 1}"#).unwrap();
        assert!(matches!(
            cfg.validate(),
            Err(Error::InvalidTimeGrid { .. })
        ));
        let cfg = SimConfig {
            dt: 0.0,
            ..SimConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(Error::InvalidTimeGrid { .. })
        ));
    }

    #[test]
    fn motor_flag_selects_steady_state() {
        let cfg = SimConfig {
            mtr: true,
            motor_r: 2.0,
            ..SimConfig::default()
        };
        cfg.validate().unwrap();
        match cfg.actuator() {
            Actuator::SteadyState(m) => assert_eq!(m.resistance, 2.0),
            other => panic!("unexpected actuator {other:?}"),
        }
    }
}
