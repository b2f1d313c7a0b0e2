// src/motor.rs
// Brushed DC motor driving the reaction wheel.
// Armature model: L dI/dt = V - R I - k w, torque = k I, back-EMF = k w.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motor {
    pub inductance: f64, // H
    pub resistance: f64, // Ohm
    pub k: f64,          // N*m/A, equal to V*s/rad
}

impl Default for Motor {
    fn default() -> Self {
        Self {
            inductance: 1e-3,
            resistance: 1.0,
            k: 0.1,
        }
    }
}

impl Motor {
    pub fn new(inductance: f64, resistance: f64, k: f64) -> Self {
        Self {
            inductance,
            resistance,
            k,
        }
    }

    /// dI/dt for armature current `current`, terminal voltage `voltage` and shaft speed `speed`.
    pub fn current_rate(&self, current: f64, voltage: f64, speed: f64) -> f64 {
        (voltage - (self.resistance * current + self.emf(speed))) / self.inductance
    }

    pub fn torque(&self, current: f64) -> f64 {
        self.k * current
    }

    pub fn emf(&self, speed: f64) -> f64 {
        self.k * speed
    }

    /// Steady-state current, ignoring back-EMF.
    pub fn v2i_ss(&self, voltage: f64) -> f64 {
        voltage / self.resistance
    }
}
