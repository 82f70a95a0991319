//! Rotation integrators.
//!
//! All three integrate the same system: orientation `q` driven by angular velocity `ω`, and
//! `ω` driven by an acceleration that is the step's torque response minus the linear basal
//! drag. For stages evaluated at a trial velocity `ω'` the drag term is updated linearly:
//! `α(ω') = α₀ − k (ω' − ω)`, with `k` zero for a plate whose inverse inertia vanished.

use glam::{DQuat, DVec3};

use crate::config::Integration;

/// Upper bound on plate angular speed (rad per time unit).
pub const MAX_ANGULAR_SPEED: f64 = 0.03;

/// Result of one integration step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationState {
    /// Orientation after the step (unit length)
    pub orientation: DQuat,
    /// Angular velocity after the step
    pub angular_velocity: DVec3,
}

/// Rotate `q` by `ω` for `dt`, renormalized.
pub fn rotate(q: DQuat, omega: DVec3, dt: f64) -> DQuat {
    let speed = omega.length();
    if !(speed.is_finite() && speed > 0.0) || dt == 0.0 {
        return q.normalize();
    }
    (DQuat::from_axis_angle(omega / speed, speed * dt) * q).normalize()
}

/// Scale `ω` down to [`MAX_ANGULAR_SPEED`].
pub fn clamp_speed(omega: DVec3) -> DVec3 {
    if !omega.is_finite() {
        log::warn!("[integrator] non-finite angular velocity reset");
        return DVec3::ZERO;
    }
    omega.clamp_length_max(MAX_ANGULAR_SPEED)
}

/// Advance (`q`, `ω`) by `dt` using `method`. `alpha0` is the acceleration at the current
/// state and `drag` the linear drag coefficient.
pub fn integrate(
    method: Integration,
    q: DQuat,
    omega: DVec3,
    alpha0: DVec3,
    drag: f64,
    dt: f64,
) -> RotationState {
    let alpha = |w: DVec3| alpha0 - drag * (w - omega);
    let (q1, w1) = match method {
        Integration::Euler => {
            let w1 = clamp_speed(omega + alpha0 * dt);
            (rotate(q, w1, dt), w1)
        }
        Integration::Verlet => {
            let half = clamp_speed(omega + alpha0 * (0.5 * dt));
            let q1 = rotate(q, half, dt);
            let predicted = omega + alpha0 * dt;
            let w1 = clamp_speed(omega + (alpha0 + alpha(predicted)) * (0.5 * dt));
            (q1, w1)
        }
        Integration::Rk4 => {
            let k1 = alpha(omega);
            let k2 = alpha(omega + k1 * (0.5 * dt));
            let k3 = alpha(omega + k2 * (0.5 * dt));
            let k4 = alpha(omega + k3 * dt);
            let w1 = clamp_speed(omega + (k1 + 2.0 * k2 + 2.0 * k3 + k4) * (dt / 6.0));
            let mid = clamp_speed(omega + (k1 + k2) * (0.25 * dt));
            // Simpson average of ω over the step
            let mean = (omega + 4.0 * mid + w1) / 6.0;
            (rotate(q, mean, dt), w1)
        }
    };
    RotationState { orientation: q1, angular_velocity: w1 }
}
