//! Per-field force accumulation.

use std::collections::BTreeMap;

use glam::DVec3;

use crate::plate::{Plate, PlateId};
use crate::units::surface_speed_km;

/// Basal drag coefficient; summed over fields it yields the torque `-k I ω`.
pub const BASAL_DRAG: f64 = 0.5;
/// Collision pressure per unit field mass and unit relative velocity.
pub const OROGENY_FORCE: f64 = 0.3;
/// Extra resistance on subducting fields.
pub const SUBDUCTION_DRAG: f64 = 0.05;
/// Extra resistance on subducting fields inside a continent buffer.
pub const CONTINENT_BUFFER_DRAG: f64 = 0.3;
/// Fraction of hot-spot force lost per time unit when decay is enabled.
pub const HOT_SPOT_DECAY_RATE: f64 = 0.05;

/// Relative surface speed of two plates at world point `p` (km per time unit).
pub fn relative_speed_km(omega_a: DVec3, omega_b: DVec3, p: DVec3) -> f64 {
    surface_speed_km(omega_a - omega_b, p)
}

/// Fill `Field::force` for every field of `plate`: basal drag, subduction drag, continent buffer
/// drag, and orogeny pressure against the collision partner. `omegas` maps every plate id to
/// its current angular velocity.
pub fn accumulate_forces(plate: &mut Plate, omegas: &BTreeMap<PlateId, DVec3>) {
    let omega = plate.angular_velocity;
    let q = plate.orientation;
    let grid = plate.grid().clone();
    for f in plate.fields_mut() {
        let m = f.mass(&grid);
        let r = q * grid.pos_vec(f.id);
        let v = omega.cross(r);
        let mut force = -BASAL_DRAG * m * v;
        if f.subduction.is_some() {
            force -= SUBDUCTION_DRAG * m * v;
            if f.continent_buffer {
                force -= CONTINENT_BUFFER_DRAG * m * v;
            }
        }
        if f.orogeny {
            if let Some(partner) = f.collision_partner.and_then(|c| omegas.get(&c.plate)) {
                let rel = (omega - *partner).cross(r);
                force -= OROGENY_FORCE * m * rel;
            }
        }
        f.force = force;
    }
}

/// Fade the hot-spot force of `plate` over `dt`.
pub fn decay_hot_spot(plate: &mut Plate, dt: f64) {
    let keep = (1.0 - HOT_SPOT_DECAY_RATE * dt).clamp(0.0, 1.0);
    let f = DVec3::from_array(plate.hot_spot.force) * keep;
    plate.hot_spot.force = f.to_array();
}
