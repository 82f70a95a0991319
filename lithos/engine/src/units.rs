//! Planet constants and explicit conversions between angular and surface units.
//!
//! Model time is measured in abstract time units (one unit ≈ 1 Myr). Angular velocities are in
//! radians per time unit; surface distances are in kilometers.

/// Planet radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Distance in kilometers (km).
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default)]
pub struct Kilometers(pub f64);

impl Kilometers {
    /// Angle subtended at the planet center.
    pub fn to_radians(self) -> f64 {
        self.0 / EARTH_RADIUS_KM
    }
}

/// Shorthand constructor for kilometers.
pub fn km(v: f64) -> Kilometers {
    Kilometers(v)
}

/// Great-circle distance in km for an angle in radians.
#[inline]
pub fn rad_to_km(rad: f64) -> f64 {
    rad * EARTH_RADIUS_KM
}

/// Surface speed (km per time unit) of a point at unit position `p` for angular velocity `omega`.
#[inline]
pub fn surface_speed_km(omega: glam::DVec3, p: glam::DVec3) -> f64 {
    omega.cross(p).length() * EARTH_RADIUS_KM
}
