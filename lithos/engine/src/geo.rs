//! Small vector helpers on `[f64; 3]` shared by the grid and the spatial index.
#![allow(clippy::many_single_char_names)]

/// Dot product of 3D vectors.
#[inline]
pub fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Cross product of 3D vectors.
#[inline]
pub fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[1] * b[2] - a[2] * b[1], a[2] * b[0] - a[0] * b[2], a[0] * b[1] - a[1] * b[0]]
}

/// Euclidean norm of a 3D vector.
#[inline]
pub fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

/// Normalize a 3D vector (returns zero if input is zero).
#[inline]
pub fn normalize(mut a: [f64; 3]) -> [f64; 3] {
    let n = norm(a);
    if n > 0.0 {
        a[0] /= n;
        a[1] /= n;
        a[2] /= n;
    }
    a
}

/// Squared Euclidean distance.
#[inline]
pub fn dist2(a: [f64; 3], b: [f64; 3]) -> f64 {
    let d = [a[0] - b[0], a[1] - b[1], a[2] - b[2]];
    dot(d, d)
}

/// Great-circle angle (radians) between two unit vectors.
#[inline]
pub fn arc_angle(a_unit: [f64; 3], b_unit: [f64; 3]) -> f64 {
    // angle = atan2(|a×b|, a·b), stable near 0 and π
    let s = norm(cross(a_unit, b_unit));
    let d = dot(a_unit, b_unit).clamp(-1.0, 1.0);
    s.atan2(d).abs()
}

/// Cartesian unit vector to (lat, lon) in radians. Latitude is measured from the XZ-plane
/// towards +Y, so +Y is the north pole.
#[inline]
pub fn to_latlon(p: [f64; 3]) -> [f64; 2] {
    let lat = (p[1] / norm(p).max(f64::MIN_POSITIVE)).clamp(-1.0, 1.0).asin();
    let lon = p[2].atan2(p[0]);
    [lat, lon]
}

/// (lat, lon) in radians to a Cartesian unit vector, inverse of [`to_latlon`].
#[inline]
pub fn from_latlon(lat: f64, lon: f64) -> [f64; 3] {
    let c = lat.cos();
    [c * lon.cos(), lat.sin(), c * lon.sin()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latlon_round_trip() {
        for &(lat, lon) in &[(0.0, 0.0), (0.5, -2.0), (-1.2, 3.0), (1.5, 0.1)] {
            let p = from_latlon(lat, lon);
            let [la, lo] = to_latlon(p);
            assert!((la - lat).abs() < 1e-12);
            assert!((lo - lon).abs() < 1e-12);
        }
    }

    #[test]
    fn arc_angle_is_clamped() {
        let a = [1.0, 0.0, 0.0];
        assert_eq!(arc_angle(a, a), 0.0);
        let b = [-1.0, 0.0, 0.0];
        assert!((arc_angle(a, b) - std::f64::consts::PI).abs() < 1e-12);
    }
}
