//! Splitting oversized plates.

use std::collections::VecDeque;
use std::f64::consts::PI;

use crate::plate::{Plate, PlateId};
use crate::rng::SimRng;

/// A plate covering more than this share of the sphere is split.
pub const MAX_AREA_FRACTION: f64 = 0.6;
/// Plates with fewer fields are never split.
pub const MIN_FIELDS: usize = 20;

/// First plate (by id) that should be split.
pub fn find_oversized(plates: &[Plate]) -> Option<PlateId> {
    plates
        .iter()
        .filter(|p| p.field_count() >= MIN_FIELDS && p.area() / (4.0 * PI) > MAX_AREA_FRACTION)
        .map(|p| p.id)
        .min()
}

/// Split `parent` in two with a two-seed BFS: one seed is a random field, the other the field
/// farthest from it. Fields reached first from the second seed move to a new plate `new_id`,
/// which inherits the parent's density, orientation and angular velocity and gets a random hue.
pub fn divide(parent: &mut Plate, new_id: PlateId, rng: &mut SimRng) -> Option<Plate> {
    let ids = parent.field_ids();
    let seed_a = ids[rng.index(ids.len())?];
    let pa = parent.grid().pos_vec(seed_a);
    let seed_b = ids
        .iter()
        .copied()
        .min_by(|&x, &y| {
            let dx = parent.grid().pos_vec(x).dot(pa);
            let dy = parent.grid().pos_vec(y).dot(pa);
            dx.total_cmp(&dy).then(x.cmp(&y))
        })
        .filter(|&b| b != seed_a)?;

    let grid = parent.grid().clone();
    let mut owner: Vec<u8> = vec![0; grid.cells];
    let mut queue = VecDeque::new();
    owner[seed_a] = 1;
    owner[seed_b] = 2;
    queue.push_back(seed_a);
    queue.push_back(seed_b);
    while let Some(u) = queue.pop_front() {
        let side = owner[u];
        for &n in grid.neighbors(u) {
            let n = n as usize;
            if owner[n] == 0 && parent.has_field(n) {
                owner[n] = side;
                queue.push_back(n);
            }
        }
    }

    let mut child = Plate::new(new_id, grid.clone());
    child.density = parent.density;
    child.hue = rng.range(0.0, 360.0);
    child.orientation = parent.orientation;
    child.angular_velocity = parent.angular_velocity;
    for id in ids.into_iter().filter(|&id| owner[id] == 2) {
        if let Some(f) = parent.delete_field(id) {
            child.add_field(f);
        }
    }
    parent.refresh_topology();
    child.refresh_topology();
    parent.update_inertia_tensor();
    child.update_inertia_tensor();
    log::info!(
        "[plate_division] plate {} split: {} fields kept, {} moved to plate {new_id}",
        parent.id,
        parent.field_count(),
        child.field_count()
    );
    Some(child)
}
