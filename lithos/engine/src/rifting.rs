//! Divergent boundaries: fill uncovered ring positions with fresh oceanic crust.

use crate::field::Field;
use crate::plate::{Plate, PlateId};
use crate::spatial_index::SpatialIndex;

/// True when any plate owns a field at world position `p`.
fn covered(plates: &[Plate], index: &SpatialIndex, p: glam::DVec3) -> bool {
    plates.iter().any(|o| o.field_at_absolute_pos(index, p).is_some())
}

/// Walk the adjacent rings in plate-id order and create a new field wherever the ring position
/// is not covered by any plate. Returns the created (plate, field) pairs.
///
/// Only the ring as it stood before the call is examined; rings grown by this pass are handled
/// on the next step.
pub fn fill_gaps(plates: &mut [Plate], index: &SpatialIndex) -> Vec<(PlateId, usize)> {
    let mut order: Vec<usize> = (0..plates.len()).collect();
    order.sort_by_key(|&i| plates[i].id);
    let mut created = Vec::new();
    for i in order {
        let ring: Vec<usize> = plates[i].adjacent_fields().iter().copied().collect();
        for id in ring {
            let p = plates[i].absolute_pos(id);
            if covered(plates, index, p) {
                continue;
            }
            let pid = plates[i].id;
            if plates[i].add_field(Field::new_oceanic(id, pid)) {
                created.push((pid, id));
            }
        }
    }
    if !created.is_empty() {
        log::debug!("[rifting] {} new oceanic fields", created.len());
    }
    created
}
