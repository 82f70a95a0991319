//! Ownership resolution and convergent boundary processes.
//!
//! Plates are ranked by density (ties: the higher id counts as denser). Every alive field of a
//! plate is tested against the lighter plates; the first lighter plate that owns the field at
//! the same world position is the overriding plate. Oceanic fields sink under it, continental
//! pairs fold into mountains, and a continental field over an oceanic one flips the polarity so
//! the oceanic field sinks instead.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use glam::DVec3;

use crate::crust::Crust;
use crate::field::{Contact, Field, Subduction};
use crate::forces::relative_speed_km;
use crate::plate::{Plate, PlateId};
use crate::spatial_index::SpatialIndex;

/// Subplate fields are dropped once they sink this many subduction widths.
pub const SUBPLATE_DESTRUCTION_FACTOR: f64 = 2.0;

/// What happens where two plates overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    /// `lower` sinks under `upper`
    Subduction,
    /// Two continents collide
    Orogeny,
}

/// One overlapping field pair found by [`find_contacts`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactEvent {
    /// Contact kind
    pub kind: ContactKind,
    /// Sinking plate (or bottom plate of an orogeny)
    pub lower: PlateId,
    /// Field of `lower`
    pub lower_field: usize,
    /// Overriding plate
    pub upper: PlateId,
    /// Field of `upper`
    pub upper_field: usize,
    /// Relative surface speed at the contact (km per time unit)
    pub speed_km: f64,
}

/// Totals reported by [`apply_contacts`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollisionReport {
    /// Fields moved into a subplate
    pub detached: usize,
    /// Subplate fields destroyed
    pub destroyed: usize,
    /// Plate pairs in continental contact this step, with the slowest contact speed
    pub touching: BTreeMap<(PlateId, PlateId), f64>,
}

/// Density order: lighter first, equal densities ordered by id.
pub fn density_order(a: &Plate, b: &Plate) -> Ordering {
    a.density.partial_cmp(&b.density).unwrap_or(Ordering::Equal).then(a.id.cmp(&b.id))
}

/// Find every overlapping field pair.
pub fn find_contacts(plates: &[Plate], index: &SpatialIndex) -> Vec<ContactEvent> {
    let mut order: Vec<&Plate> = plates.iter().collect();
    order.sort_by(|a, b| density_order(a, b));
    let mut events = Vec::new();
    for (rank, bottom) in order.iter().enumerate() {
        for f in bottom.fields() {
            let p = bottom.absolute_pos(f.id);
            for top in order[..rank].iter() {
                let Some(tf) = top.field_at_absolute_pos(index, p) else { continue };
                let speed_km = relative_speed_km(bottom.angular_velocity, top.angular_velocity, p);
                let event = match (f.is_continental(), tf.is_continental()) {
                    (false, _) => ContactEvent {
                        kind: ContactKind::Subduction,
                        lower: bottom.id,
                        lower_field: f.id,
                        upper: top.id,
                        upper_field: tf.id,
                        speed_km,
                    },
                    (true, true) => ContactEvent {
                        kind: ContactKind::Orogeny,
                        lower: bottom.id,
                        lower_field: f.id,
                        upper: top.id,
                        upper_field: tf.id,
                        speed_km,
                    },
                    (true, false) => ContactEvent {
                        kind: ContactKind::Subduction,
                        lower: top.id,
                        lower_field: tf.id,
                        upper: bottom.id,
                        upper_field: f.id,
                        speed_km,
                    },
                };
                events.push(event);
                break;
            }
        }
    }
    events
}

fn plate_index(plates: &[Plate], id: PlateId) -> Option<usize> {
    plates.iter().position(|p| p.id == id)
}

/// Two distinct plates borrowed mutably.
pub fn pair_mut(plates: &mut [Plate], a: usize, b: usize) -> Option<(&mut Plate, &mut Plate)> {
    match a.cmp(&b) {
        Ordering::Equal => None,
        Ordering::Less => {
            let (l, r) = plates.split_at_mut(b);
            Some((&mut l[a], &mut r[0]))
        }
        Ordering::Greater => {
            let (l, r) = plates.split_at_mut(a);
            Some((&mut r[0], &mut l[b]))
        }
    }
}

/// Record collision partners and orogeny flags so that forces see this step's contacts.
pub fn mark_contacts(plates: &mut [Plate], events: &[ContactEvent]) {
    for e in events {
        let orogeny = e.kind == ContactKind::Orogeny;
        if let Some(f) = plate_index(plates, e.lower).and_then(|i| plates[i].field_mut(e.lower_field)) {
            f.collision_partner = Some(Contact { plate: e.upper, field: e.upper_field });
            f.orogeny |= orogeny;
        }
        if let Some(f) = plate_index(plates, e.upper).and_then(|i| plates[i].field_mut(e.upper_field)) {
            f.collision_partner = Some(Contact { plate: e.lower, field: e.lower_field });
            f.orogeny |= orogeny;
        }
    }
}

fn take_with_neighbors(plate: &mut Plate, id: usize) -> Vec<Field> {
    let grid = plate.grid().clone();
    let mut out = Vec::with_capacity(7);
    out.extend(plate.take_field(id));
    for &n in grid.neighbors(id) {
        out.extend(plate.take_field(n as usize));
    }
    out
}

fn subduct_one(lower: &mut Plate, upper: &mut Plate, e: &ContactEvent, dt: f64, width_km: f64) -> bool {
    let Some(mut sinking) = lower.take_field(e.lower_field) else { return false };
    let distance = sinking.subduction_distance() + e.speed_km * dt;
    sinking.subduction = Some(Subduction { distance_km: distance, top_plate: upper.id });

    let mut receivers = take_with_neighbors(upper, e.upper_field);
    {
        let mut crusts: Vec<&mut Crust> = receivers.iter_mut().map(|f| &mut f.crust).collect();
        sinking.crust.subduct(dt, &mut crusts, e.speed_km);
    }
    for f in receivers {
        upper.put_back(f);
    }
    if let Some(top) = upper.field_mut(e.upper_field) {
        top.crust.uplift(dt, e.speed_km);
    }
    lower.put_back(sinking);

    if distance > width_km {
        return lower.add_to_subplate(e.lower_field);
    }
    false
}

fn fold_one(lower: &Plate, upper: &mut Plate, e: &ContactEvent, dt: f64) {
    let Some(source) = lower.field(e.lower_field) else { return };
    if let Some(top) = upper.field_mut(e.upper_field) {
        top.crust.fold(dt, &source.crust, e.speed_km);
    }
}

/// Run subduction and orogeny for every contact, then keep already-sinking fields and subplate
/// fields moving. Each field advances at most once per step.
pub fn apply_contacts(
    plates: &mut [Plate],
    events: &[ContactEvent],
    dt: f64,
    subduction_width_km: f64,
) -> CollisionReport {
    let mut report = CollisionReport::default();
    let mut advanced: BTreeSet<(PlateId, usize)> = BTreeSet::new();
    for e in events {
        let (Some(li), Some(ui)) = (plate_index(plates, e.lower), plate_index(plates, e.upper)) else {
            continue;
        };
        let Some((lower, upper)) = pair_mut(plates, li, ui) else { continue };
        match e.kind {
            ContactKind::Subduction => {
                if !advanced.insert((e.lower, e.lower_field)) {
                    continue;
                }
                if subduct_one(lower, upper, e, dt, subduction_width_km) {
                    report.detached += 1;
                }
            }
            ContactKind::Orogeny => {
                fold_one(lower, upper, e, dt);
                let key = (e.lower.min(e.upper), e.lower.max(e.upper));
                let slowest = report.touching.entry(key).or_insert(f64::INFINITY);
                *slowest = slowest.min(e.speed_km);
            }
        }
    }

    let omegas: BTreeMap<PlateId, DVec3> = plates.iter().map(|p| (p.id, p.angular_velocity)).collect();
    for plate in plates.iter_mut() {
        let omega = plate.angular_velocity;
        let q = plate.orientation;
        let grid = plate.grid().clone();
        let mut detach = Vec::new();
        for f in plate.fields_mut() {
            let Some(s) = f.subduction.as_mut() else { continue };
            if advanced.contains(&(f.plate, f.id)) {
                continue;
            }
            let top = omegas.get(&s.top_plate).copied().unwrap_or(DVec3::ZERO);
            s.distance_km += relative_speed_km(omega, top, q * grid.pos_vec(f.id)) * dt;
            if s.distance_km > subduction_width_km {
                detach.push(f.id);
            }
        }
        for id in detach {
            if plate.add_to_subplate(id) {
                report.detached += 1;
            }
        }

        let mut destroy = Vec::new();
        for f in plate.subplate.fields_mut() {
            let top = f.subduction.map(|s| s.top_plate).and_then(|t| omegas.get(&t).copied());
            let speed = relative_speed_km(omega, top.unwrap_or(DVec3::ZERO), q * grid.pos_vec(f.id));
            let s = f.subduction.get_or_insert(Subduction { distance_km: 0.0, top_plate: plate.id });
            s.distance_km += speed * dt;
            if s.distance_km > SUBPLATE_DESTRUCTION_FACTOR * subduction_width_km {
                destroy.push(f.id);
            }
        }
        for id in destroy {
            plate.subplate.remove(id);
            report.destroyed += 1;
        }
    }
    if report.detached > 0 || report.destroyed > 0 {
        log::debug!("[collisions] detached={} destroyed={}", report.detached, report.destroyed);
    }
    report
}
