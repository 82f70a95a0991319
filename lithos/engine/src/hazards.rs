//! Earthquake and volcanic eruption overlays.

use std::collections::BTreeMap;

use glam::DVec3;

use crate::config::ModelProps;
use crate::field::{Earthquake, VolcanicEruption};
use crate::forces::relative_speed_km;
use crate::plate::{Plate, PlateId};
use crate::rng::SimRng;

/// Chance per collision field per step.
pub const EARTHQUAKE_PROBABILITY: f64 = 0.05;
/// Earthquake lifespan in steps.
pub const EARTHQUAKE_LIFESPAN_STEPS: f64 = 15.0;
/// Cap on earthquake magnitude.
pub const MAX_MAGNITUDE: f64 = 10.0;
/// Shallowest hypocenter (km).
pub const EARTHQUAKE_BASE_DEPTH_KM: f64 = 10.0;
/// Extra hypocenter depth per km of subduction.
pub const EARTHQUAKE_DEPTH_RATIO: f64 = 0.1;
/// Chance per eligible overriding field per step.
pub const VOLCANIC_ERUPTION_PROBABILITY: f64 = 0.02;
/// Eruption lifespan in steps.
pub const VOLCANIC_ERUPTION_LIFESPAN_STEPS: f64 = 10.0;
/// Partner subduction depth window for arc volcanism (km).
pub const VOLCANIC_WINDOW_KM: (f64, f64) = (300.0, 900.0);

enum Event {
    Quake(usize, usize, Earthquake),
    Eruption(usize, usize, VolcanicEruption),
}

/// Age existing overlays, then roll new ones on collision fields. Draws from `rng` in plate
/// then field id order, so the outcome only depends on the model state and the RNG state.
pub fn update_hazards(plates: &mut [Plate], rng: &mut SimRng, props: &ModelProps) {
    let dt = props.timestep;
    for plate in plates.iter_mut() {
        for f in plate.fields_mut() {
            f.tick_hazards(dt);
        }
    }
    if !(props.earthquakes || props.volcanic_eruptions) {
        return;
    }
    let omegas: BTreeMap<PlateId, DVec3> = plates.iter().map(|p| (p.id, p.angular_velocity)).collect();
    let mut events = Vec::new();
    for (pi, plate) in plates.iter().enumerate() {
        for f in plate.fields() {
            let Some(contact) = f.collision_partner else { continue };
            let partner = plates.iter().find(|p| p.id == contact.plate);
            let partner_field = partner.and_then(|p| p.field(contact.field));

            if props.earthquakes && f.earthquake.is_none() && rng.chance(EARTHQUAKE_PROBABILITY) {
                let other = omegas.get(&contact.plate).copied().unwrap_or(DVec3::ZERO);
                let speed = relative_speed_km(plate.angular_velocity, other, plate.absolute_pos(f.id));
                let sunk = f
                    .subduction_distance()
                    .max(partner_field.map(|pf| pf.subduction_distance()).unwrap_or(0.0));
                events.push(Event::Quake(
                    pi,
                    f.id,
                    Earthquake {
                        magnitude: speed.min(MAX_MAGNITUDE),
                        depth: EARTHQUAKE_BASE_DEPTH_KM + sunk * EARTHQUAKE_DEPTH_RATIO,
                        lifespan: EARTHQUAKE_LIFESPAN_STEPS * dt,
                    },
                ));
            }

            if props.volcanic_eruptions && f.subduction.is_none() && f.volcanic_eruption.is_none() {
                let depth = partner_field.and_then(|pf| pf.subduction).map(|s| s.distance_km);
                let in_window =
                    depth.map(|d| d >= VOLCANIC_WINDOW_KM.0 && d <= VOLCANIC_WINDOW_KM.1).unwrap_or(false);
                if in_window && rng.chance(VOLCANIC_ERUPTION_PROBABILITY) {
                    events.push(Event::Eruption(
                        pi,
                        f.id,
                        VolcanicEruption { lifespan: VOLCANIC_ERUPTION_LIFESPAN_STEPS * dt },
                    ));
                }
            }
        }
    }
    for e in events {
        match e {
            Event::Quake(pi, id, q) => {
                if let Some(f) = plates[pi].field_mut(id) {
                    f.earthquake = Some(q);
                }
            }
            Event::Eruption(pi, id, v) => {
                if let Some(f) = plates[pi].field_mut(id) {
                    f.volcanic_eruption = Some(v);
                }
            }
        }
    }
}
