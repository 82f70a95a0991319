//! Surface processes inside one plate: ageing, sediment deposition, erosion, and the sediment
//! and metamorphism diffusion operators.

use crate::config::ModelProps;
use crate::crust::{Crust, MAX_OCEANIC_SEDIMENT};
use crate::field::Field;
use crate::plate::Plate;
use crate::rock::Rock;

/// Normalized age gained per time unit.
pub const AGE_RATE: f64 = 0.01;
/// Pelagic sediment settling on oceanic crust (km per time unit).
pub const OCEANIC_SEDIMENT_RATE: f64 = 0.01;

/// Run surface processes on every field of `plate`, in ascending id order.
pub fn run_surface(plate: &mut Plate, dt: f64, props: &ModelProps) {
    if !(dt.is_finite() && dt > 0.0) {
        log::warn!("[surface] rejected dt={dt}");
        return;
    }
    let grid = plate.grid().clone();
    for f in plate.fields_mut() {
        f.age = (f.age + dt * AGE_RATE).min(1.0);
        if props.sediments
            && !f.is_continental()
            && f.crust.thickness_of(Rock::OceanicSediment) < MAX_OCEANIC_SEDIMENT
        {
            f.crust.add_rock(Rock::OceanicSediment, OCEANIC_SEDIMENT_RATE * dt, 0.0);
        }
    }
    if !(props.erosion || props.sediments || props.metamorphism) {
        return;
    }
    for id in plate.field_ids() {
        let Some(mut field) = plate.take_field(id) else { continue };
        let mut neighbors: Vec<Field> =
            grid.neighbors(id).iter().filter_map(|&n| plate.take_field(n as usize)).collect();
        {
            let mut crusts: Vec<&mut Crust> = neighbors.iter_mut().map(|n| &mut n.crust).collect();
            if props.erosion {
                field.crust.erode(dt, &mut crusts);
            }
            if props.sediments {
                field.crust.spread_oceanic_sediment(dt, &mut crusts);
                field.crust.spread_excess_sediment(dt, &mut crusts);
            }
            if props.metamorphism {
                field.crust.spread_metamorphism(&mut crusts);
            }
        }
        for n in neighbors {
            plate.put_back(n);
        }
        plate.put_back(field);
    }
}
