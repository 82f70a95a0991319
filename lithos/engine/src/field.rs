//! Grid cells owned by a plate, and the arena that stores them.

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::crust::Crust;
use crate::grid::Grid;
use crate::plate::PlateId;

/// Earthquake overlay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Earthquake {
    /// Magnitude (0..10)
    pub magnitude: f64,
    /// Hypocenter depth (km)
    pub depth: f64,
    /// Remaining lifespan (time units)
    pub lifespan: f64,
}

/// Volcanic eruption overlay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolcanicEruption {
    /// Remaining lifespan (time units)
    pub lifespan: f64,
}

/// Subduction progress of a field sinking under another plate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subduction {
    /// Distance travelled under the overriding plate (km)
    pub distance_km: f64,
    /// Overriding plate
    pub top_plate: PlateId,
}

/// Field of another plate touching this one during the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contact {
    /// Partner plate
    pub plate: PlateId,
    /// Partner field (grid id in the partner's local frame)
    pub field: usize,
}

/// A grid cell owned by one plate.
///
/// `id` is the grid index in the owning plate's local frame. The owning plate is referenced
/// by id only; lookups go through the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Grid index (local frame of the owning plate)
    pub id: usize,
    /// Owning plate
    pub plate: PlateId,
    /// Rock column
    pub crust: Crust,
    /// Normalized age in [0, 1]
    pub age: f64,
    /// At least one neighbor is not owned by the same plate
    pub boundary: bool,
    /// False once moved to a subplate
    pub alive: bool,
    /// Force accumulated this step (world frame)
    pub force: DVec3,
    /// Present while sinking under another plate
    pub subduction: Option<Subduction>,
    /// Partner in a collision this step
    pub collision_partner: Option<Contact>,
    /// Touched by continental collision this step
    pub orogeny: bool,
    /// Inside the buffer zone around a continent edge
    pub continent_buffer: bool,
    /// User marker
    pub marked: bool,
    /// Active earthquake
    pub earthquake: Option<Earthquake>,
    /// Active eruption
    pub volcanic_eruption: Option<VolcanicEruption>,
}

impl Field {
    /// Field carrying `crust`, age 0.
    pub fn new(id: usize, plate: PlateId, crust: Crust) -> Self {
        Self {
            id,
            plate,
            crust,
            age: 0.0,
            boundary: false,
            alive: true,
            force: DVec3::ZERO,
            subduction: None,
            collision_partner: None,
            orogeny: false,
            continent_buffer: false,
            marked: false,
            earthquake: None,
            volcanic_eruption: None,
        }
    }

    /// Freshly created oceanic field (basalt + gabbro, age 0).
    pub fn new_oceanic(id: usize, plate: PlateId) -> Self {
        Self::new(id, plate, Crust::new_oceanic())
    }

    /// Elevation (km) derived from the crust.
    #[inline]
    pub fn elevation(&self) -> f64 {
        self.crust.elevation()
    }

    /// True when the crust is continental.
    #[inline]
    pub fn is_continental(&self) -> bool {
        self.crust.is_continental()
    }

    /// Mass: spherical area times crust thickness.
    pub fn mass(&self, grid: &Grid) -> f64 {
        grid.field_area(self.id) * self.crust.thickness()
    }

    /// Position in the owning plate's local frame.
    #[inline]
    pub fn local_pos(&self, grid: &Grid) -> DVec3 {
        grid.pos_vec(self.id)
    }

    /// World position under plate orientation `q`.
    #[inline]
    pub fn absolute_pos(&self, grid: &Grid, q: DQuat) -> DVec3 {
        q * grid.pos_vec(self.id)
    }

    /// Subduction distance in km (0 when not subducting).
    pub fn subduction_distance(&self) -> f64 {
        self.subduction.map(|s| s.distance_km).unwrap_or(0.0)
    }

    /// Clear the per-step accumulators.
    pub fn reset_step_state(&mut self) {
        self.force = DVec3::ZERO;
        self.collision_partner = None;
        self.orogeny = false;
    }

    /// Age the hazard overlays by `dt`, removing expired ones.
    pub fn tick_hazards(&mut self, dt: f64) {
        if let Some(eq) = &mut self.earthquake {
            eq.lifespan -= dt;
            if eq.lifespan <= 0.0 {
                self.earthquake = None;
            }
        }
        if let Some(v) = &mut self.volcanic_eruption {
            v.lifespan -= dt;
            if v.lifespan <= 0.0 {
                self.volcanic_eruption = None;
            }
        }
    }
}

/// Fields indexed by grid id.
///
/// `take` and `put` let callers hold several fields mutably at once without aliasing the
/// arena.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldArena {
    slots: Vec<Option<Field>>,
    len: usize,
}

impl FieldArena {
    /// Empty arena sized for `cells` grid fields.
    pub fn new(cells: usize) -> Self {
        Self { slots: vec![None; cells], len: 0 }
    }

    /// Number of stored fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no field is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when a field with grid id `id` is stored.
    #[inline]
    pub fn contains(&self, id: usize) -> bool {
        matches!(self.slots.get(id), Some(Some(_)))
    }

    /// Stored field for `id`.
    #[inline]
    pub fn get(&self, id: usize) -> Option<&Field> {
        self.slots.get(id).and_then(|s| s.as_ref())
    }

    /// Stored field for `id`, mutably.
    #[inline]
    pub fn get_mut(&mut self, id: usize) -> Option<&mut Field> {
        self.slots.get_mut(id).and_then(|s| s.as_mut())
    }

    /// Store `field` under its own id, returning the field it replaced. Out-of-range ids are
    /// rejected and handed back.
    pub fn put(&mut self, field: Field) -> Result<Option<Field>, Field> {
        let Some(slot) = self.slots.get_mut(field.id) else {
            log::warn!("[field] id {} outside arena of {}", field.id, self.slots.len());
            return Err(field);
        };
        let old = slot.replace(field);
        if old.is_none() {
            self.len += 1;
        }
        Ok(old)
    }

    /// Remove and return the field stored for `id`.
    pub fn take(&mut self, id: usize) -> Option<Field> {
        let old = self.slots.get_mut(id)?.take();
        if old.is_some() {
            self.len -= 1;
        }
        old
    }

    /// Stored fields in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    /// Stored fields in ascending id order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Field> {
        self.slots.iter_mut().filter_map(|s| s.as_mut())
    }

    /// Stored ids in ascending order.
    pub fn ids(&self) -> Vec<usize> {
        self.iter().map(|f| f.id).collect()
    }
}
