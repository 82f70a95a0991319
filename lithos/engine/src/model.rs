//! Model: all plates plus the per-step pipeline.
//!
//! One `step()` runs, strictly in order:
//! 1. ownership resolution (`collisions::find_contacts`)
//! 2. force accumulation (`forces`)
//! 3. integration (`integrator`)
//! 4. boundary processes: subduction and orogeny, surface processes, rifting
//! 5. plate lifecycle: plate groups, plate division
//! 6. hazards
//!
//! Snapshot emission happens on demand through `Model::output`.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::{DMat3, DVec3};

use crate::collisions::{self, density_order};
use crate::config::ModelProps;
use crate::crust::{Crust, DEFAULT_GRANITE_THICKNESS};
use crate::field::Field;
use crate::forces::{self, BASAL_DRAG};
use crate::geo::arc_angle;
use crate::grid::Grid;
use crate::hazards;
use crate::integrator;
use crate::plate::{HotSpot, Plate, PlateId, CONTINENT_BUFFER_WIDTH_KM};
use crate::plate_division;
use crate::plate_group::{PlateGroup, MERGE_SPEED_KM};
use crate::rifting;
use crate::rng::SimRng;
use crate::spatial_index::SpatialIndex;
use crate::surface;
use crate::units::{km, rad_to_km};

/// Radius of the continent drawing brush (km).
pub const CONTINENT_BRUSH_RADIUS_KM: f64 = 600.0;

/// Per-field seed used to build a model: owning plate and crust type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSeed {
    /// Owning plate
    pub plate: PlateId,
    /// Start with continental crust
    pub continental: bool,
}

/// The simulated planet.
#[derive(Debug, Clone)]
pub struct Model {
    index: Arc<SpatialIndex>,
    plates: Vec<Plate>,
    groups: Vec<PlateGroup>,
    next_group_id: u32,
    /// Live properties
    pub props: ModelProps,
    rng: SimRng,
    time: f64,
    step_idx: u64,
}

impl Model {
    /// Empty model. The RNG is seeded from `props.seed` when `props.deterministic` is set.
    pub fn new(index: Arc<SpatialIndex>, props: ModelProps) -> Self {
        let rng = if props.deterministic { SimRng::seeded(props.seed) } else { SimRng::from_entropy() };
        Self {
            index,
            plates: Vec::new(),
            groups: Vec::new(),
            next_group_id: 0,
            props,
            rng,
            time: 0.0,
            step_idx: 0,
        }
    }

    /// Build plates from one seed per grid field (`None` leaves the field unowned). Plates get
    /// densities in id order, so plate 0 is the lightest.
    pub fn from_seeds(
        index: Arc<SpatialIndex>,
        seeds: &[Option<FieldSeed>],
        props: ModelProps,
    ) -> Self {
        let mut model = Self::new(index, props);
        let grid = model.grid().clone();
        let mut plates: BTreeMap<PlateId, Plate> = BTreeMap::new();
        for (id, seed) in seeds.iter().enumerate().take(grid.cells) {
            let Some(seed) = seed else { continue };
            let plate = plates.entry(seed.plate).or_insert_with(|| {
                let mut p = Plate::new(seed.plate, grid.clone());
                p.hue = (seed.plate as f64 * 137.508) % 360.0;
                p
            });
            let crust = if seed.continental {
                Crust::new_continental(DEFAULT_GRANITE_THICKNESS)
            } else {
                Crust::new_oceanic()
            };
            plate.add_field(Field::new(id, seed.plate, crust));
        }
        for (rank, plate) in plates.values_mut().enumerate() {
            plate.density = rank as f64;
            plate.calculate_continent_buffers(CONTINENT_BUFFER_WIDTH_KM);
            plate.update_inertia_tensor();
        }
        model.plates = plates.into_values().collect();
        log::info!("[model] built {} plates on {} fields", model.plates.len(), grid.cells);
        model
    }

    /// Reassemble a model from its parts (state loading).
    pub(crate) fn from_parts(
        index: Arc<SpatialIndex>,
        mut plates: Vec<Plate>,
        groups: Vec<PlateGroup>,
        props: ModelProps,
        rng: SimRng,
        time: f64,
        step_idx: u64,
    ) -> Self {
        plates.sort_by_key(|p| p.id);
        let next_group_id = groups.iter().map(|g| g.id + 1).max().unwrap_or(0);
        Self { index, plates, groups, next_group_id, props, rng, time, step_idx }
    }

    /// Shared grid.
    pub fn grid(&self) -> &Arc<Grid> {
        self.index.grid()
    }

    /// Shared spatial index.
    pub fn index(&self) -> &Arc<SpatialIndex> {
        &self.index
    }

    /// Plates in ascending id order.
    pub fn plates(&self) -> &[Plate] {
        &self.plates
    }

    /// Plate by id.
    pub fn plate(&self, id: PlateId) -> Option<&Plate> {
        self.plates.iter().find(|p| p.id == id)
    }

    /// Plate by id, mutably.
    pub fn plate_mut(&mut self, id: PlateId) -> Option<&mut Plate> {
        self.plates.iter_mut().find(|p| p.id == id)
    }

    /// Active plate groups.
    pub fn groups(&self) -> &[PlateGroup] {
        &self.groups
    }

    /// Model time.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Completed steps.
    pub fn step_idx(&self) -> u64 {
        self.step_idx
    }

    /// RNG state.
    pub fn rng(&self) -> &SimRng {
        &self.rng
    }

    /// Replace the RNG (used when the deterministic seed changes).
    pub fn reseed(&mut self, seed: u64) {
        self.rng = SimRng::seeded(seed);
    }

    /// Add a plate, keeping id order. A plate with an existing id replaces it.
    pub fn insert_plate(&mut self, plate: Plate) {
        match self.plates.binary_search_by_key(&plate.id, |p| p.id) {
            Ok(i) => self.plates[i] = plate,
            Err(i) => self.plates.insert(i, plate),
        }
    }

    /// Run one step.
    pub fn step(&mut self) {
        let dt = self.props.timestep;
        for p in &mut self.plates {
            for f in p.fields_mut() {
                f.reset_step_state();
            }
        }

        let contacts = collisions::find_contacts(&self.plates, &self.index);
        collisions::mark_contacts(&mut self.plates, &contacts);

        let omegas: BTreeMap<PlateId, DVec3> =
            self.plates.iter().map(|p| (p.id, p.angular_velocity)).collect();
        for p in &mut self.plates {
            p.calculate_continent_buffers(CONTINENT_BUFFER_WIDTH_KM);
            p.update_inertia_tensor();
            if self.props.hot_spot_decay {
                forces::decay_hot_spot(p, dt);
            }
            forces::accumulate_forces(p, &omegas);
        }

        self.integrate(dt);

        let report = collisions::apply_contacts(
            &mut self.plates,
            &contacts,
            dt,
            self.props.subduction_width_km,
        );
        for p in &mut self.plates {
            surface::run_surface(p, dt, &self.props);
        }
        rifting::fill_gaps(&mut self.plates, &self.index);

        self.update_groups(&report.touching);
        if self.props.plate_division {
            self.divide_plates();
        }
        self.remove_empty_plates();

        hazards::update_hazards(&mut self.plates, &mut self.rng, &self.props);

        self.time += dt;
        self.step_idx += 1;
    }

    fn integrate(&mut self, dt: f64) {
        let method = self.props.integration;
        let shared: Vec<(u32, DVec3)> =
            self.groups.iter().map(|g| (g.id, g.angular_velocity(&self.plates))).collect();
        let alphas: Vec<DVec3> = self
            .plates
            .iter()
            .map(|p| p.angular_acceleration(&self.groups, &self.plates))
            .collect();
        for (p, alpha) in self.plates.iter_mut().zip(alphas) {
            let omega = p
                .group
                .and_then(|gid| shared.iter().find(|(id, _)| *id == gid))
                .map(|&(_, w)| w)
                .unwrap_or(p.angular_velocity);
            let drag = if p.inv_inertia == DMat3::ZERO { 0.0 } else { BASAL_DRAG };
            let s = integrator::integrate(method, p.orientation, omega, alpha, drag, dt);
            p.orientation = s.orientation;
            p.angular_velocity = s.angular_velocity;
        }
    }

    fn group_of(&self, plate: PlateId) -> Option<usize> {
        self.groups.iter().position(|g| g.contains(plate))
    }

    fn update_groups(&mut self, touching: &BTreeMap<(PlateId, PlateId), f64>) {
        let before = self.groups.len();
        self.groups.retain(|g| touching.keys().any(|(a, b)| g.contains(*a) && g.contains(*b)));
        if self.groups.len() != before {
            log::info!("[model] dissolved {} plate groups", before - self.groups.len());
        }

        let mut merged = Vec::new();
        for (&(a, b), &speed) in touching {
            if speed >= MERGE_SPEED_KM {
                continue;
            }
            let gid = match (self.group_of(a), self.group_of(b)) {
                (Some(x), Some(y)) if x == y => continue,
                (None, None) => {
                    let id = self.next_group_id;
                    self.next_group_id += 1;
                    self.groups.push(PlateGroup::new(id, a, b));
                    id
                }
                (Some(x), None) => {
                    self.groups[x].members.insert(b);
                    self.groups[x].id
                }
                (None, Some(y)) => {
                    self.groups[y].members.insert(a);
                    self.groups[y].id
                }
                (Some(x), Some(y)) => {
                    let other = self.groups.remove(y);
                    let x = if y < x { x - 1 } else { x };
                    self.groups[x].absorb(other);
                    self.groups[x].id
                }
            };
            log::info!("[model] plates {a} and {b} merged into group {gid}");
            merged.push(gid);
        }

        for p in &mut self.plates {
            p.group = self.groups.iter().find(|g| g.contains(p.id)).map(|g| g.id);
        }
        for gid in merged {
            let Some(g) = self.groups.iter().find(|g| g.id == gid) else { continue };
            let omega = g.angular_velocity(&self.plates);
            for p in self.plates.iter_mut().filter(|p| p.group == Some(gid)) {
                p.angular_velocity = omega;
            }
        }
    }

    fn divide_plates(&mut self) {
        let Some(pid) = plate_division::find_oversized(&self.plates) else { return };
        let new_id = self.plates.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        let Some(idx) = self.plates.iter().position(|p| p.id == pid) else { return };
        if let Some(child) = plate_division::divide(&mut self.plates[idx], new_id, &mut self.rng) {
            self.insert_plate(child);
        }
    }

    fn remove_empty_plates(&mut self) {
        let before = self.plates.len();
        self.plates.retain(|p| !(p.is_empty() && p.subplate.is_empty()));
        if self.plates.len() == before {
            return;
        }
        let alive: Vec<PlateId> = self.plates.iter().map(|p| p.id).collect();
        for g in &mut self.groups {
            g.members.retain(|m| alive.contains(m));
        }
        self.groups.retain(|g| g.members.len() > 1);
        for p in &mut self.plates {
            p.group = self.groups.iter().find(|g| g.contains(p.id)).map(|g| g.id);
        }
    }

    /// Topmost (lightest) plate owning a field at world position `position`, with that field id.
    pub fn field_at(&self, position: DVec3) -> Option<(PlateId, usize)> {
        let mut order: Vec<&Plate> = self.plates.iter().collect();
        order.sort_by(|a, b| density_order(a, b));
        order
            .into_iter()
            .find_map(|p| p.field_at_absolute_pos(&self.index, position).map(|f| (p.id, f.id)))
    }

    /// Attach a hot spot to the plate under `position`. Returns false when no plate is there.
    pub fn set_hot_spot(&mut self, position: DVec3, force: DVec3) -> bool {
        if !force.is_finite() {
            log::warn!("[model] rejected hot spot force {force:?}");
            return false;
        }
        let Some((pid, _)) = self.field_at(position) else { return false };
        let Some(plate) = self.plate_mut(pid) else { return false };
        plate.hot_spot = HotSpot { position: position.normalize().to_array(), force: force.to_array() };
        log::debug!("[model] hot spot on plate {pid}");
        true
    }

    /// Update plate densities. Unknown ids and non-finite values are skipped.
    pub fn set_densities(&mut self, densities: &BTreeMap<PlateId, f64>) {
        for (&id, &d) in densities {
            if !d.is_finite() {
                log::warn!("[model] rejected density {d} for plate {id}");
                continue;
            }
            match self.plate_mut(id) {
                Some(p) => p.density = d,
                None => log::debug!("[model] set_densities: no plate {id}"),
            }
        }
    }

    /// Mark the field under `position`.
    pub fn mark_field(&mut self, position: DVec3) -> bool {
        let Some((pid, fid)) = self.field_at(position) else { return false };
        match self.plate_mut(pid).and_then(|p| p.field_mut(fid)) {
            Some(f) => {
                f.marked = true;
                true
            }
            None => false,
        }
    }

    /// Clear every marker.
    pub fn unmark_all_fields(&mut self) {
        for p in &mut self.plates {
            for f in p.fields_mut() {
                f.marked = false;
            }
        }
    }

    fn paint(&mut self, position: DVec3, continental: bool) -> usize {
        let Some((pid, _)) = self.field_at(position) else { return 0 };
        let Some(plate) = self.plate_mut(pid) else { return 0 };
        let center = position.normalize();
        let max_angle = km(CONTINENT_BRUSH_RADIUS_KM).to_radians();
        let q = plate.orientation;
        let grid = plate.grid().clone();
        let mut painted = 0;
        for f in plate.fields_mut() {
            let p = q * grid.pos_vec(f.id);
            if arc_angle(p.to_array(), center.to_array()) > max_angle {
                continue;
            }
            if continental {
                f.crust.make_continental();
            } else {
                f.crust.make_oceanic();
            }
            painted += 1;
        }
        plate.calculate_continent_buffers(CONTINENT_BUFFER_WIDTH_KM);
        plate.update_inertia_tensor();
        log::debug!(
            "[model] painted {painted} fields on plate {pid} ({:.0} km brush)",
            rad_to_km(max_angle)
        );
        painted
    }

    /// Turn fields around `position` into continental crust. Returns the number of fields changed.
    pub fn draw_continent(&mut self, position: DVec3) -> usize {
        self.paint(position, true)
    }

    /// Reset fields around `position` to oceanic crust.
    pub fn erase_continent(&mut self, position: DVec3) -> usize {
        self.paint(position, false)
    }
}
