//! Rigid plates: field ownership, the adjacent ring, subplate, and rigid-body state.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use glam::{DMat3, DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::field::{Field, FieldArena};
use crate::grid::Grid;
use crate::plate_group::PlateGroup;
use crate::spatial_index::SpatialIndex;

/// Plate identifier.
pub type PlateId = u32;

/// Inverse inertia is zeroed below this determinant.
pub const MIN_INERTIA_DET: f64 = 1e-12;

/// Default width of the buffer zone around continents (km).
pub const CONTINENT_BUFFER_WIDTH_KM: f64 = 700.0;

/// Persistent torque source, stored in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HotSpot {
    /// Point of application (unit sphere, world frame)
    pub position: [f64; 3],
    /// Force vector (world frame)
    pub force: [f64; 3],
}

impl HotSpot {
    /// `position × force`
    pub fn torque(&self) -> DVec3 {
        DVec3::from_array(self.position).cross(DVec3::from_array(self.force))
    }
}

/// Fields detached from a subducting plate. They keep sinking for rendering continuity but take
/// no part in collisions.
#[derive(Debug, Clone, PartialEq)]
pub struct Subplate {
    fields: FieldArena,
}

impl Subplate {
    fn new(cells: usize) -> Self {
        Self { fields: FieldArena::new(cells) }
    }

    /// Detached fields in ascending id order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Detached fields, mutably.
    pub fn fields_mut(&mut self) -> impl Iterator<Item = &mut Field> {
        self.fields.iter_mut()
    }

    /// Number of detached fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Insert a detached field (marked not alive).
    pub fn add(&mut self, mut field: Field) {
        field.alive = false;
        field.boundary = false;
        field.collision_partner = None;
        if self.fields.put(field).is_err() {
            log::warn!("[plate] subplate rejected out-of-range field");
        }
    }

    /// Drop a field for good.
    pub fn remove(&mut self, id: usize) -> Option<Field> {
        self.fields.take(id)
    }
}

/// Rigid lithospheric plate.
#[derive(Debug, Clone)]
pub struct Plate {
    /// Identifier
    pub id: PlateId,
    /// Density rank: the higher value subducts
    pub density: f64,
    /// Display hue in degrees (identity only)
    pub hue: f64,
    /// Local-to-world rotation, always unit length
    pub orientation: DQuat,
    /// Angular velocity (rad per time unit, world frame)
    pub angular_velocity: DVec3,
    /// Sum of field masses
    pub mass: f64,
    /// Inertia tensor about the planet center (world frame)
    pub inertia: DMat3,
    /// Inverse of `inertia` (zero when singular)
    pub inv_inertia: DMat3,
    /// Mass-weighted mean direction (world frame)
    pub center: DVec3,
    /// Hot spot driving the plate
    pub hot_spot: HotSpot,
    /// Plate group this plate belongs to
    pub group: Option<u32>,
    /// Detached subducting fields
    pub subplate: Subplate,
    fields: FieldArena,
    adjacent: BTreeSet<usize>,
    grid: Arc<Grid>,
}

impl PartialEq for Plate {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.density == other.density
            && self.hue == other.hue
            && self.orientation == other.orientation
            && self.angular_velocity == other.angular_velocity
            && self.mass == other.mass
            && self.inertia == other.inertia
            && self.inv_inertia == other.inv_inertia
            && self.center == other.center
            && self.hot_spot == other.hot_spot
            && self.group == other.group
            && self.subplate == other.subplate
            && self.fields == other.fields
            && self.adjacent == other.adjacent
    }
}

impl Plate {
    /// Empty plate with identity orientation and no motion.
    pub fn new(id: PlateId, grid: Arc<Grid>) -> Self {
        let cells = grid.cells;
        Self {
            id,
            density: id as f64,
            hue: 0.0,
            orientation: DQuat::IDENTITY,
            angular_velocity: DVec3::ZERO,
            mass: 0.0,
            inertia: DMat3::ZERO,
            inv_inertia: DMat3::ZERO,
            center: DVec3::ZERO,
            hot_spot: HotSpot::default(),
            group: None,
            subplate: Subplate::new(cells),
            fields: FieldArena::new(cells),
            adjacent: BTreeSet::new(),
            grid,
        }
    }

    /// Shared grid.
    #[inline]
    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    /// Owned fields in ascending id order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Owned fields, mutably.
    pub fn fields_mut(&mut self) -> impl Iterator<Item = &mut Field> {
        self.fields.iter_mut()
    }

    /// Owned field ids, ascending.
    pub fn field_ids(&self) -> Vec<usize> {
        self.fields.ids()
    }

    /// Owned field by local grid id.
    #[inline]
    pub fn field(&self, id: usize) -> Option<&Field> {
        self.fields.get(id)
    }

    /// Owned field by local grid id, mutably.
    #[inline]
    pub fn field_mut(&mut self, id: usize) -> Option<&mut Field> {
        self.fields.get_mut(id)
    }

    /// Temporarily remove a field without touching the ring or boundary flags. Must be paired
    /// with [`Plate::put_back`].
    pub fn take_field(&mut self, id: usize) -> Option<Field> {
        self.fields.take(id)
    }

    /// Return a field obtained with [`Plate::take_field`].
    pub fn put_back(&mut self, field: Field) {
        if self.fields.put(field).is_err() {
            log::warn!("[plate] plate {} dropped an out-of-range field", self.id);
        }
    }

    /// True when the plate owns field `id`.
    #[inline]
    pub fn has_field(&self, id: usize) -> bool {
        self.fields.contains(id)
    }

    /// Number of owned fields.
    #[inline]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// True when the plate owns nothing.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Ids not owned by this plate that touch at least one owned field.
    pub fn adjacent_fields(&self) -> &BTreeSet<usize> {
        &self.adjacent
    }

    /// True iff `id` is not owned but has an owned neighbor.
    pub fn is_adjacent_field(&self, id: usize) -> bool {
        !self.has_field(id) && self.grid.neighbors(id).iter().any(|&n| self.has_field(n as usize))
    }

    /// True iff at least one neighbor of `id` is not owned.
    pub fn is_boundary(&self, id: usize) -> bool {
        self.grid.neighbors(id).iter().any(|&n| !self.has_field(n as usize))
    }

    /// Total spherical area of owned fields (sr).
    pub fn area(&self) -> f64 {
        self.fields.iter().map(|f| self.grid.field_area(f.id)).sum()
    }

    /// Take ownership of `field`. Neighbors that became interior lose their boundary flag and
    /// unowned neighbors join the adjacent ring. Out-of-range ids are rejected.
    pub fn add_field(&mut self, mut field: Field) -> bool {
        let id = field.id;
        if !self.grid.contains(id) {
            log::warn!("[plate] plate {} rejected field id {id}", self.id);
            return false;
        }
        field.plate = self.id;
        field.alive = true;
        if self.fields.put(field).is_err() {
            return false;
        }
        self.adjacent.remove(&id);
        let boundary = self.is_boundary(id);
        if let Some(f) = self.fields.get_mut(id) {
            f.boundary = boundary;
        }
        let neighbors: Vec<usize> = self.grid.neighbors(id).iter().map(|&n| n as usize).collect();
        for n in neighbors {
            if self.has_field(n) {
                let b = self.is_boundary(n);
                if let Some(f) = self.fields.get_mut(n) {
                    f.boundary = b;
                }
            } else {
                self.adjacent.insert(n);
            }
        }
        true
    }

    /// Give up field `id`. Owned neighbors become boundary fields, the freed id joins the ring if
    /// it still touches the plate, and ring members with no owned neighbor left are dropped.
    pub fn delete_field(&mut self, id: usize) -> Option<Field> {
        let field = self.fields.take(id)?;
        let neighbors: Vec<usize> = self.grid.neighbors(id).iter().map(|&n| n as usize).collect();
        let mut touches = false;
        for &n in &neighbors {
            if let Some(f) = self.fields.get_mut(n) {
                f.boundary = true;
                touches = true;
            } else if !self.is_adjacent_field(n) {
                self.adjacent.remove(&n);
            }
        }
        if touches {
            self.adjacent.insert(id);
        }
        Some(field)
    }

    /// Add `id` to the adjacent ring if it is a valid unowned id.
    pub fn add_adjacent_field(&mut self, id: usize) -> bool {
        if !self.grid.contains(id) || self.has_field(id) {
            return false;
        }
        self.adjacent.insert(id)
    }

    /// Detach field `id` into the subplate.
    pub fn add_to_subplate(&mut self, id: usize) -> bool {
        match self.delete_field(id) {
            Some(f) => {
                self.subplate.add(f);
                true
            }
            None => false,
        }
    }

    /// Recompute every boundary flag and rebuild the adjacent ring from scratch.
    pub fn refresh_topology(&mut self) {
        let ids = self.fields.ids();
        let mut ring = BTreeSet::new();
        for id in ids {
            let mut boundary = false;
            for &n in self.grid.neighbors(id) {
                if !self.has_field(n as usize) {
                    boundary = true;
                    ring.insert(n as usize);
                }
            }
            if let Some(f) = self.fields.get_mut(id) {
                f.boundary = boundary;
            }
        }
        self.adjacent = ring;
    }

    /// World position of local grid id `id`.
    #[inline]
    pub fn absolute_pos(&self, id: usize) -> DVec3 {
        self.orientation * self.grid.pos_vec(id)
    }

    /// Local grid id nearest to world position `p` (owned or not).
    pub fn local_id_at(&self, index: &SpatialIndex, p: DVec3) -> Option<usize> {
        index.nearest_vec(self.orientation.inverse() * p)
    }

    /// Owned field nearest to world position `p`.
    pub fn field_at_absolute_pos(&self, index: &SpatialIndex, p: DVec3) -> Option<&Field> {
        self.local_id_at(index, p).and_then(|id| self.fields.get(id))
    }

    /// Recompute mass, center, inertia tensor and its inverse from owned fields at their
    /// current world positions.
    pub fn update_inertia_tensor(&mut self) {
        let mut mass = 0.0;
        let mut inertia = DMat3::ZERO;
        let mut weighted = DVec3::ZERO;
        for f in self.fields.iter() {
            let m = f.mass(&self.grid);
            let r = self.orientation * self.grid.pos_vec(f.id);
            mass += m;
            weighted += r * m;
            let outer = DMat3::from_cols(r * r.x, r * r.y, r * r.z);
            inertia += (DMat3::IDENTITY * r.length_squared() - outer) * m;
        }
        self.mass = mass;
        self.inertia = inertia;
        self.center = weighted.try_normalize().unwrap_or(DVec3::ZERO);
        let det = inertia.determinant();
        self.inv_inertia = if det.abs() < MIN_INERTIA_DET {
            if !self.fields.is_empty() {
                log::warn!("[plate] plate {} has singular inertia (det={det:.3e})", self.id);
            }
            DMat3::ZERO
        } else {
            inertia.inverse()
        };
    }

    /// Hot-spot torque plus the torque of every field force.
    pub fn total_torque(&self) -> DVec3 {
        let mut t = self.hot_spot.torque();
        for f in self.fields.iter() {
            if f.force != DVec3::ZERO {
                t += self.absolute_pos(f.id).cross(f.force);
            }
        }
        t
    }

    /// `inv_inertia · total_torque`, ignoring any plate group.
    pub fn own_angular_acceleration(&self) -> DVec3 {
        self.inv_inertia * self.total_torque()
    }

    /// Angular acceleration this step: the shared one of the plate's group when it belongs to
    /// one of `groups`, otherwise [`Plate::own_angular_acceleration`]. `plates` must hold the
    /// group members.
    pub fn angular_acceleration(&self, groups: &[PlateGroup], plates: &[Plate]) -> DVec3 {
        match self.group.and_then(|gid| groups.iter().find(|g| g.id == gid)) {
            Some(g) => g.angular_acceleration(plates),
            None => self.own_angular_acceleration(),
        }
    }

    /// Flag oceanic fields within `width_km` of a continental edge.
    pub fn calculate_continent_buffers(&mut self, width_km: f64) {
        let hop_km = self.grid.field_diameter_km().max(f64::EPSILON);
        let max_hops = (width_km / hop_km).floor() as usize;
        let mut dist: Vec<Option<usize>> = vec![None; self.grid.cells];
        let mut queue = VecDeque::new();
        for f in self.fields.iter() {
            if f.is_continental() {
                continue;
            }
            let touches_continent = self.grid.neighbors(f.id).iter().any(|&n| {
                self.fields.get(n as usize).map(|nf| nf.is_continental()).unwrap_or(false)
            });
            if touches_continent {
                dist[f.id] = Some(0);
                queue.push_back(f.id);
            }
        }
        while let Some(u) = queue.pop_front() {
            let Some(du) = dist[u] else { continue };
            if du >= max_hops {
                continue;
            }
            for &n in self.grid.neighbors(u) {
                let n = n as usize;
                if dist[n].is_some() {
                    continue;
                }
                if let Some(nf) = self.fields.get(n) {
                    if !nf.is_continental() {
                        dist[n] = Some(du + 1);
                        queue.push_back(n);
                    }
                }
            }
        }
        for f in self.fields.iter_mut() {
            f.continent_buffer = dist[f.id].is_some();
        }
    }
}
