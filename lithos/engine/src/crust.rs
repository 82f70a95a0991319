//! Layered rock column carried by every field, plus the geological operators that move rock
//! between columns.
//!
//! Thickness is in km. Layers are kept in [`Rock`] precedence order (surface first) and never
//! hold two entries of the same rock. Operators reject negative inputs with a warning instead
//! of failing: a negative delta here always means a bug upstream.

use serde::{Deserialize, Serialize};

use crate::rock::Rock;

/// Hard cap on total column thickness (km).
pub const MAX_CRUST_THICKNESS: f64 = 70.0;
/// km of elevation per km of crust.
pub const ELEVATION_SCALE: f64 = 0.18;
/// Elevation offset so that fresh oceanic crust sits around -4 km.
pub const ELEVATION_OFFSET: f64 = 5.3;
/// Lowest reported elevation (km).
pub const MIN_ELEVATION: f64 = -11.0;
/// Highest reported elevation (km).
pub const MAX_ELEVATION: f64 = 9.0;
/// Initial uplift budget (km of granite a column may ever gain from subduction).
pub const BASE_UPLIFT_CAPACITY: f64 = 15.0;
/// Granite thickness above which a column counts as continental.
pub const CONTINENTAL_GRANITE_THICKNESS: f64 = 10.0;
/// Fresh oceanic crust.
pub const NEW_BASALT_THICKNESS: f64 = 2.0;
/// Fresh oceanic crust.
pub const NEW_GABBRO_THICKNESS: f64 = 5.0;
/// Default continental basement.
pub const DEFAULT_GRANITE_THICKNESS: f64 = 30.0;
/// Metamorphic grade given to sediment scraped into an accretionary wedge.
pub const LOW_GRADE: f64 = 0.25;
/// Metamorphic grade given to folded rock.
pub const MEDIUM_GRADE: f64 = 0.5;
/// Layers thinner than this are dropped.
pub const MIN_LAYER_THICKNESS: f64 = 1e-6;

/// Fraction of a layer removed per (time unit × km/time unit) of convergence.
pub const SUBDUCTION_INTENSITY: f64 = 1e-3;
/// Fraction of a layer folded per (time unit × km/time unit) of convergence.
pub const FOLDING_INTENSITY: f64 = 1e-3;
/// km of granite per (time unit × unit strength).
pub const UPLIFT_RATE: f64 = 5e-3;
/// Elevation drop (km) to a neighbor that counts as a steep slope.
pub const EROSION_SLOPE: f64 = 1.5;
/// Fraction of each layer eroded per time unit on steep slopes.
pub const EROSION_RATE: f64 = 0.02;
/// Oceanic sediment cap (km).
pub const MAX_OCEANIC_SEDIMENT: f64 = 0.5;
/// Continental sediment cap (km).
pub const MAX_CONTINENTAL_SEDIMENT: f64 = 1.5;
/// Share of spread excess that arrives at neighbors (the rest compacts away).
pub const SEDIMENT_DAMPING: f64 = 0.6;
/// Spread rate of excess sediment per time unit.
pub const SEDIMENT_SPREAD_RATE: f64 = 5.0;
/// Minimum grade that diffuses into neighbors.
pub const METAMORPHISM_SPREAD_MIN: f64 = 0.3;
/// Grade attenuation per diffusion hop.
pub const METAMORPHISM_DAMPING: f64 = 0.5;

/// One rock layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RockLayer {
    /// Rock type
    pub rock: Rock,
    /// Thickness (km, ≥ 0)
    pub thickness: f64,
    /// Metamorphic grade in [0, 1]
    pub metamorphic: f64,
}

/// Ordered stack of rock layers.
#[derive(Debug, Clone, PartialEq)]
pub struct Crust {
    layers: Vec<RockLayer>,
    max_crust_thickness: f64,
    uplift_capacity: f64,
}

impl Default for Crust {
    fn default() -> Self {
        Self::empty()
    }
}

fn rejects(op: &str, name: &str, v: f64) -> bool {
    if v.is_finite() && v >= 0.0 {
        return false;
    }
    log::warn!("[crust] {op}: rejected {name}={v}");
    true
}

fn clamp_grade(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl Crust {
    /// Column without any rock.
    pub fn empty() -> Self {
        Self {
            layers: Vec::new(),
            max_crust_thickness: MAX_CRUST_THICKNESS,
            uplift_capacity: BASE_UPLIFT_CAPACITY,
        }
    }

    /// Fresh oceanic crust: basalt over gabbro, no sediment.
    pub fn new_oceanic() -> Self {
        let mut c = Self::empty();
        c.add_rock(Rock::Basalt, NEW_BASALT_THICKNESS, 0.0);
        c.add_rock(Rock::Gabbro, NEW_GABBRO_THICKNESS, 0.0);
        c
    }

    /// Continental crust with `granite` km of basement over thin oceanic rock.
    pub fn new_continental(granite: f64) -> Self {
        let mut c = Self::empty();
        c.add_rock(Rock::Granite, granite, 0.0);
        c.add_rock(Rock::Basalt, NEW_BASALT_THICKNESS, 0.0);
        c.add_rock(Rock::Gabbro, 3.0, 0.0);
        c
    }

    /// Rebuild from stored parts. Layers are re-sorted and merged; invalid thicknesses are
    /// dropped with a warning. Valid input is restored exactly (no cap is applied).
    pub fn from_parts(layers: &[RockLayer], max_crust_thickness: f64, uplift_capacity: f64) -> Self {
        let mut c = Self {
            layers: Vec::with_capacity(layers.len()),
            max_crust_thickness: if max_crust_thickness.is_finite() && max_crust_thickness > 0.0 {
                max_crust_thickness
            } else {
                MAX_CRUST_THICKNESS
            },
            uplift_capacity: if uplift_capacity.is_finite() { uplift_capacity.max(0.0) } else { 0.0 },
        };
        for l in layers {
            if rejects("from_parts", "thickness", l.thickness) || l.thickness <= MIN_LAYER_THICKNESS {
                continue;
            }
            let grade = clamp_grade(l.metamorphic);
            match c.layers.binary_search_by(|x| x.rock.cmp(&l.rock)) {
                Ok(i) => {
                    c.layers[i].thickness += l.thickness;
                    c.layers[i].metamorphic = c.layers[i].metamorphic.max(grade);
                }
                Err(i) => c.layers.insert(i, RockLayer { rock: l.rock, thickness: l.thickness, metamorphic: grade }),
            }
        }
        c
    }

    /// Layers, surface first.
    #[inline]
    pub fn layers(&self) -> &[RockLayer] {
        &self.layers
    }

    /// Total thickness (km).
    pub fn thickness(&self) -> f64 {
        self.layers.iter().map(|l| l.thickness).sum()
    }

    /// Thickness of one rock type (0 if absent).
    pub fn thickness_of(&self, rock: Rock) -> f64 {
        self.layer(rock).map(|l| l.thickness).unwrap_or(0.0)
    }

    /// Metamorphic grade of one rock type (0 if absent).
    pub fn metamorphic_of(&self, rock: Rock) -> f64 {
        self.layer(rock).map(|l| l.metamorphic).unwrap_or(0.0)
    }

    /// Column cap (km).
    #[inline]
    pub fn max_crust_thickness(&self) -> f64 {
        self.max_crust_thickness
    }

    /// Remaining uplift budget (km). Never increases.
    #[inline]
    pub fn uplift_capacity(&self) -> f64 {
        self.uplift_capacity
    }

    /// Elevation (km), a pure function of thickness.
    pub fn elevation(&self) -> f64 {
        (self.thickness() * ELEVATION_SCALE - ELEVATION_OFFSET).clamp(MIN_ELEVATION, MAX_ELEVATION)
    }

    /// True when the granite basement is thick enough to resist subduction.
    pub fn is_continental(&self) -> bool {
        self.thickness_of(Rock::Granite) >= CONTINENTAL_GRANITE_THICKNESS
    }

    /// Surface rock (None for an empty column).
    pub fn top_rock(&self) -> Option<Rock> {
        self.layers.first().map(|l| l.rock)
    }

    fn layer(&self, rock: Rock) -> Option<&RockLayer> {
        self.layers.iter().find(|l| l.rock == rock)
    }

    fn layer_mut(&mut self, rock: Rock) -> Option<&mut RockLayer> {
        self.layers.iter_mut().find(|l| l.rock == rock)
    }

    fn prune(&mut self) {
        self.layers.retain(|l| l.thickness > MIN_LAYER_THICKNESS);
    }

    /// Add `thickness` km of `rock` with metamorphic grade `metamorphic`, respecting the
    /// column cap. Returns the thickness actually added.
    pub fn add_rock(&mut self, rock: Rock, thickness: f64, metamorphic: f64) -> f64 {
        if rejects("add_rock", "thickness", thickness) {
            return 0.0;
        }
        let room = (self.max_crust_thickness - self.thickness()).max(0.0);
        let added = thickness.min(room);
        if added <= 0.0 {
            return 0.0;
        }
        let grade = clamp_grade(metamorphic);
        match self.layers.binary_search_by(|l| l.rock.cmp(&rock)) {
            Ok(i) => {
                let l = &mut self.layers[i];
                let total = l.thickness + added;
                // thickness-weighted blend, but never below the existing grade
                let blended = (l.metamorphic * l.thickness + grade * added) / total;
                l.metamorphic = l.metamorphic.max(blended);
                l.thickness = total;
            }
            Err(i) => self.layers.insert(i, RockLayer { rock, thickness: added, metamorphic: grade }),
        }
        added
    }

    /// Remove up to `amount` km of `rock`. Returns the thickness actually removed.
    pub fn remove_rock(&mut self, rock: Rock, amount: f64) -> f64 {
        if rejects("remove_rock", "amount", amount) {
            return 0.0;
        }
        let Some(l) = self.layer_mut(rock) else { return 0.0 };
        let removed = amount.min(l.thickness);
        l.thickness -= removed;
        self.prune();
        removed
    }

    /// Raise the metamorphic grade of every layer to at least `value`. Grades never decrease.
    pub fn set_metamorphic(&mut self, value: f64) {
        if value.is_nan() {
            log::warn!("[crust] set_metamorphic: rejected NaN");
            return;
        }
        let v = clamp_grade(value);
        for l in &mut self.layers {
            l.metamorphic = l.metamorphic.max(v);
        }
    }

    /// Raise the grade of one rock type to at least `value`.
    pub fn set_metamorphic_of(&mut self, rock: Rock, value: f64) {
        if value.is_nan() {
            return;
        }
        let v = clamp_grade(value);
        if let Some(l) = self.layer_mut(rock) {
            l.metamorphic = l.metamorphic.max(v);
        }
    }

    /// Subduction under `neighbors` (crusts of the overriding plate around the trench).
    ///
    /// Every transferable layer loses `dt × relative_speed × SUBDUCTION_INTENSITY` of its
    /// thickness, split evenly among the neighbors. Basalt and gabbro stay with the slab.
    /// Transferred sediment is tagged low-grade metamorphic. Whatever a neighbor cannot take
    /// (column cap) stays here, so the removed thickness always equals the delivered thickness.
    /// Returns the total thickness moved.
    pub fn subduct(&mut self, dt: f64, neighbors: &mut [&mut Crust], relative_speed: f64) -> f64 {
        if rejects("subduct", "dt", dt) || rejects("subduct", "relative_speed", relative_speed) {
            return 0.0;
        }
        if neighbors.is_empty() {
            return 0.0;
        }
        let frac = (dt * relative_speed * SUBDUCTION_INTENSITY).min(1.0);
        let share_count = neighbors.len() as f64;
        let mut moved_total = 0.0;
        for l in self.layers.iter_mut().filter(|l| l.rock.is_transferable()) {
            let share = l.thickness * frac / share_count;
            if share <= 0.0 {
                continue;
            }
            let grade = if l.rock.is_sediment() { l.metamorphic.max(LOW_GRADE) } else { l.metamorphic };
            let mut delivered = 0.0;
            for nb in neighbors.iter_mut() {
                delivered += nb.add_rock(l.rock, share, grade);
            }
            l.thickness = (l.thickness - delivered).max(0.0);
            moved_total += delivered;
        }
        self.prune();
        moved_total
    }

    /// Copy a velocity-scaled fraction of `source`'s transferable layers onto this crust
    /// (continental collision). The source is not depleted. Returns the thickness added.
    pub fn transfer_rocks(&mut self, dt: f64, source: &Crust, relative_speed: f64) -> f64 {
        if rejects("transfer_rocks", "dt", dt)
            || rejects("transfer_rocks", "relative_speed", relative_speed)
        {
            return 0.0;
        }
        let frac = (dt * relative_speed * FOLDING_INTENSITY).min(1.0);
        let mut added = 0.0;
        for l in source.layers.iter().filter(|l| l.rock.is_transferable()) {
            added += self.add_rock(l.rock, l.thickness * frac, l.metamorphic.max(MEDIUM_GRADE));
        }
        added
    }

    /// Mountain building at a continental suture: transfer rocks from the bottom plate and
    /// fold the receiving column to at least medium grade.
    pub fn fold(&mut self, dt: f64, source: &Crust, relative_speed: f64) -> f64 {
        let added = self.transfer_rocks(dt, source, relative_speed);
        if added > 0.0 {
            self.set_metamorphic(MEDIUM_GRADE);
        }
        added
    }

    /// Thicken the granite layer in proportion to subduction strength while the uplift budget
    /// lasts. Returns the thickness added.
    pub fn uplift(&mut self, dt: f64, strength: f64) -> f64 {
        if rejects("uplift", "dt", dt) || rejects("uplift", "strength", strength) {
            return 0.0;
        }
        if self.uplift_capacity <= 0.0 {
            return 0.0;
        }
        let wanted = (dt * strength * UPLIFT_RATE).min(self.uplift_capacity);
        let added = self.add_rock(Rock::Granite, wanted, 0.0);
        self.uplift_capacity = (self.uplift_capacity - added).max(0.0);
        added
    }

    /// Move a small fraction of every layer to neighbors that sit more than
    /// [`EROSION_SLOPE`] km lower, deposited there as sediment. Returns the thickness moved.
    pub fn erode(&mut self, dt: f64, neighbors: &mut [&mut Crust]) -> f64 {
        if rejects("erode", "dt", dt) {
            return 0.0;
        }
        let elevation = self.elevation();
        let mut steep: Vec<usize> = Vec::with_capacity(neighbors.len());
        for (i, nb) in neighbors.iter().enumerate() {
            if elevation - nb.elevation() > EROSION_SLOPE {
                steep.push(i);
            }
        }
        if steep.is_empty() {
            return 0.0;
        }
        let frac = (dt * EROSION_RATE).min(1.0);
        let wanted: f64 = self.layers.iter().map(|l| l.thickness * frac).sum();
        if wanted <= 0.0 {
            return 0.0;
        }
        let share = wanted / steep.len() as f64;
        let mut delivered = 0.0;
        for i in steep {
            let nb = &mut *neighbors[i];
            let rock =
                if nb.elevation() >= 0.0 { Rock::ContinentalSediment } else { Rock::OceanicSediment };
            delivered += nb.add_rock(rock, share, 0.0);
        }
        // remove proportionally from every layer
        let scale = delivered / wanted;
        for l in &mut self.layers {
            l.thickness -= l.thickness * frac * scale;
        }
        self.prune();
        delivered
    }

    fn spread_sediment(&mut self, rock: Rock, cap: f64, dt: f64, neighbors: &mut [&mut Crust]) -> f64 {
        if rejects("spread_sediment", "dt", dt) {
            return 0.0;
        }
        let excess = self.thickness_of(rock) - cap;
        if excess <= 0.0 {
            return 0.0;
        }
        let targets: Vec<usize> = neighbors
            .iter()
            .enumerate()
            .filter(|(_, nb)| nb.thickness_of(rock) < cap)
            .map(|(i, _)| i)
            .collect();
        if targets.is_empty() {
            return 0.0;
        }
        let leaving = excess * (dt * SEDIMENT_SPREAD_RATE).min(1.0);
        let removed = self.remove_rock(rock, leaving);
        let share = removed * SEDIMENT_DAMPING / targets.len() as f64;
        let grade = self.metamorphic_of(rock);
        for i in targets {
            neighbors[i].add_rock(rock, share, grade);
        }
        removed
    }

    /// Spread oceanic sediment above [`MAX_OCEANIC_SEDIMENT`] to neighbors below the cap.
    /// Returns the thickness that left this column.
    pub fn spread_oceanic_sediment(&mut self, dt: f64, neighbors: &mut [&mut Crust]) -> f64 {
        self.spread_sediment(Rock::OceanicSediment, MAX_OCEANIC_SEDIMENT, dt, neighbors)
    }

    /// Spread continental sediment above [`MAX_CONTINENTAL_SEDIMENT`] to neighbors below the cap.
    pub fn spread_excess_sediment(&mut self, dt: f64, neighbors: &mut [&mut Crust]) -> f64 {
        self.spread_sediment(Rock::ContinentalSediment, MAX_CONTINENTAL_SEDIMENT, dt, neighbors)
    }

    /// Diffuse high metamorphic grades into the same rock of neighboring columns, attenuated
    /// by [`METAMORPHISM_DAMPING`] per hop.
    pub fn spread_metamorphism(&self, neighbors: &mut [&mut Crust]) {
        for l in self.layers.iter().filter(|l| l.metamorphic >= METAMORPHISM_SPREAD_MIN) {
            for nb in neighbors.iter_mut() {
                nb.set_metamorphic_of(l.rock, l.metamorphic * METAMORPHISM_DAMPING);
            }
        }
    }

    /// Replace oceanic basement with a continental one (continent drawing).
    pub fn make_continental(&mut self) {
        if self.is_continental() {
            return;
        }
        let missing = DEFAULT_GRANITE_THICKNESS - self.thickness_of(Rock::Granite);
        let room = self.max_crust_thickness - self.thickness();
        if room < missing {
            // make room by dropping sediment first
            self.remove_rock(Rock::OceanicSediment, missing - room);
        }
        self.add_rock(Rock::Granite, missing, 0.0);
    }

    /// Reset to fresh oceanic crust (continent erasing).
    pub fn make_oceanic(&mut self) {
        let keep_cap = self.max_crust_thickness;
        let keep_uplift = self.uplift_capacity;
        *self = Self::new_oceanic();
        self.max_crust_thickness = keep_cap;
        self.uplift_capacity = keep_uplift;
    }
}
