//! Serialized model state and the flattened output snapshot.
//!
//! The persisted document is `{version, modelState, appState}`. Runtime types never derive
//! serde directly; they convert to and from the `*State` structs below so that derived data
//! (boundary flags, continent buffers) stays out of the document.

use std::collections::BTreeSet;
use std::sync::Arc;

use glam::{DMat3, DQuat, DVec3};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ModelProps;
use crate::crust::{Crust, RockLayer};
use crate::field::{Earthquake, Field, Subduction, VolcanicEruption};
use crate::grid::Grid;
use crate::model::Model;
use crate::plate::{HotSpot, Plate, PlateId, CONTINENT_BUFFER_WIDTH_KM};
use crate::plate_group::PlateGroup;
use crate::rng::SimRng;
use crate::rock::Rock;
use crate::spatial_index::SpatialIndex;

/// Version written by this engine.
pub const CURRENT_VERSION: u32 = 5;

/// Errors raised while turning a document back into a model.
#[derive(thiserror::Error, Debug)]
pub enum StateError {
    /// Malformed JSON or a shape mismatch
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// Document was saved on a different grid
    #[error("grid frequency {found} does not match the loaded grid ({expected})")]
    GridMismatch {
        /// Frequency of the loaded grid
        expected: u32,
        /// Frequency stored in the document
        found: u32,
    },
    /// Field id outside the grid
    #[error("field id {0} out of range")]
    FieldOutOfRange(u32),
    /// Rock code not in the catalogue
    #[error("unknown rock code {0}")]
    UnknownRock(u8),
    /// Crust arrays of different lengths
    #[error("crust arrays have different lengths")]
    CrustLength,
    /// Two plates share an id
    #[error("duplicate plate id {0}")]
    DuplicatePlate(PlateId),
    /// Version newer than this engine understands
    #[error("unsupported document version {0}")]
    UnsupportedVersion(u64),
}

/// Crust as parallel arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrustState {
    /// Rock codes, surface first
    pub rock: Vec<u8>,
    /// Layer thickness (km)
    pub thickness: Vec<f64>,
    /// Metamorphic grade per layer
    pub metamorphic: Vec<f64>,
    /// Column cap (km)
    pub max_crust_thickness: f64,
    /// Remaining uplift budget (km)
    pub uplift_capacity: f64,
}

impl From<&Crust> for CrustState {
    fn from(c: &Crust) -> Self {
        let layers = c.layers();
        Self {
            rock: layers.iter().map(|l| l.rock.code()).collect(),
            thickness: layers.iter().map(|l| l.thickness).collect(),
            metamorphic: layers.iter().map(|l| l.metamorphic).collect(),
            max_crust_thickness: c.max_crust_thickness(),
            uplift_capacity: c.uplift_capacity(),
        }
    }
}

impl TryFrom<&CrustState> for Crust {
    type Error = StateError;

    fn try_from(s: &CrustState) -> Result<Self, StateError> {
        if s.rock.len() != s.thickness.len() || s.rock.len() != s.metamorphic.len() {
            return Err(StateError::CrustLength);
        }
        let mut layers = Vec::with_capacity(s.rock.len());
        for ((&code, &thickness), &metamorphic) in
            s.rock.iter().zip(&s.thickness).zip(&s.metamorphic)
        {
            let rock = Rock::from_code(code).ok_or(StateError::UnknownRock(code))?;
            layers.push(RockLayer { rock, thickness, metamorphic });
        }
        Ok(Crust::from_parts(&layers, s.max_crust_thickness, s.uplift_capacity))
    }
}

/// One field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldState {
    /// Grid id in the plate's local frame
    pub id: u32,
    /// Rock column
    pub crust: CrustState,
    /// Normalized age
    pub age: f64,
    /// User marker
    #[serde(default)]
    pub marked: bool,
    /// Subduction progress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subduction: Option<Subduction>,
    /// Active earthquake
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earthquake: Option<Earthquake>,
    /// Active eruption
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volcanic_eruption: Option<VolcanicEruption>,
}

impl From<&Field> for FieldState {
    fn from(f: &Field) -> Self {
        Self {
            id: f.id as u32,
            crust: CrustState::from(&f.crust),
            age: f.age,
            marked: f.marked,
            subduction: f.subduction,
            earthquake: f.earthquake,
            volcanic_eruption: f.volcanic_eruption,
        }
    }
}

impl FieldState {
    fn to_field(&self, grid: &Grid, plate: PlateId) -> Result<Field, StateError> {
        let id = self.id as usize;
        if !grid.contains(id) {
            return Err(StateError::FieldOutOfRange(self.id));
        }
        let mut f = Field::new(id, plate, Crust::try_from(&self.crust)?);
        f.age = self.age;
        f.marked = self.marked;
        f.subduction = self.subduction;
        f.earthquake = self.earthquake;
        f.volcanic_eruption = self.volcanic_eruption;
        Ok(f)
    }
}

/// One plate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlateState {
    /// Identifier
    pub id: PlateId,
    /// Density rank
    pub density: f64,
    /// Display hue
    pub hue: f64,
    /// Orientation as `[x, y, z, w]`
    pub quaternion: [f64; 4],
    /// Angular velocity
    pub angular_velocity: [f64; 3],
    /// Mass
    pub mass: f64,
    /// Inertia tensor, column-major
    pub inertia_tensor: [f64; 9],
    /// Inverse inertia tensor, column-major
    pub inv_inertia_tensor: [f64; 9],
    /// Mass-weighted center direction
    pub center: [f64; 3],
    /// Hot spot
    pub hot_spot: HotSpot,
    /// Owned fields
    pub fields: Vec<FieldState>,
    /// Adjacent ring
    #[serde(default)]
    pub adjacent_fields: Vec<u32>,
    /// Detached subducting fields
    #[serde(default)]
    pub subplate: Vec<FieldState>,
    /// Plate group id
    #[serde(default)]
    pub plate_group: Option<u32>,
}

impl From<&Plate> for PlateState {
    fn from(p: &Plate) -> Self {
        Self {
            id: p.id,
            density: p.density,
            hue: p.hue,
            quaternion: p.orientation.to_array(),
            angular_velocity: p.angular_velocity.to_array(),
            mass: p.mass,
            inertia_tensor: p.inertia.to_cols_array(),
            inv_inertia_tensor: p.inv_inertia.to_cols_array(),
            center: p.center.to_array(),
            hot_spot: p.hot_spot,
            fields: p.fields().map(FieldState::from).collect(),
            adjacent_fields: p.adjacent_fields().iter().map(|&i| i as u32).collect(),
            subplate: p.subplate.fields().map(FieldState::from).collect(),
            plate_group: p.group,
        }
    }
}

impl PlateState {
    /// Rebuild the runtime plate on `grid`. Mass and inertia are restored as stored.
    pub fn to_plate(&self, grid: &Arc<Grid>) -> Result<Plate, StateError> {
        let mut p = Plate::new(self.id, grid.clone());
        p.density = self.density;
        p.hue = self.hue;
        let q = DQuat::from_array(self.quaternion);
        p.orientation = if (q.length() - 1.0).abs() > 1e-9 { q.normalize() } else { q };
        p.angular_velocity = DVec3::from_array(self.angular_velocity);
        p.hot_spot = self.hot_spot;
        p.group = self.plate_group;
        for fs in &self.fields {
            p.add_field(fs.to_field(grid, self.id)?);
        }
        for &a in &self.adjacent_fields {
            if !grid.contains(a as usize) {
                return Err(StateError::FieldOutOfRange(a));
            }
            p.add_adjacent_field(a as usize);
        }
        for fs in &self.subplate {
            p.subplate.add(fs.to_field(grid, self.id)?);
        }
        p.calculate_continent_buffers(CONTINENT_BUFFER_WIDTH_KM);
        p.mass = self.mass;
        p.inertia = DMat3::from_cols_array(&self.inertia_tensor);
        p.inv_inertia = DMat3::from_cols_array(&self.inv_inertia_tensor);
        p.center = DVec3::from_array(self.center);
        Ok(p)
    }
}

/// Everything needed to continue a simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelState {
    /// Grid frequency the ids refer to
    pub grid_frequency: u32,
    /// Model time
    pub time: f64,
    /// Completed steps
    pub step_idx: u64,
    /// Plates
    pub plates: Vec<PlateState>,
    /// Plate groups
    #[serde(default)]
    pub plate_groups: Vec<PlateGroup>,
    /// RNG state
    pub rng: SimRng,
    /// Live properties at save time
    #[serde(default)]
    pub props: ModelProps,
}

/// Versioned persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedDocument {
    /// Format version
    pub version: u32,
    /// Simulation state
    pub model_state: ModelState,
    /// Opaque presentation state
    #[serde(default)]
    pub app_state: Value,
}

impl Model {
    /// Capture the full state.
    pub fn to_state(&self) -> ModelState {
        ModelState {
            grid_frequency: self.grid().frequency,
            time: self.time(),
            step_idx: self.step_idx(),
            plates: self.plates().iter().map(PlateState::from).collect(),
            plate_groups: self.groups().to_vec(),
            rng: self.rng().clone(),
            props: self.props.clone(),
        }
    }

    /// Versioned document carrying `app_state` untouched.
    pub fn to_document(&self, app_state: Value) -> SerializedDocument {
        SerializedDocument { version: CURRENT_VERSION, model_state: self.to_state(), app_state }
    }

    /// Rebuild a model on `index` from `state`, using the stored properties.
    pub fn from_state(index: Arc<SpatialIndex>, state: &ModelState) -> Result<Model, StateError> {
        let grid = index.grid().clone();
        if grid.frequency != state.grid_frequency {
            return Err(StateError::GridMismatch {
                expected: grid.frequency,
                found: state.grid_frequency,
            });
        }
        let mut seen = BTreeSet::new();
        let mut plates = Vec::with_capacity(state.plates.len());
        for ps in &state.plates {
            if !seen.insert(ps.id) {
                return Err(StateError::DuplicatePlate(ps.id));
            }
            plates.push(ps.to_plate(&grid)?);
        }
        let groups: Vec<PlateGroup> = state
            .plate_groups
            .iter()
            .filter(|g| g.members.iter().filter(|m| seen.contains(m)).count() > 1)
            .cloned()
            .collect();
        for p in &mut plates {
            p.group = groups.iter().find(|g| g.contains(p.id)).map(|g| g.id);
        }
        Ok(Model::from_parts(
            index,
            plates,
            groups,
            state.props.clone(),
            state.rng.clone(),
            state.time,
            state.step_idx,
        ))
    }
}

/// Per-plate columns of the output snapshot. Vectors are parallel and indexed like `field_ids`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlateOutput {
    /// Plate id
    pub id: PlateId,
    /// Display hue
    pub hue: f64,
    /// Density rank
    pub density: f64,
    /// Orientation `[x, y, z, w]`
    pub quaternion: [f64; 4],
    /// Angular velocity
    pub angular_velocity: [f64; 3],
    /// Center direction
    pub center: [f64; 3],
    /// Hot spot
    pub hot_spot: HotSpot,
    /// Plate group id
    pub plate_group: Option<u32>,
    /// Field ids (local frame)
    pub field_ids: Vec<u32>,
    /// Elevation (km)
    pub elevation: Vec<f32>,
    /// Crust thickness (km)
    pub thickness: Vec<f32>,
    /// Normalized age
    pub age: Vec<f32>,
    /// Surface rock code (255 for an empty column)
    pub top_rock: Vec<u8>,
    /// Boundary flag
    pub boundary: Vec<u8>,
    /// Continental flag
    pub continental: Vec<u8>,
    /// Subduction distance (km, 0 when not subducting)
    pub subduction_distance: Vec<f32>,
    /// Earthquake magnitude (0 when none)
    pub earthquake_magnitude: Vec<f32>,
    /// Earthquake depth (km, 0 when none)
    pub earthquake_depth: Vec<f32>,
    /// Eruption flag
    pub volcanic_eruption: Vec<u8>,
    /// Marker flag
    pub marked: Vec<u8>,
    /// Subplate field ids
    pub subplate_field_ids: Vec<u32>,
    /// Subplate subduction distance (km)
    pub subplate_subduction_distance: Vec<f32>,
}

impl PlateOutput {
    fn from_plate(p: &Plate) -> Self {
        let fields: Vec<&Field> = p.fields().collect();
        let col_f32 = |g: &dyn Fn(&Field) -> f64| -> Vec<f32> {
            fields.iter().map(|f| g(f) as f32).collect()
        };
        let col_u8 = |g: &dyn Fn(&Field) -> bool| -> Vec<u8> {
            fields.iter().map(|f| g(f) as u8).collect()
        };
        Self {
            id: p.id,
            hue: p.hue,
            density: p.density,
            quaternion: p.orientation.to_array(),
            angular_velocity: p.angular_velocity.to_array(),
            center: p.center.to_array(),
            hot_spot: p.hot_spot,
            plate_group: p.group,
            field_ids: fields.iter().map(|f| f.id as u32).collect(),
            elevation: col_f32(&|f| f.elevation()),
            thickness: col_f32(&|f| f.crust.thickness()),
            age: col_f32(&|f| f.age),
            top_rock: fields
                .iter()
                .map(|f| f.crust.top_rock().map(Rock::code).unwrap_or(u8::MAX))
                .collect(),
            boundary: col_u8(&|f| f.boundary),
            continental: col_u8(&|f| f.is_continental()),
            subduction_distance: col_f32(&|f| f.subduction_distance()),
            earthquake_magnitude: col_f32(&|f| f.earthquake.map(|e| e.magnitude).unwrap_or(0.0)),
            earthquake_depth: col_f32(&|f| f.earthquake.map(|e| e.depth).unwrap_or(0.0)),
            volcanic_eruption: col_u8(&|f| f.volcanic_eruption.is_some()),
            marked: col_u8(&|f| f.marked),
            subplate_field_ids: p.subplate.fields().map(|f| f.id as u32).collect(),
            subplate_subduction_distance: p
                .subplate
                .fields()
                .map(|f| f.subduction_distance() as f32)
                .collect(),
        }
    }

    /// Raw byte views of the numeric columns, keyed by column name, for typed-array transport.
    pub fn byte_columns(&self) -> Vec<(&'static str, &[u8])> {
        vec![
            ("fieldIds", bytemuck::cast_slice(&self.field_ids)),
            ("elevation", bytemuck::cast_slice(&self.elevation)),
            ("thickness", bytemuck::cast_slice(&self.thickness)),
            ("age", bytemuck::cast_slice(&self.age)),
            ("topRock", &self.top_rock),
            ("boundary", &self.boundary),
            ("continental", &self.continental),
            ("subductionDistance", bytemuck::cast_slice(&self.subduction_distance)),
            ("earthquakeMagnitude", bytemuck::cast_slice(&self.earthquake_magnitude)),
            ("earthquakeDepth", bytemuck::cast_slice(&self.earthquake_depth)),
            ("volcanicEruption", &self.volcanic_eruption),
            ("marked", &self.marked),
            ("subplateFieldIds", bytemuck::cast_slice(&self.subplate_field_ids)),
            ("subplateSubductionDistance", bytemuck::cast_slice(&self.subplate_subduction_distance)),
        ]
    }
}

/// Full-model snapshot for the presentation side.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOutput {
    /// Model time
    pub time: f64,
    /// Completed steps
    pub step_idx: u64,
    /// Plates in id order
    pub plates: Vec<PlateOutput>,
}

impl Model {
    /// Flattened snapshot of every plate.
    pub fn output(&self) -> ModelOutput {
        ModelOutput {
            time: self.time(),
            step_idx: self.step_idx(),
            plates: self.plates().iter().map(PlateOutput::from_plate).collect(),
        }
    }
}
