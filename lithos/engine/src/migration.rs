//! Upgrading older serialized documents.
//!
//! Each step is a pure function over the raw JSON value:
//! - 0 → 1: a bare model state is wrapped into `{version, time, stepIdx, modelState, appState}`
//! - 1 → 2: `time` and `stepIdx` move into `modelState`
//! - 2 → 3: every crust gains `maxCrustThickness` and `upliftCapacity`
//! - 3 → 4: every plate gains `subplate` and `adjacentFields`
//! - 4 → 5: crust `metamorphism` is renamed `metamorphic`; plates gain `plateGroup`, the model
//!   gains `plateGroups`
//!
//! Documents older than [`COMPATIBILITY_CUTOFF`] are not loaded at all: their plate layout
//! cannot be reconstructed, so they yield [`Migrated::IncompatibleModel`].

use serde_json::{json, Map, Value};

use crate::crust::{BASE_UPLIFT_CAPACITY, MAX_CRUST_THICKNESS};
use crate::serialization::{SerializedDocument, StateError, CURRENT_VERSION};

/// Oldest version that can still be loaded.
pub const COMPATIBILITY_CUTOFF: u64 = 2;

/// Migration steps; entry `n` upgrades version `n` to `n + 1`.
pub const MIGRATIONS: [fn(Value) -> Value; CURRENT_VERSION as usize] =
    [migrate_0_to_1, migrate_1_to_2, migrate_2_to_3, migrate_3_to_4, migrate_4_to_5];

/// Outcome of [`migrate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Migrated {
    /// Upgraded document at [`CURRENT_VERSION`]
    Document(Box<SerializedDocument>),
    /// Document predates the compatibility cutoff
    IncompatibleModel,
}

/// Version of a raw document; a document without a version field is version 0.
pub fn document_version(doc: &Value) -> u64 {
    doc.get("version").and_then(Value::as_u64).unwrap_or(0)
}

fn set_version(doc: &mut Value, v: u32) {
    if let Some(obj) = doc.as_object_mut() {
        obj.insert("version".into(), json!(v));
    }
}

fn plates_mut(doc: &mut Value) -> Vec<&mut Map<String, Value>> {
    doc.pointer_mut("/modelState/plates")
        .and_then(Value::as_array_mut)
        .map(|a| a.iter_mut().filter_map(Value::as_object_mut).collect())
        .unwrap_or_default()
}

fn crusts_of(plate: &mut Map<String, Value>) -> Vec<&mut Map<String, Value>> {
    let mut out = Vec::new();
    for (key, list) in plate.iter_mut() {
        if key != "fields" && key != "subplate" {
            continue;
        }
        let Some(fields) = list.as_array_mut() else { continue };
        for f in fields {
            if let Some(c) = f.get_mut("crust").and_then(Value::as_object_mut) {
                out.push(c);
            }
        }
    }
    out
}

/// Wrap a bare model state.
pub fn migrate_0_to_1(doc: Value) -> Value {
    let mut state = doc;
    let (time, step_idx) = match state.as_object_mut() {
        Some(obj) => (
            obj.remove("time").unwrap_or(json!(0.0)),
            obj.remove("stepIdx").unwrap_or(json!(0)),
        ),
        None => (json!(0.0), json!(0)),
    };
    json!({
        "version": 1,
        "time": time,
        "stepIdx": step_idx,
        "modelState": state,
        "appState": {},
    })
}

/// Move the clock into the model state.
pub fn migrate_1_to_2(mut doc: Value) -> Value {
    if let Some(obj) = doc.as_object_mut() {
        let time = obj.remove("time").unwrap_or(json!(0.0));
        let step_idx = obj.remove("stepIdx").unwrap_or(json!(0));
        if let Some(state) = obj.get_mut("modelState").and_then(Value::as_object_mut) {
            state.entry("time").or_insert(time);
            state.entry("stepIdx").or_insert(step_idx);
        }
    }
    set_version(&mut doc, 2);
    doc
}

/// Add crust caps.
pub fn migrate_2_to_3(mut doc: Value) -> Value {
    for plate in plates_mut(&mut doc) {
        for crust in crusts_of(plate) {
            crust.entry("maxCrustThickness").or_insert(json!(MAX_CRUST_THICKNESS));
            crust.entry("upliftCapacity").or_insert(json!(BASE_UPLIFT_CAPACITY));
        }
    }
    set_version(&mut doc, 3);
    doc
}

/// Add subplates and adjacent rings.
pub fn migrate_3_to_4(mut doc: Value) -> Value {
    for plate in plates_mut(&mut doc) {
        plate.entry("subplate").or_insert(json!([]));
        plate.entry("adjacentFields").or_insert(json!([]));
    }
    set_version(&mut doc, 4);
    doc
}

/// Rename the metamorphic column and add plate groups.
pub fn migrate_4_to_5(mut doc: Value) -> Value {
    for plate in plates_mut(&mut doc) {
        for crust in crusts_of(plate) {
            if let Some(m) = crust.remove("metamorphism") {
                crust.entry("metamorphic").or_insert(m);
            }
        }
        plate.entry("plateGroup").or_insert(Value::Null);
    }
    if let Some(state) = doc.get_mut("modelState").and_then(Value::as_object_mut) {
        state.entry("plateGroups").or_insert(json!([]));
    }
    set_version(&mut doc, 5);
    doc
}

/// Bring `doc` to [`CURRENT_VERSION`] and parse it.
pub fn migrate(doc: Value) -> Result<Migrated, StateError> {
    let version = document_version(&doc);
    if version < COMPATIBILITY_CUTOFF {
        log::info!("[migration] version {version} predates cutoff {COMPATIBILITY_CUTOFF}");
        return Ok(Migrated::IncompatibleModel);
    }
    if version > CURRENT_VERSION as u64 {
        return Err(StateError::UnsupportedVersion(version));
    }
    let mut doc = doc;
    for step in &MIGRATIONS[version as usize..] {
        doc = step(doc);
    }
    let parsed: SerializedDocument = serde_json::from_value(doc)?;
    Ok(Migrated::Document(Box::new(parsed)))
}

/// [`migrate`] on JSON text.
pub fn migrate_str(text: &str) -> Result<Migrated, StateError> {
    migrate(serde_json::from_str(text)?)
}
