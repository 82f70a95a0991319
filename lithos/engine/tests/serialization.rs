use std::sync::Arc;

use lithos_engine::config::ModelProps;
use lithos_engine::grid::Grid;
use lithos_engine::migration::{migrate_str, Migrated};
use lithos_engine::model::{FieldSeed, Model};
use lithos_engine::serialization::{StateError, CURRENT_VERSION};
use lithos_engine::spatial_index::SpatialIndex;
use serde_json::json;

fn index(f: u32) -> Arc<SpatialIndex> {
    Arc::new(SpatialIndex::new(Arc::new(Grid::new(f))))
}

fn busy_model(index: &Arc<SpatialIndex>) -> Model {
    let seeds: Vec<Option<FieldSeed>> = index
        .grid()
        .pos_xyz
        .iter()
        .map(|p| Some(FieldSeed { plate: if p[2] < 0.0 { 0 } else { 1 }, continental: p[0] > 0.6 }))
        .collect();
    let props = ModelProps { earthquakes: true, seed: 5, ..Default::default() };
    let mut model = Model::from_seeds(index.clone(), &seeds, props);
    assert!(model.set_hot_spot(glam::DVec3::new(-0.3, 0.0, -1.0), glam::DVec3::new(0.0, 0.0, 2.0)));
    for _ in 0..25 {
        model.step();
    }
    model
}

#[test]
fn document_round_trips_through_json() {
    let idx = index(8);
    let model = busy_model(&idx);
    let doc = model.to_document(json!({ "camera": { "zoom": 3 } }));
    assert_eq!(doc.version, CURRENT_VERSION);
    let text = serde_json::to_string(&doc).unwrap();

    let Migrated::Document(back) = migrate_str(&text).unwrap() else {
        panic!("current document reported as incompatible");
    };
    assert_eq!(*back, doc);
    let restored = Model::from_state(idx.clone(), &back.model_state).unwrap();
    assert_eq!(restored.to_state(), doc.model_state);
    assert_eq!(restored.time(), model.time());
    assert_eq!(restored.step_idx(), 25);
}

#[test]
fn document_uses_camel_case_keys() {
    let idx = index(4);
    let model = busy_model(&idx);
    let v = serde_json::to_value(model.to_document(json!({}))).unwrap();
    let state = &v["modelState"];
    assert!(state["gridFrequency"].is_u64());
    assert!(state["stepIdx"].is_u64());
    let plate = &state["plates"][0];
    assert!(plate["angularVelocity"].is_array());
    assert_eq!(plate["quaternion"].as_array().map(|a| a.len()), Some(4));
    assert_eq!(plate["inertiaTensor"].as_array().map(|a| a.len()), Some(9));
    let crust = &plate["fields"][0]["crust"];
    assert!(crust["maxCrustThickness"].is_number());
    assert!(crust["upliftCapacity"].is_number());
    assert!(crust["metamorphic"].is_array());
}

#[test]
fn grid_mismatch_is_rejected() {
    let model = busy_model(&index(4));
    let err = Model::from_state(index(5), &model.to_state()).unwrap_err();
    assert!(matches!(err, StateError::GridMismatch { expected: 5, found: 4 }));
}

#[test]
fn malformed_states_are_rejected() {
    let idx = index(4);
    let model = busy_model(&idx);

    let mut state = model.to_state();
    state.plates[0].fields[0].crust.rock[0] = 42;
    assert!(matches!(Model::from_state(idx.clone(), &state), Err(StateError::UnknownRock(42))));

    let mut state = model.to_state();
    state.plates[0].fields[0].crust.thickness.pop();
    assert!(matches!(Model::from_state(idx.clone(), &state), Err(StateError::CrustLength)));

    let mut state = model.to_state();
    state.plates[0].fields[0].id = 1_000_000;
    assert!(matches!(
        Model::from_state(idx.clone(), &state),
        Err(StateError::FieldOutOfRange(1_000_000))
    ));

    let mut state = model.to_state();
    let copy = state.plates[0].clone();
    state.plates.push(copy);
    assert!(matches!(Model::from_state(idx, &state), Err(StateError::DuplicatePlate(0))));
}

#[test]
fn output_columns_are_parallel() {
    let idx = index(6);
    let model = busy_model(&idx);
    let out = model.output();
    assert_eq!(out.step_idx, model.step_idx());
    assert_eq!(out.plates.len(), model.plates().len());
    for (po, p) in out.plates.iter().zip(model.plates()) {
        let n = p.field_count();
        assert_eq!(po.field_ids.len(), n);
        assert_eq!(po.elevation.len(), n);
        assert_eq!(po.top_rock.len(), n);
        assert_eq!(po.subduction_distance.len(), n);
        assert_eq!(po.subplate_field_ids.len(), p.subplate.len());
        for (name, bytes) in po.byte_columns() {
            let width = match name {
                "topRock" | "boundary" | "continental" | "volcanicEruption" | "marked" => 1,
                _ => 4,
            };
            let rows = if name.starts_with("subplate") { p.subplate.len() } else { n };
            assert_eq!(bytes.len(), rows * width, "column {name}");
        }
    }
    let v = serde_json::to_value(&out).unwrap();
    assert!(v["plates"][0]["fieldIds"].is_array());
}
