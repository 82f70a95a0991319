use std::sync::Arc;

use lithos_engine::config::ModelProps;
use lithos_engine::crust::{BASE_UPLIFT_CAPACITY, MAX_CRUST_THICKNESS};
use lithos_engine::grid::Grid;
use lithos_engine::migration::{
    document_version, migrate, migrate_0_to_1, migrate_1_to_2, migrate_str, Migrated, COMPATIBILITY_CUTOFF,
};
use lithos_engine::model::{FieldSeed, Model};
use lithos_engine::serialization::{StateError, CURRENT_VERSION};
use lithos_engine::spatial_index::SpatialIndex;
use serde_json::{json, Value};

fn model(index: &Arc<SpatialIndex>) -> Model {
    let seeds: Vec<Option<FieldSeed>> = index
        .grid()
        .pos_xyz
        .iter()
        .map(|p| Some(FieldSeed { plate: (p[1] > 0.0) as u32, continental: p[0] > 0.5 }))
        .collect();
    let mut m = Model::from_seeds(index.clone(), &seeds, ModelProps::default());
    for _ in 0..3 {
        m.step();
    }
    m
}

/// Rewrite a current document into the version 2 layout.
fn downgrade_to_v2(doc: &mut Value) {
    doc["version"] = json!(2);
    let state = doc["modelState"].as_object_mut().unwrap();
    state.remove("plateGroups");
    for plate in state["plates"].as_array_mut().unwrap() {
        let plate = plate.as_object_mut().unwrap();
        plate.remove("subplate");
        plate.remove("adjacentFields");
        plate.remove("plateGroup");
        for field in plate["fields"].as_array_mut().unwrap() {
            let crust = field["crust"].as_object_mut().unwrap();
            crust.remove("maxCrustThickness");
            crust.remove("upliftCapacity");
            let m = crust.remove("metamorphic").unwrap();
            crust.insert("metamorphism".into(), m);
        }
    }
}

#[test]
fn documents_below_cutoff_are_incompatible() {
    for doc in [
        json!({ "plates": [] }),
        json!({ "version": 0, "modelState": {} }),
        json!({ "version": COMPATIBILITY_CUTOFF - 1, "modelState": { "plates": [] } }),
    ] {
        assert_eq!(migrate(doc).unwrap(), Migrated::IncompatibleModel);
    }
    assert_eq!(migrate_str(r#"{"version":1}"#).unwrap(), Migrated::IncompatibleModel);
}

#[test]
fn version_two_upgrades_to_current() {
    let idx = Arc::new(SpatialIndex::new(Arc::new(Grid::new(6))));
    let m = model(&idx);
    let mut raw = serde_json::to_value(m.to_document(json!({ "ui": true }))).unwrap();
    downgrade_to_v2(&mut raw);
    assert_eq!(document_version(&raw), 2);

    let Migrated::Document(doc) = migrate(raw).unwrap() else {
        panic!("version 2 must still load");
    };
    assert_eq!(doc.version, CURRENT_VERSION);
    assert_eq!(doc.app_state, json!({ "ui": true }));
    assert!(doc.model_state.plate_groups.is_empty());
    for plate in &doc.model_state.plates {
        assert!(plate.subplate.is_empty());
        assert_eq!(plate.plate_group, None);
        for f in &plate.fields {
            assert_eq!(f.crust.max_crust_thickness, MAX_CRUST_THICKNESS);
            assert_eq!(f.crust.uplift_capacity, BASE_UPLIFT_CAPACITY);
            assert_eq!(f.crust.metamorphic.len(), f.crust.rock.len());
        }
    }

    let restored = Model::from_state(idx.clone(), &doc.model_state).unwrap();
    assert_eq!(restored.plates().len(), m.plates().len());
    for (a, b) in restored.plates().iter().zip(m.plates()) {
        assert_eq!(a.field_ids(), b.field_ids());
        // the ring is rebuilt from ownership
        assert_eq!(a.adjacent_fields(), b.adjacent_fields());
    }
}

#[test]
fn early_steps_reshape_the_envelope() {
    let bare = json!({ "time": 4.0, "stepIdx": 20, "plates": [] });
    let v1 = migrate_0_to_1(bare);
    assert_eq!(v1["version"], json!(1));
    assert_eq!(v1["time"], json!(4.0));
    assert!(v1["modelState"].get("time").is_none());
    let v2 = migrate_1_to_2(v1);
    assert_eq!(v2["version"], json!(2));
    assert_eq!(v2["modelState"]["time"], json!(4.0));
    assert_eq!(v2["modelState"]["stepIdx"], json!(20));
    assert!(v2.get("time").is_none());
}

#[test]
fn future_and_garbage_documents_are_errors() {
    let err = migrate(json!({ "version": CURRENT_VERSION + 1 })).unwrap_err();
    assert!(matches!(err, StateError::UnsupportedVersion(_)));
    assert!(matches!(migrate_str("{ not json"), Err(StateError::Json(_))));
    assert!(matches!(migrate(json!({ "version": 5, "modelState": 3 })), Err(StateError::Json(_))));
}
