use std::collections::BTreeMap;
use std::sync::Arc;

use glam::{DQuat, DVec3};
use lithos_engine::config::{Integration, ModelProps};
use lithos_engine::forces::HOT_SPOT_DECAY_RATE;
use lithos_engine::grid::Grid;
use lithos_engine::integrator::MAX_ANGULAR_SPEED;
use lithos_engine::model::{FieldSeed, Model};
use lithos_engine::plate::HotSpot;
use lithos_engine::spatial_index::SpatialIndex;

fn index(f: u32) -> Arc<SpatialIndex> {
    Arc::new(SpatialIndex::new(Arc::new(Grid::new(f))))
}

/// Plate 0 south of the equator, plate 1 north of it.
fn hemispheres(index: &Arc<SpatialIndex>, continental: bool, props: ModelProps) -> Model {
    let seeds: Vec<Option<FieldSeed>> = index
        .grid()
        .pos_xyz
        .iter()
        .map(|p| Some(FieldSeed { plate: u32::from(p[2] >= 0.0), continental }))
        .collect();
    let mut model = Model::from_seeds(index.clone(), &seeds, props);
    model.set_densities(&BTreeMap::from([(0, 1.0), (1, 0.0)]));
    model
}

fn drive_south_plate(model: &mut Model) {
    if let Some(p) = model.plate_mut(0) {
        p.hot_spot = HotSpot { position: [1.0, 0.0, 0.0], force: [0.0, 0.0, 2.0] };
    }
}

#[test]
fn colliding_continents_lock_together_and_separate_again() {
    let idx = index(8);
    let mut model = hemispheres(&idx, true, ModelProps::default());
    // tilt the northern plate so its rim overlaps the southern one
    model.plate_mut(1).unwrap().orientation = DQuat::from_rotation_x(0.2);
    model.plate_mut(0).unwrap().angular_velocity = DVec3::new(0.0, 0.0, 1e-4);

    model.step();
    assert_eq!(model.groups().len(), 1);
    let gid = model.groups()[0].id;
    assert!(model.groups()[0].contains(0) && model.groups()[0].contains(1));
    let (south, north) = (model.plate(0).unwrap(), model.plate(1).unwrap());
    assert_eq!(south.group, Some(gid));
    assert_eq!(north.group, Some(gid));
    assert_eq!(south.angular_velocity, north.angular_velocity);

    // members share one acceleration
    let south = model.plate(0).unwrap();
    let north = model.plate(1).unwrap();
    let shared = model.groups()[0].angular_acceleration(model.plates());
    assert_eq!(south.angular_acceleration(model.groups(), model.plates()), shared);
    assert_eq!(north.angular_acceleration(model.groups(), model.plates()), shared);

    // oceanic crust sinks instead of folding, so the plates stop touching as continents
    for f in model.plate_mut(0).unwrap().fields_mut() {
        f.crust.make_oceanic();
    }
    model.step();
    assert!(model.groups().is_empty());
    assert!(model.plates().iter().all(|p| p.group.is_none()));
}

#[test]
fn fast_collisions_do_not_merge() {
    let idx = index(8);
    let mut model = hemispheres(&idx, true, ModelProps::default());
    model.plate_mut(1).unwrap().orientation = DQuat::from_rotation_x(0.2);
    model.plate_mut(0).unwrap().angular_velocity = DVec3::new(0.0, 0.0, 0.02);
    model.step();
    assert!(model.groups().is_empty());
}

#[test]
fn arc_volcanoes_erupt_over_the_slab() {
    let idx = index(8);
    let props = ModelProps { volcanic_eruptions: true, seed: 3, ..Default::default() };
    let mut model = hemispheres(&idx, false, props);
    drive_south_plate(&mut model);
    let mut eruptions = 0;
    for _ in 0..200 {
        model.step();
        for p in model.plates() {
            for f in p.fields().filter(|f| f.volcanic_eruption.is_some()) {
                assert_eq!(p.id, 1, "eruption on the sinking plate");
                assert!(f.subduction.is_none());
                assert!(f.volcanic_eruption.unwrap().lifespan > 0.0);
                eruptions += 1;
            }
        }
    }
    assert!(eruptions > 0);
    assert!(model.plates().iter().all(|p| p.fields().all(|f| f.earthquake.is_none())));
}

#[test]
fn every_integrator_drives_the_plate_the_same_way() {
    let idx = index(6);
    for method in [Integration::Euler, Integration::Verlet, Integration::Rk4] {
        let props = ModelProps { integration: method, ..Default::default() };
        let mut model = hemispheres(&idx, false, props);
        drive_south_plate(&mut model);
        for _ in 0..40 {
            model.step();
        }
        let south = model.plate(0).unwrap();
        let speed = south.angular_velocity.length();
        assert!(south.orientation.is_normalized(), "{method:?}");
        assert!(speed > 0.0 && speed <= MAX_ANGULAR_SPEED + 1e-12, "{method:?} speed {speed}");
        // torque of the hot spot points along -Y
        assert!(south.angular_velocity.y < 0.0, "{method:?} {:?}", south.angular_velocity);
        assert!(south.fields().any(|f| f.subduction.is_some()) || !south.subplate.is_empty());
    }
}

#[test]
fn hot_spot_force_fades_only_when_enabled() {
    let idx = index(6);
    for decay in [false, true] {
        let props = ModelProps { hot_spot_decay: decay, ..Default::default() };
        let mut model = hemispheres(&idx, false, props.clone());
        drive_south_plate(&mut model);
        for _ in 0..10 {
            model.step();
        }
        let force = DVec3::from_array(model.plate(0).unwrap().hot_spot.force);
        if decay {
            let expected = 2.0 * (1.0 - HOT_SPOT_DECAY_RATE * props.timestep).powi(10);
            approx::assert_relative_eq!(force.length(), expected, max_relative = 1e-12);
        } else {
            assert_eq!(force, DVec3::new(0.0, 0.0, 2.0));
        }
        assert_eq!(model.plate(0).unwrap().hot_spot.position, [1.0, 0.0, 0.0]);
    }
}
