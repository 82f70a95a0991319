use approx::assert_relative_eq;
use lithos_engine::crust::{
    Crust, RockLayer, BASE_UPLIFT_CAPACITY, ELEVATION_OFFSET, LOW_GRADE, MAX_CONTINENTAL_SEDIMENT, MAX_CRUST_THICKNESS,
    MAX_ELEVATION, MAX_OCEANIC_SEDIMENT, MEDIUM_GRADE, MIN_ELEVATION, SEDIMENT_DAMPING,
};
use lithos_engine::rock::Rock;

fn total(crusts: &[&Crust]) -> f64 {
    crusts.iter().map(|c| c.thickness()).sum()
}

fn sedimented_ocean(sediment: f64) -> Crust {
    let mut c = Crust::new_oceanic();
    c.add_rock(Rock::OceanicSediment, sediment, 0.0);
    c
}

#[test]
fn fresh_crusts() {
    let o = Crust::new_oceanic();
    assert_eq!(o.top_rock(), Some(Rock::Basalt));
    assert!(!o.is_continental());
    assert!(o.elevation() < 0.0);
    let c = Crust::new_continental(30.0);
    assert_eq!(c.top_rock(), Some(Rock::Granite));
    assert!(c.is_continental());
    assert!(c.elevation() > 0.0);
    assert_eq!(c.uplift_capacity(), BASE_UPLIFT_CAPACITY);
}

#[test]
fn elevation_is_clamped() {
    let empty = Crust::empty();
    assert_relative_eq!(empty.elevation(), -ELEVATION_OFFSET);
    assert!(empty.elevation() > MIN_ELEVATION);
    let thick = Crust::from_parts(
        &[RockLayer { rock: Rock::Granite, thickness: 500.0, metamorphic: 0.0 }],
        1000.0,
        0.0,
    );
    assert_eq!(thick.elevation(), MAX_ELEVATION);
}

#[test]
fn subduction_conserves_thickness() {
    let mut slab = sedimented_ocean(1.0);
    slab.add_rock(Rock::Andesite, 0.5, 0.0);
    let mut a = Crust::new_oceanic();
    let mut b = Crust::new_continental(30.0);
    let mut c = Crust::new_oceanic();
    let before = total(&[&slab, &a, &b, &c]);
    let basalt = slab.thickness_of(Rock::Basalt);
    let gabbro = slab.thickness_of(Rock::Gabbro);

    let moved = slab.subduct(1.0, &mut [&mut a, &mut b, &mut c], 50.0);
    assert!(moved > 0.0);
    assert_relative_eq!(total(&[&slab, &a, &b, &c]), before, epsilon = 1e-9);
    // the slab's oceanic basement stays with it
    assert_eq!(slab.thickness_of(Rock::Basalt), basalt);
    assert_eq!(slab.thickness_of(Rock::Gabbro), gabbro);
    // scraped sediment arrives at least low grade
    for nb in [&a, &b, &c] {
        assert!(nb.thickness_of(Rock::OceanicSediment) > 0.0);
        assert!(nb.metamorphic_of(Rock::OceanicSediment) >= LOW_GRADE);
    }
}

#[test]
fn subduction_respects_the_cap() {
    let mut slab = sedimented_ocean(1.0);
    let mut full = Crust::from_parts(
        &[RockLayer { rock: Rock::Granite, thickness: MAX_CRUST_THICKNESS, metamorphic: 0.0 }],
        MAX_CRUST_THICKNESS,
        0.0,
    );
    let before = total(&[&slab, &full]);
    let moved = slab.subduct(1.0, &mut [&mut full], 100.0);
    assert_eq!(moved, 0.0);
    assert_relative_eq!(total(&[&slab, &full]), before, epsilon = 1e-12);
    assert_relative_eq!(slab.thickness_of(Rock::OceanicSediment), 1.0, epsilon = 1e-12);
}

#[test]
fn subduction_without_neighbors_is_a_no_op() {
    let mut slab = sedimented_ocean(1.0);
    let before = slab.clone();
    assert_eq!(slab.subduct(1.0, &mut [], 10.0), 0.0);
    assert_eq!(slab, before);
}

#[test]
fn folding_does_not_deplete_the_source() {
    let source = Crust::new_continental(30.0);
    let mut target = Crust::new_continental(30.0);
    let before = source.clone();
    let added = target.fold(1.0, &source, 20.0);
    assert!(added > 0.0);
    assert_eq!(source, before);
    for l in target.layers() {
        assert!(l.metamorphic >= MEDIUM_GRADE);
    }
}

#[test]
fn uplift_drains_capacity() {
    let mut c = Crust::new_continental(30.0);
    let mut last = c.uplift_capacity();
    let mut gained = 0.0;
    for _ in 0..10_000 {
        gained += c.uplift(1.0, 100.0);
        assert!(c.uplift_capacity() <= last);
        last = c.uplift_capacity();
    }
    assert_eq!(c.uplift_capacity(), 0.0);
    assert_relative_eq!(gained, BASE_UPLIFT_CAPACITY, epsilon = 1e-9);
    assert_eq!(c.uplift(1.0, 100.0), 0.0);
}

#[test]
fn metamorphism_never_decreases() {
    let mut c = Crust::new_continental(30.0);
    c.set_metamorphic(0.8);
    c.set_metamorphic(0.1);
    c.set_metamorphic(f64::NAN);
    for l in c.layers() {
        assert_eq!(l.metamorphic, 0.8);
    }
    // adding fresh rock of the same type keeps the grade
    c.add_rock(Rock::Granite, 5.0, 0.0);
    assert_eq!(c.metamorphic_of(Rock::Granite), 0.8);
}

#[test]
fn metamorphism_spreads_damped() {
    let mut hot = Crust::new_continental(30.0);
    hot.set_metamorphic(0.8);
    let mut cold = Crust::new_continental(30.0);
    hot.spread_metamorphism(&mut [&mut cold]);
    assert_relative_eq!(cold.metamorphic_of(Rock::Granite), 0.4);

    let mut mild = Crust::new_continental(30.0);
    mild.set_metamorphic(0.2);
    let mut other = Crust::new_continental(30.0);
    mild.spread_metamorphism(&mut [&mut other]);
    assert_eq!(other.metamorphic_of(Rock::Granite), 0.0);
}

#[test]
fn erosion_moves_rock_downhill_as_sediment() {
    let mut high = Crust::new_continental(30.0);
    let mut low = Crust::new_oceanic();
    let mut level = Crust::new_continental(30.0);
    let before = total(&[&high, &low, &level]);
    let moved = high.erode(1.0, &mut [&mut low, &mut level]);
    assert!(moved > 0.0);
    assert_relative_eq!(total(&[&high, &low, &level]), before, epsilon = 1e-9);
    assert_relative_eq!(low.thickness_of(Rock::OceanicSediment), moved, epsilon = 1e-12);
    assert_eq!(level.thickness_of(Rock::ContinentalSediment), 0.0);
}

#[test]
fn excess_sediment_spreads_to_neighbors_below_cap() {
    let mut heavy = sedimented_ocean(MAX_OCEANIC_SEDIMENT + 1.0);
    let mut bare = Crust::new_oceanic();
    let mut full = sedimented_ocean(MAX_OCEANIC_SEDIMENT);
    let removed = heavy.spread_oceanic_sediment(1.0, &mut [&mut bare, &mut full]);
    assert_relative_eq!(removed, 1.0, epsilon = 1e-12);
    assert_relative_eq!(heavy.thickness_of(Rock::OceanicSediment), MAX_OCEANIC_SEDIMENT, epsilon = 1e-12);
    assert_relative_eq!(bare.thickness_of(Rock::OceanicSediment), SEDIMENT_DAMPING, epsilon = 1e-12);
    assert_eq!(full.thickness_of(Rock::OceanicSediment), MAX_OCEANIC_SEDIMENT);

    let mut c = Crust::new_continental(30.0);
    c.add_rock(Rock::ContinentalSediment, MAX_CONTINENTAL_SEDIMENT * 0.5, 0.0);
    let mut n = Crust::new_continental(30.0);
    assert_eq!(c.spread_excess_sediment(1.0, &mut [&mut n]), 0.0);
}

#[test]
fn continent_drawing_round_trip() {
    let mut c = sedimented_ocean(0.2);
    c.make_continental();
    assert!(c.is_continental());
    c.make_oceanic();
    assert_eq!(c, Crust::new_oceanic());
}

#[test]
fn from_parts_merges_and_drops_invalid_layers() {
    let c = Crust::from_parts(
        &[
            RockLayer { rock: Rock::Gabbro, thickness: 2.0, metamorphic: 0.1 },
            RockLayer { rock: Rock::Shale, thickness: 1.0, metamorphic: 0.0 },
            RockLayer { rock: Rock::Gabbro, thickness: 3.0, metamorphic: 0.4 },
            RockLayer { rock: Rock::Basalt, thickness: -1.0, metamorphic: 0.0 },
        ],
        MAX_CRUST_THICKNESS,
        BASE_UPLIFT_CAPACITY,
    );
    let rocks: Vec<Rock> = c.layers().iter().map(|l| l.rock).collect();
    assert_eq!(rocks, vec![Rock::Shale, Rock::Gabbro]);
    assert_relative_eq!(c.thickness_of(Rock::Gabbro), 5.0);
    assert_eq!(c.metamorphic_of(Rock::Gabbro), 0.4);
}

#[test]
fn metamorphism_tracks_the_running_maximum() {
    use rand::{Rng, SeedableRng};
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(11);
    for _ in 0..200 {
        let mut c = Crust::new_continental(20.0);
        let mut peak: f64 = 0.0;
        let mut last = 0.0;
        for _ in 0..rng.gen_range(1..30) {
            let grade = rng.gen_range(-0.5..1.5);
            c.set_metamorphic(grade);
            peak = peak.max(grade.clamp(0.0, 1.0));
            let now = c.metamorphic_of(Rock::Granite);
            assert!(now >= last, "grade fell from {last} to {now}");
            assert!(now <= peak);
            assert_eq!(now, peak);
            last = now;
        }
    }
}
