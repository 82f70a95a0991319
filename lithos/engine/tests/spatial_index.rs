use std::sync::Arc;

use lithos_engine::grid::Grid;
use lithos_engine::spatial_index::SpatialIndex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[test]
fn agrees_with_brute_force() {
    let g = Arc::new(Grid::new(16));
    let index = SpatialIndex::new(g.clone());
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for _ in 0..10_000 {
        let v = [
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        ];
        if dot(v, v) < 1e-6 {
            continue;
        }
        let fast = index.nearest(v).unwrap();
        let brute = g.nearest_brute_force(v);
        if fast != brute {
            // only exact ties may disagree
            let n = dot(v, v).sqrt();
            let u = [v[0] / n, v[1] / n, v[2] / n];
            approx::assert_relative_eq!(
                dot(g.pos_xyz[fast], u),
                dot(g.pos_xyz[brute], u),
                epsilon = 1e-12
            );
        }
    }
}

#[test]
fn every_field_center_maps_to_itself() {
    let g = Arc::new(Grid::new(10));
    let index = SpatialIndex::new(g.clone());
    for (i, p) in g.pos_xyz.iter().enumerate() {
        assert_eq!(index.nearest(*p), Some(i));
        assert_eq!(index.nearest_exact(*p), Some(i));
    }
}

#[test]
fn length_does_not_matter() {
    let g = Arc::new(Grid::new(5));
    let index = SpatialIndex::new(g);
    let v = [0.3, -0.8, 0.52];
    let scaled = [v[0] * 40.0, v[1] * 40.0, v[2] * 40.0];
    assert_eq!(index.nearest(v), index.nearest(scaled));
}

#[test]
fn poles_resolve() {
    let g = Arc::new(Grid::new(4));
    let index = SpatialIndex::new(g.clone());
    for v in [[0.0, 1.0, 0.0], [0.0, -1.0, 0.0], [-1.0, 0.0, 0.0]] {
        assert_eq!(index.nearest(v), Some(g.nearest_brute_force(v)));
    }
}
