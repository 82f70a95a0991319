use lithos_engine::grid::{cache::GridError, Grid};
use std::f64::consts::PI;

#[test]
fn grid_constructs() {
    let g = Grid::new(0);
    assert_eq!(g.frequency, 1);
    assert_eq!(g.cells, 12);
    assert_eq!(g.pos_xyz.len(), g.cells);
    assert_eq!(g.latlon.len(), g.cells);
    assert_eq!(g.area.len(), g.cells);
    assert_eq!(g.n1.len(), g.cells);
    assert_eq!(g.triangles.len(), 20);
}

#[test]
fn counts_follow_frequency() {
    for f in [1u32, 2, 3, 5, 8] {
        let g = Grid::new(f);
        assert_eq!(g.cells, 10 * (f as usize).pow(2) + 2, "F={f}");
        assert_eq!(g.triangles.len(), 2 * g.cells - 4, "F={f}");
        let pentagons = g.n1.iter().filter(|n| n.len() == 5).count();
        let hexagons = g.n1.iter().filter(|n| n.len() == 6).count();
        assert_eq!(pentagons, 12, "F={f}");
        assert_eq!(pentagons + hexagons, g.cells, "F={f}");
    }
}

#[test]
fn neighbors_are_symmetric_and_sorted() {
    let g = Grid::new(6);
    for (u, nbrs) in g.n1.iter().enumerate() {
        assert!(nbrs.windows(2).all(|w| w[0] < w[1]));
        for &v in nbrs {
            assert_ne!(v as usize, u);
            assert!(g.neighbors(v as usize).contains(&(u as u32)));
        }
    }
    assert!(g.neighbors(g.cells).is_empty());
}

#[test]
fn areas_partition_the_sphere() {
    let g = Grid::new(7);
    let total: f64 = g.area.iter().sum();
    approx::assert_relative_eq!(total, 4.0 * PI, max_relative = 1e-9);
    assert!(g.area.iter().all(|&a| a > 0.0));
    for p in &g.pos_xyz {
        let n = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
        approx::assert_relative_eq!(n, 1.0, epsilon = 1e-12);
    }
}

#[test]
fn field_diameter_shrinks_with_frequency() {
    let coarse = Grid::new(4);
    let fine = Grid::new(8);
    assert!(fine.field_diameter < coarse.field_diameter);
    assert!(fine.field_diameter_km() > 0.0);
}

#[test]
fn cache_round_trip() -> Result<(), GridError> {
    let g = Grid::new(3);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grid.cache");
    g.save_cache(&path)?;
    let g2 = Grid::load_cache(&path)?;
    assert_eq!(g, g2);
    Ok(())
}

#[test]
fn cache_rejects_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grid.cache");
    std::fs::write(&path, b"not a grid cache at all").unwrap();
    assert!(matches!(Grid::load_cache(&path), Err(GridError::BadHeader)));
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[test]
fn corners_join_icosahedron_edges() {
    let g = Grid::new(1);
    let edge_dot = 1.0 / 5.0_f64.sqrt();
    for (u, nbrs) in g.n1.iter().enumerate() {
        for &v in nbrs {
            approx::assert_relative_eq!(dot(g.pos_xyz[u], g.pos_xyz[v as usize]), edge_dot, epsilon = 1e-12);
        }
    }
}

#[test]
fn neighbor_arcs_track_field_diameter() {
    for f in [4u32, 8, 16] {
        let g = Grid::new(f);
        for (u, nbrs) in g.n1.iter().enumerate() {
            for &v in nbrs {
                let arc = lithos_engine::geo::arc_angle(g.pos_xyz[u], g.pos_xyz[v as usize]);
                assert!(arc < 1.3 * g.field_diameter, "F={f} {u}-{v} arc {arc}");
                assert!(arc > 0.7 * g.field_diameter, "F={f} {u}-{v} arc {arc}");
            }
        }
    }
}

#[test]
fn no_stranger_is_closer_than_a_neighbor() {
    let g = Grid::new(8);
    for (u, nbrs) in g.n1.iter().enumerate() {
        let farthest = nbrs
            .iter()
            .map(|&v| dot(g.pos_xyz[u], g.pos_xyz[v as usize]))
            .fold(f64::INFINITY, f64::min);
        for (w, p) in g.pos_xyz.iter().enumerate() {
            if w == u || nbrs.contains(&(w as u32)) {
                continue;
            }
            assert!(dot(g.pos_xyz[u], *p) < farthest, "field {w} is closer to {u} than its neighbors");
        }
    }
}
