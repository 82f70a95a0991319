//! Geodesic icosphere grid and adjacency.

pub mod cache;

use smallvec::SmallVec;
use std::collections::{BTreeSet, HashMap};
use std::f64::consts::PI;

use crate::geo::{arc_angle, cross, dot, normalize, to_latlon};
use crate::units::EARTH_RADIUS_KM;

/// Fixed discretization of the unit sphere into fields (icosphere vertices).
///
/// Built once per process and shared read-only (`Arc<Grid>`) by every plate and model.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    /// Icosphere subdivision frequency
    pub frequency: u32,
    /// Number of fields (= 10F² + 2)
    pub cells: usize,
    /// Field center positions (unit sphere)
    pub pos_xyz: Vec<[f64; 3]>,
    /// Field center latitude/longitude in radians (+Y is north)
    pub latlon: Vec<[f64; 2]>,
    /// Spherical area per field (steradians)
    pub area: Vec<f64>,
    /// 1-ring neighbor ids, ascending (pentagon:5, hexagon:6)
    pub n1: Vec<SmallVec<[u32; 6]>>,
    /// Triangle index buffer for external rendering
    pub triangles: Vec<[u32; 3]>,
    /// Mean angular distance between neighboring field centers (radians)
    pub field_diameter: f64,
}

#[derive(Hash, Eq, PartialEq)]
struct EdgeKey(usize, usize, u32);

impl Grid {
    /// Build a Class-I geodesic grid with frequency `frequency` (0 is treated as 1).
    pub fn new(frequency: u32) -> Self {
        let f = frequency.max(1);
        let (corners, faces) = icosahedron();

        let mut pos: Vec<[f64; 3]> = corners.clone();
        let mut edge_map: HashMap<EdgeKey, u32> = HashMap::new();
        let mut tris: Vec<[u32; 3]> = Vec::with_capacity(20 * (f * f) as usize);

        for face in &faces {
            let [a, b, c] = *face;
            // lattice point (i, j): weight i towards B, j towards C
            let mut lattice: HashMap<(u32, u32), u32> = HashMap::new();
            for i in 0..=f {
                for j in 0..=(f - i) {
                    let id = if i == 0 && j == 0 {
                        a as u32
                    } else if i == f {
                        b as u32
                    } else if j == f {
                        c as u32
                    } else if j == 0 {
                        edge_vertex(&mut pos, &mut edge_map, &corners, a, b, i, f)
                    } else if i == 0 {
                        edge_vertex(&mut pos, &mut edge_map, &corners, a, c, j, f)
                    } else if i + j == f {
                        edge_vertex(&mut pos, &mut edge_map, &corners, b, c, j, f)
                    } else {
                        let (wa, wb, wc) = (
                            (f - i - j) as f64 / f as f64,
                            i as f64 / f as f64,
                            j as f64 / f as f64,
                        );
                        let (pa, pb, pc) = (corners[a], corners[b], corners[c]);
                        let id = pos.len() as u32;
                        pos.push(normalize([
                            pa[0] * wa + pb[0] * wb + pc[0] * wc,
                            pa[1] * wa + pb[1] * wb + pc[1] * wc,
                            pa[2] * wa + pb[2] * wb + pc[2] * wc,
                        ]));
                        id
                    };
                    lattice.insert((i, j), id);
                }
            }
            for i in 0..f {
                for j in 0..(f - i) {
                    let p00 = lattice[&(i, j)];
                    let p10 = lattice[&(i + 1, j)];
                    let p01 = lattice[&(i, j + 1)];
                    tris.push([p00, p10, p01]);
                    if i + j + 1 < f {
                        let p11 = lattice[&(i + 1, j + 1)];
                        tris.push([p10, p11, p01]);
                    }
                }
            }
        }

        let cells = pos.len();
        let mut n1_sets: Vec<BTreeSet<u32>> = vec![BTreeSet::new(); cells];
        let mut area_acc = vec![0.0f64; cells];
        for t in &tris {
            for k in 0..3 {
                let u = t[k] as usize;
                n1_sets[u].insert(t[(k + 1) % 3]);
                n1_sets[u].insert(t[(k + 2) % 3]);
            }
            let share =
                spherical_triangle_area(pos[t[0] as usize], pos[t[1] as usize], pos[t[2] as usize])
                    / 3.0;
            for &v in t {
                area_acc[v as usize] += share;
            }
        }

        let sum_area: f64 = area_acc.iter().sum();
        let rel_err = (sum_area - 4.0 * PI).abs() / (4.0 * PI);
        if rel_err > 1e-6 {
            log::warn!("[grid] area partition error {rel_err:.3e} at F={f}");
        }

        let n1: Vec<SmallVec<[u32; 6]>> =
            n1_sets.into_iter().map(|s| s.into_iter().collect()).collect();

        let mut arc_sum = 0.0;
        let mut arc_cnt = 0usize;
        for (u, nbrs) in n1.iter().enumerate() {
            for &v in nbrs {
                arc_sum += arc_angle(pos[u], pos[v as usize]);
                arc_cnt += 1;
            }
        }
        let field_diameter = if arc_cnt > 0 { arc_sum / arc_cnt as f64 } else { PI };

        let latlon = pos.iter().map(|&p| to_latlon(p)).collect();
        log::debug!("[grid] F={f} cells={cells} diameter={field_diameter:.5} rad");

        Self {
            frequency: f,
            cells,
            pos_xyz: pos,
            latlon,
            area: area_acc,
            n1,
            triangles: tris,
            field_diameter,
        }
    }

    /// True when `id` names a field of this grid.
    #[inline]
    pub fn contains(&self, id: usize) -> bool {
        id < self.cells
    }

    /// Unit position of field `id`, or `None` when out of range.
    #[inline]
    pub fn pos(&self, id: usize) -> Option<[f64; 3]> {
        self.pos_xyz.get(id).copied()
    }

    /// Unit position of field `id` as a glam vector (zero vector when out of range).
    #[inline]
    pub fn pos_vec(&self, id: usize) -> glam::DVec3 {
        self.pos(id).map(glam::DVec3::from_array).unwrap_or(glam::DVec3::ZERO)
    }

    /// Neighbor ids of field `id`; empty for an out-of-range id.
    #[inline]
    pub fn neighbors(&self, id: usize) -> &[u32] {
        self.n1.get(id).map(|n| n.as_slice()).unwrap_or(&[])
    }

    /// Field area in steradians (0 for an out-of-range id).
    #[inline]
    pub fn field_area(&self, id: usize) -> f64 {
        self.area.get(id).copied().unwrap_or(0.0)
    }

    /// Mean neighbor spacing expressed in kilometers on the planet surface.
    pub fn field_diameter_km(&self) -> f64 {
        self.field_diameter * EARTH_RADIUS_KM
    }

    /// Exhaustive nearest-field search. O(cells); used to validate faster lookups.
    pub fn nearest_brute_force(&self, v: [f64; 3]) -> usize {
        let mut best = 0usize;
        let mut best_dot = f64::NEG_INFINITY;
        for (i, p) in self.pos_xyz.iter().enumerate() {
            let d = dot(*p, v);
            if d > best_dot {
                best_dot = d;
                best = i;
            }
        }
        best
    }
}

fn edge_vertex(
    pos: &mut Vec<[f64; 3]>,
    edge_map: &mut HashMap<EdgeKey, u32>,
    corners: &[[f64; 3]],
    from: usize,
    to: usize,
    t: u32,
    f: u32,
) -> u32 {
    // Canonical key: parameter measured from the lower corner id
    let key = if from < to { EdgeKey(from, to, t) } else { EdgeKey(to, from, f - t) };
    if let Some(&id) = edge_map.get(&key) {
        return id;
    }
    let (pa, pb) = (corners[from], corners[to]);
    let tt = t as f64 / f as f64;
    let id = pos.len() as u32;
    pos.push(normalize([
        pa[0] * (1.0 - tt) + pb[0] * tt,
        pa[1] * (1.0 - tt) + pb[1] * tt,
        pa[2] * (1.0 - tt) + pb[2] * tt,
    ]));
    edge_map.insert(key, id);
    id
}

/// Spherical triangle area on unit sphere using the robust vector formula.
fn spherical_triangle_area(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> f64 {
    let numerator = dot(cross(a, b), c).abs();
    let denom = 1.0 + dot(a, b) + dot(b, c) + dot(c, a);
    2.0 * numerator.atan2(denom)
}

/// Canonical icosahedron vertices (unit sphere) and faces (CCW)
fn icosahedron() -> (Vec<[f64; 3]>, Vec<[usize; 3]>) {
    let phi = (1.0 + 5.0_f64.sqrt()) * 0.5;
    let a = 1.0;
    let b = phi;
    let verts = vec![
        normalize([-a, b, 0.0]),
        normalize([a, b, 0.0]),
        normalize([-a, -b, 0.0]),
        normalize([a, -b, 0.0]),
        normalize([0.0, -a, b]),
        normalize([0.0, a, b]),
        normalize([0.0, -a, -b]),
        normalize([0.0, a, -b]),
        normalize([b, 0.0, -a]),
        normalize([b, 0.0, a]),
        normalize([-b, 0.0, -a]),
        normalize([-b, 0.0, a]),
    ];
    let faces = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];
    (verts, faces)
}
