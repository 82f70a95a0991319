use std::sync::Arc;

use lithos_engine::config::ModelProps;
use lithos_engine::grid::Grid;
use lithos_engine::preset::{model_from_image, seeds_from_image, PresetError, PresetImage};
use lithos_engine::spatial_index::SpatialIndex;

fn image(width: u32, height: u32, pixel: impl Fn(u32, u32) -> [u8; 4]) -> PresetImage {
    let mut data = Vec::new();
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&pixel(x, y));
        }
    }
    PresetImage { width, height, data }
}

#[test]
fn empty_image_samples_transparent() {
    let img = PresetImage { width: 0, height: 0, data: Vec::new() };
    assert_eq!(img.sample(0.3, -1.0), [0; 4]);
    let grid = Grid::new(2);
    assert!(matches!(seeds_from_image(&grid, &img), Err(PresetError::BadDimensions { .. })));
}

#[test]
fn short_buffer_is_rejected() {
    let mut img = image(4, 2, |_, _| [0, 0, 0, 255]);
    img.data.pop();
    let grid = Grid::new(2);
    assert!(matches!(
        seeds_from_image(&grid, &img),
        Err(PresetError::BadDimensions { expected: 32, actual: 31, .. })
    ));
}

#[test]
fn transparent_image_has_no_plates() {
    let img = image(4, 2, |_, _| [10, 0, 10, 0]);
    assert!(matches!(seeds_from_image(&Grid::new(2), &img), Err(PresetError::NoPlates)));
}

#[test]
fn plates_follow_colour_keys() {
    // west half (255, 0) sorts after east half (0, 9)
    let img = image(8, 4, |x, y| {
        let (r, b) = if x < 4 { (255, 0) } else { (0, 9) };
        let g = if y == 3 { 255 } else { 0 };
        [r, g, b, 255]
    });
    let idx = Arc::new(SpatialIndex::new(Arc::new(Grid::new(6))));
    let model = model_from_image(idx.clone(), &img, ModelProps::default()).unwrap();
    assert_eq!(model.plates().len(), 2);
    let total: usize = model.plates().iter().map(|p| p.field_count()).sum();
    assert_eq!(total, idx.grid().cells);

    let grid = idx.grid();
    for p in model.plates() {
        for f in p.fields() {
            let [lat, lon] = grid.latlon[f.id];
            let west = lon < 0.0;
            let want = if west { 1 } else { 0 };
            if (lon.abs() > 0.05) && (std::f64::consts::PI - lon.abs() > 0.05) {
                assert_eq!(p.id, want, "field {} at lon {lon}", f.id);
            }
            if lat < -std::f64::consts::FRAC_PI_4 - 0.05 {
                assert!(f.is_continental());
            }
            if lat > -std::f64::consts::FRAC_PI_4 + 0.05 {
                assert!(!f.is_continental());
            }
        }
    }
}
