//! Building a model from a decoded preset image.
//!
//! The image is an equirectangular RGBA map. Each distinct (red, blue) pair is one plate,
//! green above 127 marks continental crust, and transparent pixels leave the field unowned.
//! Plate ids follow the sorted (red, blue) keys, so the result does not depend on pixel order.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::sync::Arc;

use crate::config::ModelProps;
use crate::grid::Grid;
use crate::model::{FieldSeed, Model};
use crate::plate::PlateId;
use crate::spatial_index::SpatialIndex;

/// Errors for malformed preset images.
#[derive(thiserror::Error, Debug)]
pub enum PresetError {
    /// Buffer length does not match `width × height × 4`
    #[error("image {width}x{height} needs {expected} bytes, got {actual}")]
    BadDimensions {
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
        /// Required buffer length
        expected: usize,
        /// Actual buffer length
        actual: usize,
    },
    /// No opaque pixel was sampled
    #[error("preset has no plates")]
    NoPlates,
}

/// Decoded RGBA8 image.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PresetImage {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Row-major RGBA bytes
    pub data: Vec<u8>,
}

impl PresetImage {
    fn validate(&self) -> Result<(), PresetError> {
        let expected = self.width as usize * self.height as usize * 4;
        if self.width == 0 || self.height == 0 || self.data.len() != expected {
            return Err(PresetError::BadDimensions {
                width: self.width,
                height: self.height,
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    /// RGBA of the pixel covering (`lat`, `lon`) in radians.
    /// An empty image samples as transparent.
    pub fn sample(&self, lat: f64, lon: f64) -> [u8; 4] {
        if self.width == 0 || self.height == 0 {
            return [0; 4];
        }
        let u = (lon + PI) / (2.0 * PI);
        let v = (PI / 2.0 - lat) / PI;
        let x = ((u * self.width as f64).floor().max(0.0) as usize).min(self.width as usize - 1);
        let y = ((v * self.height as f64).floor().max(0.0) as usize).min(self.height as usize - 1);
        let i = (y * self.width as usize + x) * 4;
        match self.data.get(i..i + 4) {
            Some(px) => [px[0], px[1], px[2], px[3]],
            None => [0; 4],
        }
    }
}

/// One seed per grid field.
pub fn seeds_from_image(grid: &Grid, image: &PresetImage) -> Result<Vec<Option<FieldSeed>>, PresetError> {
    image.validate()?;
    let samples: Vec<[u8; 4]> = grid.latlon.iter().map(|&[lat, lon]| image.sample(lat, lon)).collect();
    let mut keys: BTreeMap<(u8, u8), PlateId> = BTreeMap::new();
    for px in samples.iter().filter(|px| px[3] >= 128) {
        keys.insert((px[0], px[2]), 0);
    }
    if keys.is_empty() {
        return Err(PresetError::NoPlates);
    }
    for (i, id) in keys.values_mut().enumerate() {
        *id = i as PlateId;
    }
    Ok(samples
        .iter()
        .map(|px| {
            (px[3] >= 128).then(|| FieldSeed {
                plate: keys.get(&(px[0], px[2])).copied().unwrap_or(0),
                continental: px[1] > 127,
            })
        })
        .collect())
}

/// Build a model from a preset image.
pub fn model_from_image(
    index: Arc<SpatialIndex>,
    image: &PresetImage,
    props: ModelProps,
) -> Result<Model, PresetError> {
    let seeds = seeds_from_image(index.grid(), image)?;
    Ok(Model::from_seeds(index, &seeds, props))
}
