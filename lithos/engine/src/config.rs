//! Live model properties.
//!
//! The presentation side syncs these periodically with a `props` message carrying any subset of
//! the keys below (camelCase). Unknown keys are ignored; a value of the wrong type rejects the
//! whole update so a model never runs with half-applied settings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Integrator used for plate rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Integration {
    /// Semi-implicit Euler
    #[default]
    Euler,
    /// Velocity Verlet
    Verlet,
    /// Classic fourth-order Runge-Kutta
    Rk4,
}

/// Errors from a rejected `props` update.
#[derive(thiserror::Error, Debug)]
pub enum PropsError {
    /// Payload was not a JSON object
    #[error("props payload must be an object")]
    NotAnObject,
    /// A known key carried a value of the wrong type
    #[error("invalid props: {0}")]
    Invalid(#[from] serde_json::Error),
    /// Values parsed but are out of range
    #[error("props out of range: {0}")]
    OutOfRange(&'static str),
}

/// Parameters that control stepping. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelProps {
    /// Step length in model time units
    pub timestep: f64,
    /// Rotation integrator
    pub integration: Integration,
    /// `tick()` advances the model only while playing
    pub playing: bool,
    /// Seed the RNG from `seed` on load
    pub deterministic: bool,
    /// Seed used when `deterministic` is set
    pub seed: u64,
    /// Generate earthquakes
    pub earthquakes: bool,
    /// Generate volcanic eruptions
    pub volcanic_eruptions: bool,
    /// Run metamorphism diffusion
    pub metamorphism: bool,
    /// Run sediment spreading
    pub sediments: bool,
    /// Run erosion
    pub erosion: bool,
    /// Split oversized plates
    pub plate_division: bool,
    /// Let hot-spot forces fade over time
    pub hot_spot_decay: bool,
    /// Distance after which a subducting field leaves active collision (km)
    pub subduction_width_km: f64,
    /// Push a rolling snapshot every N steps
    pub snapshot_interval: u32,
    /// Emit `output` every N ticks
    pub output_interval: u32,
    /// Rolling snapshot history length
    pub max_snapshots: usize,
}

impl Default for ModelProps {
    fn default() -> Self {
        Self {
            timestep: 0.2,
            integration: Integration::Euler,
            playing: false,
            deterministic: true,
            seed: 0,
            earthquakes: false,
            volcanic_eruptions: false,
            metamorphism: true,
            sediments: true,
            erosion: true,
            plate_division: false,
            hot_spot_decay: false,
            subduction_width_km: 1500.0,
            snapshot_interval: 10,
            output_interval: 1,
            max_snapshots: 30,
        }
    }
}

impl ModelProps {
    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), PropsError> {
        if !(self.timestep.is_finite() && self.timestep > 0.0) {
            return Err(PropsError::OutOfRange("timestep"));
        }
        if !(self.subduction_width_km.is_finite() && self.subduction_width_km > 0.0) {
            return Err(PropsError::OutOfRange("subductionWidthKm"));
        }
        if self.snapshot_interval == 0 {
            return Err(PropsError::OutOfRange("snapshotInterval"));
        }
        if self.output_interval == 0 {
            return Err(PropsError::OutOfRange("outputInterval"));
        }
        Ok(())
    }

    /// Apply a partial update. On error `self` is left untouched.
    pub fn apply_patch(&mut self, patch: &Value) -> Result<(), PropsError> {
        let Value::Object(entries) = patch else {
            return Err(PropsError::NotAnObject);
        };
        let mut merged = serde_json::to_value(&*self)?;
        if let Value::Object(current) = &mut merged {
            for (k, v) in entries {
                if current.contains_key(k) {
                    current.insert(k.clone(), v.clone());
                } else {
                    log::debug!("[config] ignoring unknown prop {k}");
                }
            }
        }
        let updated: ModelProps = serde_json::from_value(merged)?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bad_type_rejects_whole_patch() {
        let mut p = ModelProps::default();
        let before = p.clone();
        let r = p.apply_patch(&json!({ "timestep": 0.5, "playing": "yes" }));
        assert!(r.is_err());
        assert_eq!(p, before);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut p = ModelProps::default();
        p.apply_patch(&json!({ "integration": "rk4", "colormap": "topo" })).unwrap();
        assert_eq!(p.integration, Integration::Rk4);
    }
}
