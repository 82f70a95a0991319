//! Lithos engine: rigid-plate tectonics on a geodesic sphere with layered crust.
//!
//! A [`model::Model`] owns a set of plates over a shared read-only [`grid::Grid`]. Each step
//! integrates plate rotation, resolves contacts into subduction or orogeny, runs surface
//! processes, fills rift gaps with fresh oceanic crust and optionally spawns hazards.
//! [`worker::Worker`] exposes the model through JSON messages.
#![deny(missing_docs)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::dbg_macro, clippy::large_enum_variant)]

pub mod collisions;
pub mod config;
pub mod crust;
pub mod field;
pub mod forces;
pub mod geo;
pub mod grid;
pub mod hazards;
pub mod integrator;
pub mod migration;
pub mod model;
pub mod plate;
pub mod plate_division;
pub mod plate_group;
pub mod preset;
pub mod rifting;
pub mod rng;
pub mod rock;
pub mod serialization;
pub mod snapshots;
pub mod spatial_index;
pub mod surface;
pub mod units;
pub mod worker;
