//! Plates that rotate as one rigid system after a soft continental collision.

use std::collections::BTreeSet;

use glam::{DMat3, DVec3};
use serde::{Deserialize, Serialize};

use crate::plate::{Plate, PlateId, MIN_INERTIA_DET};

/// Relative speed (km per time unit) below which colliding continents lock together.
pub const MERGE_SPEED_KM: f64 = 2.0;

/// A set of plates sharing one angular acceleration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlateGroup {
    /// Group identifier
    pub id: u32,
    /// Member plates
    pub members: BTreeSet<PlateId>,
}

impl PlateGroup {
    /// Group of two plates.
    pub fn new(id: u32, a: PlateId, b: PlateId) -> Self {
        Self { id, members: [a, b].into_iter().collect() }
    }

    /// True when `plate` is a member.
    pub fn contains(&self, plate: PlateId) -> bool {
        self.members.contains(&plate)
    }

    /// Absorb every member of `other`.
    pub fn absorb(&mut self, other: PlateGroup) {
        self.members.extend(other.members);
    }

    fn member_plates<'a>(&'a self, plates: &'a [Plate]) -> impl Iterator<Item = &'a Plate> + 'a {
        plates.iter().filter(move |p| self.members.contains(&p.id))
    }

    /// Combined inertia of all members.
    pub fn inertia(&self, plates: &[Plate]) -> DMat3 {
        self.member_plates(plates).fold(DMat3::ZERO, |acc, p| acc + p.inertia)
    }

    /// Shared acceleration: summed torque through the summed inertia.
    pub fn angular_acceleration(&self, plates: &[Plate]) -> DVec3 {
        let torque: DVec3 = self.member_plates(plates).map(|p| p.total_torque()).sum();
        match invert(self.inertia(plates)) {
            Some(inv) => inv * torque,
            None => DVec3::ZERO,
        }
    }

    /// Inertia-weighted mean angular velocity of the members.
    pub fn angular_velocity(&self, plates: &[Plate]) -> DVec3 {
        let momentum: DVec3 =
            self.member_plates(plates).map(|p| p.inertia * p.angular_velocity).sum();
        match invert(self.inertia(plates)) {
            Some(inv) => inv * momentum,
            None => DVec3::ZERO,
        }
    }
}

fn invert(m: DMat3) -> Option<DMat3> {
    (m.determinant().abs() >= MIN_INERTIA_DET).then(|| m.inverse())
}
