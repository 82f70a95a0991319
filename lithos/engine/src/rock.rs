//! Rock types and their fixed precedence order inside a crust column.

use serde::{Deserialize, Serialize};

/// Rock types, declared in precedence order from the surface downwards.
///
/// A crust keeps its layers sorted by this order; the discriminant doubles as the compact
/// wire code used in serialized crust arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Rock {
    /// Deep-sea ooze and clays.
    OceanicSediment = 0,
    /// Eroded continental material.
    ContinentalSediment = 1,
    /// Carbonate platform rock.
    Limestone = 2,
    /// Fine-grained clastic rock.
    Shale = 3,
    /// Coarse clastic rock.
    Sandstone = 4,
    /// Extrusive arc volcanic rock.
    Andesite = 5,
    /// Intrusive arc rock.
    Diorite = 6,
    /// Continental basement.
    Granite = 7,
    /// Upper oceanic crust.
    Basalt = 8,
    /// Lower oceanic crust.
    Gabbro = 9,
}

impl Rock {
    /// Every rock type in precedence order.
    pub const ALL: [Rock; 10] = [
        Rock::OceanicSediment,
        Rock::ContinentalSediment,
        Rock::Limestone,
        Rock::Shale,
        Rock::Sandstone,
        Rock::Andesite,
        Rock::Diorite,
        Rock::Granite,
        Rock::Basalt,
        Rock::Gabbro,
    ];

    /// Wire code (index in [`Rock::ALL`]).
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Inverse of [`Rock::code`].
    #[inline]
    pub fn from_code(code: u8) -> Option<Rock> {
        Rock::ALL.get(code as usize).copied()
    }

    /// Loose sediment (can be spread and accreted).
    #[inline]
    pub fn is_sediment(self) -> bool {
        matches!(self, Rock::OceanicSediment | Rock::ContinentalSediment)
    }

    /// Rocks that can be scraped off or folded onto another crust. The deepest two oceanic
    /// rocks always go down with the slab.
    #[inline]
    pub fn is_transferable(self) -> bool {
        !matches!(self, Rock::Basalt | Rock::Gabbro)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_in_order() {
        for (i, r) in Rock::ALL.iter().enumerate() {
            assert_eq!(r.code() as usize, i);
            assert_eq!(Rock::from_code(r.code()), Some(*r));
        }
        assert_eq!(Rock::from_code(200), None);
        assert!(Rock::OceanicSediment < Rock::Gabbro);
    }
}
