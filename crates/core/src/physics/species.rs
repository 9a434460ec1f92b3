//! Moisture species and their per-species literal tables
//!
//! The five prognostic moisture variables share one implicit solve. Their numbering in
//! the solver (the "slot") follows the cloud-scheme index group, so the elimination order
//! is whatever the `NCLDQ*` parameters say.

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

use crate::error::{CloudscError, CloudscResult};

/// Moisture species
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Species {
    /// Cloud liquid water
    Liquid,
    /// Cloud ice
    Ice,
    /// Rain
    Rain,
    /// Snow
    Snow,
    /// Water vapour
    Vapour,
}

impl Species {
    /// All species in storage order
    pub const ALL: [Species; 5] = [
        Species::Liquid,
        Species::Ice,
        Species::Rain,
        Species::Snow,
        Species::Vapour,
    ];

    /// Storage index
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Suffix used by literal constant names (`FALLQL`, `VQS`, ...)
    #[must_use]
    pub const fn key_suffix(self) -> &'static str {
        match self {
            Self::Liquid => "L",
            Self::Ice => "I",
            Self::Rain => "R",
            Self::Snow => "S",
            Self::Vapour => "V",
        }
    }
}

/// Thermodynamic phase of a species
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Vapour,
    Liquid,
    Ice,
}

impl Phase {
    /// Decode a `PHASEQ*` literal (0 vapour, 1 liquid, 2 ice)
    ///
    /// # Errors
    ///
    /// Returns [`CloudscError::InvalidConstant`] for any other code.
    pub fn from_code(key: &str, code: i64) -> CloudscResult<Self> {
        match code {
            0 => Ok(Self::Vapour),
            1 => Ok(Self::Liquid),
            2 => Ok(Self::Ice),
            other => Err(CloudscError::invalid(
                key,
                format!("phase code {other} is not 0, 1 or 2"),
            )),
        }
    }
}

/// One value per species, indexed by [`Species`]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerSpecies<T>(pub [T; 5]);

impl<T: Copy> PerSpecies<T> {
    /// Same value for every species
    #[must_use]
    pub const fn splat(value: T) -> Self {
        Self([value; 5])
    }
}

impl<T> Index<Species> for PerSpecies<T> {
    type Output = T;

    #[inline]
    fn index(&self, species: Species) -> &T {
        &self.0[species.index()]
    }
}

impl<T> IndexMut<Species> for PerSpecies<T> {
    #[inline]
    fn index_mut(&mut self, species: Species) -> &mut T {
        &mut self.0[species.index()]
    }
}

/// Per-species literal tables resolved from the constant table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeciesTable {
    slot: PerSpecies<usize>,
    by_slot: [Species; 5],
    /// Species precipitates through the level base (`FALLQ*`)
    pub fall: PerSpecies<bool>,
    /// Terminal fall speed (`VQ*`)
    pub vq: PerSpecies<f64>,
    /// Thermodynamic phase (`PHASEQ*`)
    pub phase: PerSpecies<Phase>,
    /// Species receiving the melted or frozen mass (`MELTQ*`, -99 = none)
    pub melt: PerSpecies<Option<Species>>,
}

/// Marker for "no melt target" in the `MELTQ*` literals
pub const NO_MELT_TARGET: i64 = -99;

impl SpeciesTable {
    /// Build the table from resolved indices and literals
    ///
    /// # Arguments
    ///
    /// * `indices` - One-based solver index of each species (`NCLDQ*`)
    /// * `fall`, `vq`, `phase` - Literal tables
    /// * `melt_codes` - One-based melt-target index per species, or [`NO_MELT_TARGET`]
    ///
    /// # Errors
    ///
    /// Returns [`CloudscError::InvalidConstant`] when the indices are not a permutation
    /// of `1..=5` or a melt code names no species.
    pub fn new(
        indices: PerSpecies<i64>,
        fall: PerSpecies<bool>,
        vq: PerSpecies<f64>,
        phase: PerSpecies<Phase>,
        melt_codes: PerSpecies<i64>,
    ) -> CloudscResult<Self> {
        let mut slot = PerSpecies::splat(0);
        let mut by_slot: [Option<Species>; 5] = [None; 5];
        for species in Species::ALL {
            let key = format!("NCLDQ{}", species.key_suffix());
            let index = indices[species];
            if !(1..=5).contains(&index) {
                return Err(CloudscError::invalid(
                    &key,
                    format!("species index {index} outside 1..=5"),
                ));
            }
            let s = (index - 1) as usize;
            if let Some(other) = by_slot[s] {
                return Err(CloudscError::invalid(
                    &key,
                    format!("species index {index} already used by {other:?}"),
                ));
            }
            by_slot[s] = Some(species);
            slot[species] = s;
        }
        // Five distinct indices in 1..=5 fill every slot
        let by_slot = by_slot.map(|s| s.unwrap_or(Species::Vapour));

        let mut melt = PerSpecies::splat(None);
        for species in Species::ALL {
            let code = melt_codes[species];
            melt[species] = if code == NO_MELT_TARGET {
                None
            } else if (1..=5).contains(&code) {
                Some(by_slot[(code - 1) as usize])
            } else {
                return Err(CloudscError::invalid(
                    &format!("MELTQ{}", species.key_suffix()),
                    format!("melt target {code} is neither a species index nor {NO_MELT_TARGET}"),
                ));
            };
        }

        Ok(Self {
            slot,
            by_slot,
            fall,
            vq,
            phase,
            melt,
        })
    }

    /// Zero-based solver slot of `species`
    #[inline]
    #[must_use]
    pub fn slot(&self, species: Species) -> usize {
        self.slot[species]
    }

    /// Species occupying solver slot `slot`
    #[inline]
    #[must_use]
    pub fn species_at(&self, slot: usize) -> Species {
        self.by_slot[slot]
    }

    /// Whether `species` leaves the level by sedimentation
    ///
    /// Precipitating species fall by definition; cloud ice sediments as well with its
    /// own fall speed.
    #[inline]
    #[must_use]
    pub fn sediments(&self, species: Species) -> bool {
        self.fall[species] || species == Species::Ice
    }
}
