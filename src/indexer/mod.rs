//! 组合索引器 (Composition Indexer)
//!
//! Maps a single composition ID onto one index per dimension and back. The
//! first dimension is always the external-text dimension; the remaining ones
//! are wildcards in lexicographic name order, with the last name being the
//! least significant digit.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use crate::error::IndexError;

pub mod bucket;

pub use bucket::{BucketIndices, BucketLimits, BucketedSpace, bucket_composition_to_indices};

/// Mixed-radix decomposition, most significant digit first.
/// `id` must already be reduced below the product of `radices`.
pub(crate) fn decompose(id: u64, radices: &[u64]) -> Vec<u64> {
    let mut digits = vec![0; radices.len()];
    let mut rem = id;
    for (slot, &radix) in digits.iter_mut().zip(radices).rev() {
        *slot = rem % radix;
        rem /= radix;
    }
    digits
}

/// Inverse of [`decompose`]. Digits are reduced modulo their radix.
pub(crate) fn encode(digits: &[u64], radices: &[u64]) -> u64 {
    digits
        .iter()
        .zip(radices)
        .fold(0u64, |acc, (&digit, &radix)| {
            acc.saturating_mul(radix).saturating_add(digit % radix)
        })
}

/// Only for radices already known to fit: every dimension vector derived
/// from an addressable space is bounded by that space's cardinality.
pub(crate) fn product(radices: &[u64]) -> u64 {
    radices.iter().fold(1u64, |acc, &r| acc.saturating_mul(r))
}

pub(crate) fn checked_product(radices: &[u64]) -> Option<u64> {
    radices.iter().try_fold(1u64, |acc, &r| acc.checked_mul(r))
}

/// Selects one axis of a [`CompositionSpace`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dimension {
    ExternalText,
    Wildcard(String),
}

impl Dimension {
    pub fn wildcard(name: impl Into<String>) -> Self {
        Dimension::Wildcard(name.into())
    }
}

/// Per-dimension value indices of one composition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositionIndices {
    pub ext_index: usize,
    pub wildcards: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionSpace {
    ext_count: usize,
    wildcards: BTreeMap<String, usize>,
}

impl CompositionSpace {
    pub fn new<I, S>(ext_count: usize, wildcard_counts: I) -> Self
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        Self {
            ext_count,
            wildcards: wildcard_counts
                .into_iter()
                .map(|(name, count)| (name.into(), count))
                .collect(),
        }
    }

    pub fn ext_count(&self) -> usize {
        self.ext_count
    }

    pub fn wildcard_names(&self) -> impl Iterator<Item = &str> {
        self.wildcards.keys().map(|k| k.as_str())
    }

    pub fn wildcard_count(&self, name: &str) -> Option<usize> {
        self.wildcards.get(name).copied()
    }

    /// Dimension sizes in significance order, each floored to 1.
    pub fn dimensions(&self) -> Vec<u64> {
        std::iter::once(self.ext_count)
            .chain(self.wildcards.values().copied())
            .map(|size| size.max(1) as u64)
            .collect()
    }

    /// Number of compositions. A space whose product does not fit in a
    /// `u64` cannot be addressed and is rejected with [`IndexError::Overflow`].
    pub fn cardinality(&self) -> Result<u64, IndexError> {
        checked_product(&self.dimensions()).ok_or(IndexError::Overflow)
    }

    /// Splits `id` into per-dimension indices. Out-of-range IDs wrap.
    pub fn decompose(&self, id: u64) -> Result<CompositionIndices, IndexError> {
        let dims = self.dimensions();
        let digits = decompose(id % self.cardinality()?, &dims);
        Ok(self.indices_from_digits(&digits))
    }

    /// Re-encodes per-dimension indices into a composition ID. Missing
    /// wildcards count as index 0; indices wrap against their dimension.
    pub fn encode(&self, indices: &CompositionIndices) -> Result<u64, IndexError> {
        self.cardinality()?;
        Ok(encode(&self.digits_from_indices(indices), &self.dimensions()))
    }

    /// Returns the ID that differs from `id` only in `dimension`, which is set
    /// to `value_index`. Runs in time proportional to the dimension count.
    pub fn with_value(
        &self,
        id: u64,
        dimension: &Dimension,
        value_index: usize,
    ) -> Result<u64, IndexError> {
        let dims = self.dimensions();
        let position = self.position_of(dimension)?;
        let id = id % self.cardinality()?;

        let size = dims[position];
        let stride = checked_product(&dims[position + 1..]).ok_or(IndexError::Overflow)?;
        let current = (id / stride) % size;
        let target = value_index as u64 % size;

        (id - current * stride)
            .checked_add(target.checked_mul(stride).ok_or(IndexError::Overflow)?)
            .ok_or(IndexError::Overflow)
    }

    pub(crate) fn position_of(&self, dimension: &Dimension) -> Result<usize, IndexError> {
        match dimension {
            Dimension::ExternalText => Ok(0),
            Dimension::Wildcard(name) => self
                .wildcards
                .keys()
                .position(|k| k == name)
                .map(|p| p + 1)
                .ok_or_else(|| IndexError::UnknownDimension(name.clone())),
        }
    }

    pub(crate) fn indices_from_digits(&self, digits: &[u64]) -> CompositionIndices {
        CompositionIndices {
            ext_index: digits.first().copied().unwrap_or(0) as usize,
            wildcards: self
                .wildcards
                .keys()
                .zip(digits.iter().skip(1))
                .map(|(name, &d)| (name.clone(), d as usize))
                .collect(),
        }
    }

    pub(crate) fn digits_from_indices(&self, indices: &CompositionIndices) -> Vec<u64> {
        std::iter::once(indices.ext_index as u64)
            .chain(
                self.wildcards
                    .keys()
                    .map(|name| indices.wildcards.get(name).copied().unwrap_or(0) as u64),
            )
            .collect()
    }
}

/// Free-function form of [`CompositionSpace::decompose`].
pub fn composition_to_indices<I, S>(
    id: u64,
    ext_count: usize,
    wildcard_counts: I,
) -> Result<(usize, BTreeMap<String, usize>), IndexError>
where
    I: IntoIterator<Item = (S, usize)>,
    S: Into<String>,
{
    let indices = CompositionSpace::new(ext_count, wildcard_counts).decompose(id)?;
    Ok((indices.ext_index, indices.wildcards))
}
