//! Windowed view over a [`CompositionSpace`].
//!
//! Each dimension is cut into buckets of at most `max` values (the last one
//! may be short). A bucket-composition ID picks one bucket per dimension and a
//! local offset picks one value combination inside those buckets. Local
//! offsets wrap within the bucket: a short final bucket never reads past the
//! end of its dimension.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use crate::error::IndexError;
use super::{CompositionIndices, CompositionSpace, Dimension, decompose, encode, product};

/// Visible-size caps. `0` means uncapped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketLimits {
    #[serde(default)]
    pub ext_max: usize,
    #[serde(default)]
    pub wildcard_max: usize,
    /// Per-wildcard caps that take precedence over `wildcard_max`.
    #[serde(default)]
    pub overrides: BTreeMap<String, usize>,
}

impl BucketLimits {
    pub fn effective_wildcard_max(&self, name: &str) -> usize {
        self.overrides.get(name).copied().unwrap_or(self.wildcard_max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketIndices {
    pub ext_bucket_idx: usize,
    pub wc_bucket_indices: BTreeMap<String, usize>,
    /// First value of the selected external-text bucket.
    pub ext_value_idx: usize,
    /// First value of each selected wildcard bucket.
    pub wc_value_indices: BTreeMap<String, usize>,
    pub total_buckets: u64,
}

/// Only built over addressable spaces, so every bucket and offset product
/// below is bounded by the space's cardinality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketedSpace {
    space: CompositionSpace,
    limits: BucketLimits,
}

impl BucketedSpace {
    pub fn new(space: CompositionSpace, limits: BucketLimits) -> Result<Self, IndexError> {
        space.cardinality()?;
        Ok(Self { space, limits })
    }

    pub fn space(&self) -> &CompositionSpace {
        &self.space
    }

    pub fn limits(&self) -> &BucketLimits {
        &self.limits
    }

    /// Bucket width per dimension. An uncapped or oversized cap spans the
    /// whole dimension.
    fn caps(&self) -> Vec<u64> {
        let maxes = std::iter::once(self.limits.ext_max).chain(
            self.space
                .wildcard_names()
                .map(|name| self.limits.effective_wildcard_max(name)),
        );
        self.space
            .dimensions()
            .into_iter()
            .zip(maxes)
            .map(|(size, max)| match max as u64 {
                0 => size,
                m => m.min(size),
            })
            .collect()
    }

    /// Number of buckets per dimension: `ceil(size / cap)`.
    pub fn bucket_dimensions(&self) -> Vec<u64> {
        self.space
            .dimensions()
            .into_iter()
            .zip(self.caps())
            .map(|(size, cap)| size.div_ceil(cap))
            .collect()
    }

    pub fn total_buckets(&self) -> u64 {
        product(&self.bucket_dimensions())
    }

    /// Selects the buckets addressed by `bucket_id` (wrapping) and reports
    /// the first value index of each.
    pub fn locate(&self, bucket_id: u64) -> BucketIndices {
        let bucket_dims = self.bucket_dimensions();
        let total = product(&bucket_dims);
        let buckets = decompose(bucket_id % total, &bucket_dims);
        let starts: Vec<u64> = buckets
            .iter()
            .zip(self.caps())
            .map(|(&b, cap)| b * cap)
            .collect();

        let bucket_indices = self.space.indices_from_digits(&buckets);
        let value_indices = self.space.indices_from_digits(&starts);

        BucketIndices {
            ext_bucket_idx: bucket_indices.ext_index,
            wc_bucket_indices: bucket_indices.wildcards,
            ext_value_idx: value_indices.ext_index,
            wc_value_indices: value_indices.wildcards,
            total_buckets: total,
        }
    }

    fn widths(&self, buckets: &[u64]) -> Vec<u64> {
        self.space
            .dimensions()
            .into_iter()
            .zip(self.caps())
            .zip(buckets)
            .map(|((size, cap), &b)| cap.min(size - b * cap))
            .collect()
    }

    fn bucket_digits(&self, bucket_id: u64) -> Vec<u64> {
        let bucket_dims = self.bucket_dimensions();
        decompose(bucket_id % product(&bucket_dims), &bucket_dims)
    }

    /// Number of value combinations inside the buckets selected by `bucket_id`.
    pub fn local_cardinality(&self, bucket_id: u64) -> u64 {
        product(&self.widths(&self.bucket_digits(bucket_id)))
    }

    /// Real value index reached by moving `offset` steps into one bucket of
    /// one dimension. Offsets wrap within the bucket's actual width.
    pub fn window_value(
        &self,
        dimension: &Dimension,
        bucket_idx: usize,
        offset: usize,
    ) -> Result<usize, IndexError> {
        let position = self.space.position_of(dimension)?;
        let size = self.space.dimensions()[position];
        let cap = self.caps()[position];
        let bucket = bucket_idx as u64 % size.div_ceil(cap);
        let start = bucket * cap;
        let width = cap.min(size - start);
        Ok((start + offset as u64 % width) as usize)
    }

    /// Value indices for one combination inside the selected buckets.
    pub fn resolve(&self, bucket_id: u64, local_offset: u64) -> CompositionIndices {
        let buckets = self.bucket_digits(bucket_id);
        let caps = self.caps();
        let widths = self.widths(&buckets);
        let local = decompose(local_offset % product(&widths), &widths);

        let values: Vec<u64> = buckets
            .iter()
            .zip(&caps)
            .zip(&local)
            .map(|((&b, &cap), &l)| b * cap + l)
            .collect();
        self.space.indices_from_digits(&values)
    }

    /// Unbucketed composition ID for a bucket / local-offset pair.
    pub fn composition_id(&self, bucket_id: u64, local_offset: u64) -> u64 {
        let indices = self.resolve(bucket_id, local_offset);
        encode(&self.space.digits_from_indices(&indices), &self.space.dimensions())
    }

    /// Inverse of [`BucketedSpace::composition_id`].
    pub fn bucket_of(&self, composition_id: u64) -> (u64, u64) {
        let dims = self.space.dimensions();
        let values = decompose(composition_id % product(&dims), &dims);
        let caps = self.caps();

        let buckets: Vec<u64> = values.iter().zip(&caps).map(|(&v, &cap)| v / cap).collect();
        let local: Vec<u64> = values.iter().zip(&caps).map(|(&v, &cap)| v % cap).collect();

        let bucket_id = encode(&buckets, &self.bucket_dimensions());
        let local_offset = encode(&local, &self.widths(&buckets));
        (bucket_id, local_offset)
    }
}

/// Free-function form of [`BucketedSpace::locate`].
pub fn bucket_composition_to_indices<I, S>(
    id: u64,
    ext_count: usize,
    ext_max: usize,
    wildcard_counts: I,
    wc_max: usize,
    overrides: Option<&BTreeMap<String, usize>>,
) -> Result<BucketIndices, IndexError>
where
    I: IntoIterator<Item = (S, usize)>,
    S: Into<String>,
{
    let limits = BucketLimits {
        ext_max,
        wildcard_max: wc_max,
        overrides: overrides.cloned().unwrap_or_default(),
    };
    let space = BucketedSpace::new(CompositionSpace::new(ext_count, wildcard_counts), limits)?;
    Ok(space.locate(id))
}
