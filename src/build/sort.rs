//! Primitive ordering by Morton key.

use rayon::prelude::*;

use super::morton::MortonKey;

/// Sort keys ascending by `(code, index)`.
///
/// Indices are unique, so no two keys compare equal and the unstable
/// parallel sort yields the same order a stable sort would.
#[tracing::instrument(skip_all, fields(key_count = keys.len()))]
pub fn sort_keys(keys: &mut [MortonKey]) {
    keys.par_sort_unstable();
    debug_assert!(keys.windows(2).all(|w| w[0] < w[1]), "keys are not strictly ordered");
}

/// Split sorted keys into parallel code and primitive-index arrays.
pub fn split_sorted(keys: &[MortonKey], codes: &mut Vec<u32>, indices: &mut Vec<u32>) {
    codes.clear();
    indices.clear();
    codes.extend(keys.iter().map(|k| k.code));
    indices.extend(keys.iter().map(|k| k.index));
}
