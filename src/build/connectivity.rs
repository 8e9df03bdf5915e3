//! Binary topology from sorted Morton keys.
//!
//! Each internal node `i` in `[0, n-2]` finds the key range it covers and
//! the split inside that range using only the sorted keys, so every node is
//! computed independently and in parallel. Leaves live at `n-1 + k` for
//! sorted position `k`.

use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

use super::morton::MortonKey;
use crate::tree::INVALID;

/// Length of the common high-order prefix of keys `a` and `b`
/// (extended by primitive index), or -1 when `b` is out of range.
#[inline]
pub fn delta(keys: &[MortonKey], a: i64, b: i64) -> i32 {
    if b < 0 || b >= keys.len() as i64 {
        return -1;
    }
    (keys[a as usize].extended() ^ keys[b as usize].extended()).leading_zeros() as i32
}

/// Inclusive sorted-key range `[first, last]` covered by internal node `i`.
pub fn determine_range(keys: &[MortonKey], i: usize) -> (usize, usize) {
    let i = i as i64;
    let d: i64 = if delta(keys, i, i + 1) >= delta(keys, i, i - 1) { 1 } else { -1 };

    // Upper bound on the range length
    let delta_min = delta(keys, i, i - d);
    let mut l_max: i64 = 2;
    while delta(keys, i, i + l_max * d) > delta_min {
        l_max *= 2;
    }

    // Exact range end
    let mut l: i64 = 0;
    let mut t = l_max / 2;
    while t >= 1 {
        if delta(keys, i, i + (l + t) * d) > delta_min {
            l += t;
        }
        t /= 2;
    }
    let j = i + l * d;
    (i.min(j) as usize, i.max(j) as usize)
}

/// Last position of the left half of `[first, last]`: the highest position
/// whose prefix with `first` is longer than the prefix of the whole range.
pub fn find_split(keys: &[MortonKey], first: usize, last: usize) -> usize {
    let common = delta(keys, first as i64, last as i64);
    let mut split = first;
    let mut step = last - first;
    loop {
        step = (step + 1) >> 1;
        let candidate = split + step;
        if candidate < last && delta(keys, first as i64, candidate as i64) > common {
            split = candidate;
        }
        if step <= 1 {
            break;
        }
    }
    split
}

/// Children `[left, right]` of internal node `i`.
#[inline]
pub fn node_children(keys: &[MortonKey], i: usize) -> [u32; 2] {
    let leaf_base = keys.len() - 1;
    let (first, last) = determine_range(keys, i);
    let split = find_split(keys, first, last);
    let left = if split == first { leaf_base + split } else { split };
    let right = if split + 1 == last { leaf_base + split + 1 } else { split + 1 };
    [left as u32, right as u32]
}

/// Fill `children` (one entry per internal node) and `parents` (one per node).
///
/// `parents` must hold `2n-1` entries. Every child slot is written by
/// exactly one internal node, so the relaxed stores never race.
#[tracing::instrument(skip_all, fields(key_count = keys.len()))]
pub fn build_connectivity(keys: &[MortonKey], children: &mut Vec<[u32; 2]>, parents: &[AtomicU32]) {
    let n = keys.len();
    debug_assert_eq!(parents.len(), (2 * n).saturating_sub(1));
    if n == 0 {
        children.clear();
        return;
    }
    parents[0].store(INVALID, Ordering::Relaxed);

    (0..n - 1)
        .into_par_iter()
        .map(|i| {
            let kids = node_children(keys, i);
            for &c in &kids {
                parents[c as usize].store(i as u32, Ordering::Relaxed);
            }
            kids
        })
        .collect_into_vec(children);
}
