use rayon::prelude::*;
use rescan_core::{Correspondence, Descriptor, FeatureSet};

/// Number of differing bits between two descriptors
#[inline]
pub fn hamming_distance(a: &Descriptor, b: &Descriptor) -> u32 {
    a.chunks_exact(8)
        .zip(b.chunks_exact(8))
        .map(|(x, y)| {
            let x = u64::from_le_bytes([x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7]]);
            let y = u64::from_le_bytes([y[0], y[1], y[2], y[3], y[4], y[5], y[6], y[7]]);
            (x ^ y).count_ones()
        })
        .sum()
}

/// Brute-force nearest neighbour of every source descriptor among `target`.
///
/// One match per source descriptor; equal distances resolve to the lowest
/// target index. The result is sorted by distance, then source index.
/// Either side empty gives no matches.
pub fn match_descriptors(source: &[Descriptor], target: &[Descriptor]) -> Vec<Correspondence> {
    if source.is_empty() || target.is_empty() {
        return Vec::new();
    }

    let mut matches: Vec<Correspondence> = source
        .par_iter()
        .enumerate()
        .map(|(si, sd)| {
            let mut best = Correspondence { source: si, target: 0, distance: u32::MAX };
            for (ti, td) in target.iter().enumerate() {
                let distance = hamming_distance(sd, td);
                if distance < best.distance {
                    best.target = ti;
                    best.distance = distance;
                    if distance == 0 {
                        break;
                    }
                }
            }
            best
        })
        .collect();

    matches.sort_by_key(|m| (m.distance, m.source));
    matches
}

/// Match `source` features against `target` features
pub fn match_features(source: &FeatureSet, target: &FeatureSet) -> Vec<Correspondence> {
    match_descriptors(source.descriptors(), target.descriptors())
}
