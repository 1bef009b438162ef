//! Top-N / other folding.
//!
//! Collapses the long tail of low-volume subjects into one aggregate series
//! so the response stays bounded while total accounting is preserved: for
//! every bucket index, the top entries plus the other entry sum to the total
//! across all subjects.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::{
    models::{RankedView, SeriesEntry},
    resample::BucketGrid,
};

/// Reserved subject id for synthesized series (the folded remainder and the
/// combined view). The nil UUID can never collide with a real v4 key id.
pub const OTHER_SUBJECT_ID: Uuid = Uuid::nil();

/// Fold per-subject series into the bounded display set.
///
/// Ranking key: total value across the whole window, descending; ties break
/// by subject id ascending for determinism. The `other` entry is always
/// present, zero-filled when the subject count is at most `n`.
pub fn rank(series: BTreeMap<Uuid, SeriesEntry>, grid: &BucketGrid, n: usize) -> RankedView {
    let mut entries: Vec<SeriesEntry> = series.into_values().collect();
    entries.sort_by(|a, b| {
        b.total()
            .cmp(&a.total())
            .then(a.subject_id.cmp(&b.subject_id))
    });

    let tail = if entries.len() > n {
        entries.split_off(n)
    } else {
        Vec::new()
    };

    let mut other = grid.zero_series(OTHER_SUBJECT_ID);
    for entry in tail {
        for (index, bucket) in entry.buckets.iter().enumerate() {
            other.buckets[index].value += bucket.value;
        }
    }

    RankedView {
        top: entries,
        other,
    }
}

/// Bucket-wise sum of every subject in the view (top plus other).
pub fn combined(view: &RankedView, grid: &BucketGrid) -> SeriesEntry {
    let mut combined = grid.zero_series(OTHER_SUBJECT_ID);
    for entry in view.top.iter().chain(std::iter::once(&view.other)) {
        for (index, bucket) in entry.buckets.iter().enumerate() {
            combined.buckets[index].value += bucket.value;
        }
    }
    combined
}
