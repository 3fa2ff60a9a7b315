use serde::{Deserialize, Serialize};

use crate::media::MediaId;

/// One cluster of related media items.
///
/// Membership is star-shaped: every id in `similar` scored at or above the
/// engine threshold against `representative`. Two non-representative members
/// need not be mutually similar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaGroup {
    /// Anchor item all candidates were compared against.
    pub representative: MediaId,
    /// Items judged similar to the representative (the representative itself
    /// is not listed here).
    pub similar: Vec<MediaId>,
}

impl MediaGroup {
    pub fn singleton(representative: MediaId) -> Self {
        Self {
            representative,
            similar: Vec::new(),
        }
    }

    /// Total number of items in the group, representative included.
    pub fn len(&self) -> usize {
        1 + self.similar.len()
    }

    /// Groups always contain at least the representative.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// All ids in the group, representative first.
    pub fn ids(&self) -> impl Iterator<Item = MediaId> + '_ {
        std::iter::once(self.representative).chain(self.similar.iter().copied())
    }
}

/// Result of one `group_items` invocation. Built once, immutable, and
/// discarded by the caller after use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingReport {
    /// All clusters across all buckets. Cross-bucket order is unspecified.
    pub groups: Vec<MediaGroup>,
    pub total_items: usize,
    pub bucket_count: usize,
    pub min_bucket_size: usize,
    pub max_bucket_size: usize,
    pub avg_bucket_size: f64,
    /// Fraction of the naive all-pairs comparison space eliminated by
    /// bucketing, in [0, 1].
    pub comparison_reduction_rate: f64,
    /// Comparator invocations actually performed.
    pub comparisons_performed: u64,
    pub duration_seconds: f64,
}

impl GroupingReport {
    /// Human-readable one-line summary for logs. Not machine-consumed.
    pub fn summary(&self) -> String {
        format!(
            "{} items -> {} groups across {} buckets (sizes {}..{}, avg {:.1}); \
             {} comparisons, {:.1}% of pair space pruned, {:.2}s",
            self.total_items,
            self.groups.len(),
            self.bucket_count,
            self.min_bucket_size,
            self.max_bucket_size,
            self.avg_bucket_size,
            self.comparisons_performed,
            self.comparison_reduction_rate * 100.0,
            self.duration_seconds,
        )
    }
}
