//! Intra-bucket greedy star clustering.
//!
//! Membership depends only on similarity to the cluster's representative:
//! the first remaining item (in bucket order) anchors a cluster, every other
//! remaining item is compared against it concurrently, and the ones at or
//! above the threshold join and leave the pool. Two non-representative
//! members need not be mutually similar — this is star clustering, not
//! single-linkage, so no candidate-vs-candidate comparison ever runs.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::warn;

use photosieve_core::{MediaGroup, MediaItem, SieveError};
use photosieve_sync::{BoundedGate, SharedCell};

use crate::comparator::SimilarityComparator;

/// Cluster one bucket. Worst-case quadratic in the bucket size, which the
/// time-window partitioning keeps small.
///
/// Representative selection is FIFO over the remaining items, so the result
/// is deterministic no matter in which order the gated comparisons complete.
/// The first comparator failure aborts the whole bucket.
pub async fn cluster_bucket(
    bucket: Vec<MediaItem>,
    threshold: f64,
    comparator: Arc<dyn SimilarityComparator>,
    gate: BoundedGate,
    comparisons: SharedCell<u64>,
) -> Result<Vec<MediaGroup>, SieveError> {
    let mut remaining: VecDeque<MediaItem> = bucket.into();
    let mut groups = Vec::new();

    while let Some(representative) = remaining.pop_front() {
        if remaining.is_empty() {
            groups.push(MediaGroup::singleton(representative.id));
            continue;
        }

        let scores = {
            let rep = &representative;
            let pending = remaining.iter().map(|candidate| {
                let gate = &gate;
                let comparator = &comparator;
                async move {
                    let _permit = gate.acquire().await;
                    let score = comparator.compare(rep, candidate).await.map_err(|source| {
                        SieveError::Comparator {
                            a: rep.id,
                            b: candidate.id,
                            source,
                        }
                    })?;
                    checked_score(score, rep, candidate)
                }
            });
            try_join_all(pending).await?
        };

        comparisons.with(|count| *count += scores.len() as u64).await;

        let mut similar = Vec::new();
        let mut leftovers = VecDeque::with_capacity(remaining.len());
        for (candidate, score) in remaining.drain(..).zip(scores) {
            if score >= threshold {
                similar.push(candidate.id);
            } else {
                leftovers.push_back(candidate);
            }
        }
        remaining = leftovers;

        groups.push(MediaGroup {
            representative: representative.id,
            similar,
        });
    }

    Ok(groups)
}

/// Comparator output is trusted to lie in [0, 1]: a non-finite score is a
/// comparator failure, a finite out-of-range score is clamped.
fn checked_score(score: f64, a: &MediaItem, b: &MediaItem) -> Result<f64, SieveError> {
    if !score.is_finite() {
        return Err(SieveError::Comparator {
            a: a.id,
            b: b.id,
            source: anyhow::anyhow!("non-finite similarity score: {score}"),
        });
    }
    if !(0.0..=1.0).contains(&score) {
        warn!(score, a = %a.id, b = %b.id, "similarity score outside [0, 1], clamping");
        return Ok(score.clamp(0.0, 1.0));
    }
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use photosieve_core::MediaId;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn item(n: u128) -> MediaItem {
        MediaItem::new(Uuid::from_u128(n), Utc::now(), 1024)
    }

    fn id(n: u128) -> MediaId {
        Uuid::from_u128(n)
    }

    /// Returns hand-picked scores per unordered pair; 0.0 when unscripted.
    struct ScriptedComparator {
        scores: HashMap<(MediaId, MediaId), f64>,
    }

    impl ScriptedComparator {
        fn new(pairs: &[(u128, u128, f64)]) -> Self {
            let mut scores = HashMap::new();
            for &(a, b, score) in pairs {
                scores.insert((id(a), id(b)), score);
                scores.insert((id(b), id(a)), score);
            }
            Self { scores }
        }
    }

    #[async_trait]
    impl SimilarityComparator for ScriptedComparator {
        async fn compare(&self, a: &MediaItem, b: &MediaItem) -> anyhow::Result<f64> {
            Ok(self.scores.get(&(a.id, b.id)).copied().unwrap_or(0.0))
        }
    }

    struct FailingComparator;

    #[async_trait]
    impl SimilarityComparator for FailingComparator {
        async fn compare(&self, _: &MediaItem, _: &MediaItem) -> anyhow::Result<f64> {
            anyhow::bail!("feature decode failed")
        }
    }

    async fn run(
        bucket: Vec<MediaItem>,
        threshold: f64,
        comparator: impl SimilarityComparator + 'static,
    ) -> Result<Vec<MediaGroup>, SieveError> {
        cluster_bucket(
            bucket,
            threshold,
            Arc::new(comparator),
            BoundedGate::new(4),
            SharedCell::new(0),
        )
        .await
    }

    #[tokio::test]
    async fn empty_bucket_yields_no_groups() {
        let groups = run(Vec::new(), 0.85, ScriptedComparator::new(&[]))
            .await
            .unwrap();
        assert!(groups.is_empty());
    }

    #[tokio::test]
    async fn singleton_bucket_yields_singleton_group() {
        let groups = run(vec![item(1)], 0.85, ScriptedComparator::new(&[]))
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].representative, id(1));
        assert!(groups[0].similar.is_empty());
    }

    #[tokio::test]
    async fn star_clusters_do_not_merge_transitively() {
        // item0 ~ {1, 2}, item3 ~ {4}; 1 and 2 are mutually dissimilar,
        // which must not matter.
        let comparator = ScriptedComparator::new(&[
            (0, 1, 0.92),
            (0, 2, 0.88),
            (0, 3, 0.10),
            (0, 4, 0.12),
            (1, 2, 0.05),
            (3, 4, 0.95),
        ]);
        let bucket = (0..5).map(item).collect();

        let groups = run(bucket, 0.85, comparator).await.unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].representative, id(0));
        assert_eq!(groups[0].similar, vec![id(1), id(2)]);
        assert_eq!(groups[1].representative, id(3));
        assert_eq!(groups[1].similar, vec![id(4)]);
    }

    #[tokio::test]
    async fn threshold_is_inclusive() {
        let comparator = ScriptedComparator::new(&[(1, 2, 0.85)]);
        let groups = run(vec![item(1), item(2)], 0.85, comparator)
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].similar, vec![id(2)]);
    }

    #[tokio::test]
    async fn out_of_range_scores_are_clamped() {
        let comparator = ScriptedComparator::new(&[(1, 2, 1.5), (1, 3, -0.2)]);
        let groups = run(vec![item(1), item(2), item(3)], 0.85, comparator)
            .await
            .unwrap();
        // 1.5 clamps to 1.0 (joins), -0.2 clamps to 0.0 (does not).
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].similar, vec![id(2)]);
        assert_eq!(groups[1].representative, id(3));
    }

    #[tokio::test]
    async fn non_finite_score_fails_the_bucket() {
        let comparator = ScriptedComparator::new(&[(1, 2, f64::NAN)]);
        let result = run(vec![item(1), item(2)], 0.85, comparator).await;
        assert!(matches!(result, Err(SieveError::Comparator { .. })));
    }

    #[tokio::test]
    async fn comparator_failure_aborts_and_releases_the_gate() {
        let gate = BoundedGate::new(2);
        let result = cluster_bucket(
            (0..6).map(item).collect(),
            0.85,
            Arc::new(FailingComparator),
            gate.clone(),
            SharedCell::new(0),
        )
        .await;

        assert!(matches!(result, Err(SieveError::Comparator { .. })));
        assert_eq!(gate.active(), 0);
        assert_eq!(gate.waiting(), 0);
    }

    #[tokio::test]
    async fn comparison_count_accumulates() {
        // 4 mutually dissimilar items: 3 + 2 + 1 comparisons.
        let counter = SharedCell::new(0u64);
        let groups = cluster_bucket(
            (0..4).map(item).collect(),
            0.85,
            Arc::new(ScriptedComparator::new(&[])),
            BoundedGate::new(4),
            counter.clone(),
        )
        .await
        .unwrap();

        assert_eq!(groups.len(), 4);
        assert_eq!(counter.get().await, 6);
    }
}
