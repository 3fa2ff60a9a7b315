//! Grouping orchestrator.
//!
//! Buckets the input by time window, runs one clustering task per bucket on
//! the shared worker pool, and aggregates the groups and statistics into a
//! [`GroupingReport`]. All comparator calls for one invocation pass a single
//! [`BoundedGate`], so concurrent work is bounded regardless of how many
//! buckets the input produces.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{debug, info};

use photosieve_core::{EngineConfig, GroupingReport, MediaGroup, MediaItem, SieveError};
use photosieve_sync::{BoundedGate, LoadMonitor, SharedCell};

use crate::bucket;
use crate::cluster::cluster_bucket;
use crate::comparator::SimilarityComparator;

/// Partitions a media collection into near-duplicate groups.
///
/// Configuration is validated at construction and immutable afterwards; a
/// bad threshold or window can never fail a call midway. An optional
/// [`LoadMonitor`] derates the comparison width under memory pressure.
pub struct GroupingEngine {
    config: EngineConfig,
    comparator: Arc<dyn SimilarityComparator>,
    monitor: Option<Arc<LoadMonitor>>,
}

impl GroupingEngine {
    pub fn new(
        config: EngineConfig,
        comparator: Arc<dyn SimilarityComparator>,
    ) -> Result<Self, SieveError> {
        config.validate()?;
        Ok(Self {
            config,
            comparator,
            monitor: None,
        })
    }

    /// Attach an advisory memory monitor. The gate width becomes
    /// `monitor.recommended_parallelism(configured base)` per invocation.
    pub fn with_monitor(mut self, monitor: Arc<LoadMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Group the supplied items into clusters of near-duplicates.
    ///
    /// One clustering task per bucket runs on the worker pool; the first
    /// failure (comparator error or cancellation) aborts every sibling and
    /// fails the call — a partial report is never returned. Cross-bucket
    /// group order is unspecified.
    pub async fn group_items(
        &self,
        items: Vec<MediaItem>,
    ) -> Result<GroupingReport, SieveError> {
        let start = Instant::now();
        let total_items = items.len();

        let buckets = bucket::group_by_time(items, self.config.time_window());
        let stats = bucket::bucket_statistics(&buckets);

        let base = self.config.resolved_parallelism();
        let width = match &self.monitor {
            Some(monitor) => monitor.recommended_parallelism(base),
            None => base,
        }
        .max(1);
        debug!(
            items = total_items,
            buckets = stats.bucket_count,
            width,
            "starting bucket clustering"
        );

        let gate = BoundedGate::new(width);
        let comparisons = SharedCell::new(0u64);

        let mut tasks: JoinSet<Result<Vec<MediaGroup>, SieveError>> = JoinSet::new();
        for bucket_items in buckets {
            tasks.spawn(cluster_bucket(
                bucket_items,
                self.config.similarity_threshold,
                Arc::clone(&self.comparator),
                gate.clone(),
                comparisons.clone(),
            ));
        }

        let mut groups = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(bucket_groups)) => groups.extend(bucket_groups),
                Ok(Err(err)) => {
                    Self::drain_aborted(&mut tasks).await;
                    return Err(err);
                }
                Err(join_err) => {
                    Self::drain_aborted(&mut tasks).await;
                    return Err(if join_err.is_cancelled() {
                        SieveError::Cancelled
                    } else {
                        SieveError::TaskFailed(join_err.to_string())
                    });
                }
            }
        }

        let report = GroupingReport {
            groups,
            total_items,
            bucket_count: stats.bucket_count,
            min_bucket_size: stats.min_size,
            max_bucket_size: stats.max_size,
            avg_bucket_size: stats.avg_size,
            comparison_reduction_rate: stats.comparison_reduction_rate,
            comparisons_performed: comparisons.get().await,
            duration_seconds: start.elapsed().as_secs_f64(),
        };

        info!(
            items = report.total_items,
            groups = report.groups.len(),
            buckets = report.bucket_count,
            comparisons = report.comparisons_performed,
            elapsed_ms = (report.duration_seconds * 1000.0) as u64,
            "grouping completed"
        );
        Ok(report)
    }

    /// First failure wins: cancel every sibling and wait the aborts out so no
    /// clustering task outlives the call.
    async fn drain_aborted(tasks: &mut JoinSet<Result<Vec<MediaGroup>, SieveError>>) {
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }
}
