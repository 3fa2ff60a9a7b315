//! Similarity-based media grouping.
//!
//! Partitions large media collections into clusters of near-duplicates:
//! time-window bucketing shrinks the comparison space, bounded-concurrency
//! star clustering handles each bucket, and an optional memory monitor
//! derates the comparison width under pressure.

pub mod bucket;
pub mod cluster;
pub mod comparator;
pub mod engine;

pub use bucket::{
    bucket_statistics, group_by_calendar_day, group_by_calendar_day_in, group_by_time,
    BucketStatistics,
};
pub use cluster::cluster_bucket;
pub use comparator::SimilarityComparator;
pub use engine::GroupingEngine;
