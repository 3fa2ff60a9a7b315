//! Time-window pre-partitioning.
//!
//! Splitting a time-sorted collection into bounded-span buckets collapses the
//! naive all-pairs comparison space from O(N²) to O(Σ nᵢ²) with nᵢ ≪ N.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rayon::slice::ParallelSliceMut;
use serde::Serialize;

use photosieve_core::MediaItem;

/// Collections at least this large are sorted on the rayon pool.
const PARALLEL_SORT_THRESHOLD: usize = 4_096;

/// Total capture-time order: ascending time, ties broken by id so the result
/// is deterministic for any input permutation.
fn capture_order(a: &MediaItem, b: &MediaItem) -> Ordering {
    a.captured_at
        .cmp(&b.captured_at)
        .then_with(|| a.id.cmp(&b.id))
}

fn sort_by_capture(items: &mut [MediaItem]) {
    if items.len() >= PARALLEL_SORT_THRESHOLD {
        items.par_sort_unstable_by(capture_order);
    } else {
        items.sort_unstable_by(capture_order);
    }
}

/// Partition items into contiguous buckets whose temporal span never exceeds
/// `window`.
///
/// Items are sorted ascending by `(captured_at, id)`; an item joins the
/// current bucket while its distance from the bucket's first item stays
/// within the window, otherwise it starts a new bucket. Every item lands in
/// exactly one bucket.
///
/// # Panics
/// Panics if `window` is not positive.
pub fn group_by_time(mut items: Vec<MediaItem>, window: Duration) -> Vec<Vec<MediaItem>> {
    assert!(window > Duration::zero(), "bucket window must be positive");

    if items.is_empty() {
        return Vec::new();
    }
    sort_by_capture(&mut items);

    let mut buckets = Vec::new();
    let mut current: Vec<MediaItem> = Vec::new();
    let mut bucket_start = items[0].captured_at;

    for item in items {
        if !current.is_empty() && item.captured_at - bucket_start > window {
            buckets.push(std::mem::take(&mut current));
            bucket_start = item.captured_at;
        }
        if current.is_empty() {
            bucket_start = item.captured_at;
        }
        current.push(item);
    }
    buckets.push(current);
    buckets
}

/// Partition items by the calendar day of their capture time in an explicit
/// zone. Days are `NaiveDate`s in `tz`; items within a day keep capture
/// order.
pub fn group_by_calendar_day_in<Tz: TimeZone>(
    items: &[MediaItem],
    tz: &Tz,
) -> BTreeMap<NaiveDate, Vec<MediaItem>> {
    let mut sorted: Vec<MediaItem> = items.to_vec();
    sort_by_capture(&mut sorted);

    let mut days: BTreeMap<NaiveDate, Vec<MediaItem>> = BTreeMap::new();
    for item in sorted {
        let day = item.captured_at.with_timezone(tz).date_naive();
        days.entry(day).or_default().push(item);
    }
    days
}

/// Calendar-day partition fixed to UTC. Deterministic regardless of the
/// device's ambient zone; callers that need another zone inject it via
/// [`group_by_calendar_day_in`].
pub fn group_by_calendar_day(items: &[MediaItem]) -> BTreeMap<NaiveDate, Vec<MediaItem>> {
    group_by_calendar_day_in(items, &Utc)
}

/// Shape of one partitioning run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BucketStatistics {
    pub bucket_count: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub avg_size: f64,
    /// `1 − (Σ nᵢ(nᵢ−1)/2) / (N(N−1)/2)`, guarded to 0 when N ≤ 1.
    pub comparison_reduction_rate: f64,
}

fn pair_count(n: u64) -> u64 {
    n * n.saturating_sub(1) / 2
}

/// Compute bucket shape statistics, including how much of the naive
/// all-pairs comparison space the partitioning eliminated.
pub fn bucket_statistics(buckets: &[Vec<MediaItem>]) -> BucketStatistics {
    let total: usize = buckets.iter().map(Vec::len).sum();
    let bucket_count = buckets.len();

    let naive_pairs = pair_count(total as u64);
    let comparison_reduction_rate = if naive_pairs == 0 {
        0.0
    } else {
        let bucketed_pairs: u64 = buckets.iter().map(|b| pair_count(b.len() as u64)).sum();
        1.0 - bucketed_pairs as f64 / naive_pairs as f64
    };

    BucketStatistics {
        bucket_count,
        min_size: buckets.iter().map(Vec::len).min().unwrap_or(0),
        max_size: buckets.iter().map(Vec::len).max().unwrap_or(0),
        avg_size: if bucket_count == 0 {
            0.0
        } else {
            total as f64 / bucket_count as f64
        },
        comparison_reduction_rate,
    }
}
