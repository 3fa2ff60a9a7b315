use async_trait::async_trait;

use photosieve_core::MediaItem;

/// Injected capability scoring how close two media items are.
///
/// Scores lie in [0, 1]; 1 means near-identical. Implementations may suspend
/// (hashing, model inference, I/O) and must be safe to call concurrently —
/// the engine fans comparisons out across a worker pool. The engine never
/// interprets `MediaItem::features` itself; only implementations of this
/// trait do.
#[async_trait]
pub trait SimilarityComparator: Send + Sync {
    async fn compare(&self, a: &MediaItem, b: &MediaItem) -> anyhow::Result<f64>;
}
