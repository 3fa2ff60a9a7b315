use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique media item identifier.
pub type MediaId = Uuid;

/// Broad media category. The engine treats photos and videos identically;
/// the kind rides along for callers and comparators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Photo,
    Video,
}

/// Metadata for one on-device media asset.
///
/// Items are supplied fresh per grouping call and never retained by the
/// engine across calls. `features` is an opaque payload consumed only by the
/// injected similarity comparator — the engine itself reads `id` and
/// `captured_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: MediaId,
    pub captured_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub kind: MediaKind,
    #[serde(default)]
    pub features: Bytes,
}

impl MediaItem {
    /// Convenience constructor for a photo with an empty feature payload.
    pub fn new(id: MediaId, captured_at: DateTime<Utc>, size_bytes: u64) -> Self {
        Self {
            id,
            captured_at,
            size_bytes,
            kind: MediaKind::Photo,
            features: Bytes::new(),
        }
    }

    /// Attach a comparator feature payload.
    pub fn with_features(mut self, features: impl Into<Bytes>) -> Self {
        self.features = features.into();
        self
    }
}
