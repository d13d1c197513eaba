//! Radio refills.
//!
//! While radio is on, a session that runs out of tracks asks its
//! [`RadioSource`] for another batch instead of going quiet.

use std::sync::Arc;

use async_trait::async_trait;

use crate::model::{MediaInfo, TenantId, Track, TrackOrigin, UserId};
use crate::recommend::RecommendationEngine;

/// Supplies radio batches.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait RadioSource: Send + Sync {
    /// Up to `size` tracks for `user`, requested in their name. Empty when
    /// nothing suitable was found.
    async fn refill(
        &self,
        user: UserId,
        tenant: TenantId,
        seed: Option<Track>,
        size: usize,
    ) -> Vec<Track>;
}

/// Convert resolver records to tracks, dropping records without a title
/// or locator.
pub fn to_tracks(media: &[MediaInfo], user: UserId) -> Vec<Track> {
    media
        .iter()
        .filter_map(|info| match Track::from_media(info, user, TrackOrigin::Youtube) {
            Ok(track) => Some(track),
            Err(e) => {
                tracing::debug!(target: "recommend", error = %e, "Dropping unusable result");
                None
            }
        })
        .collect()
}

/// Radio backed by the recommendation engine. Artists the user keeps
/// skipping or disliking are left out.
pub struct RadioGenerator {
    engine: Arc<RecommendationEngine>,
}

impl RadioGenerator {
    pub fn new(engine: Arc<RecommendationEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl RadioSource for RadioGenerator {
    async fn refill(
        &self,
        user: UserId,
        tenant: TenantId,
        seed: Option<Track>,
        size: usize,
    ) -> Vec<Track> {
        let media = self.engine.radio_queue(user, tenant, seed.as_ref(), size).await;

        let mut tracks = Vec::with_capacity(media.len());
        for track in to_tracks(&media, user) {
            if self.engine.should_avoid_artist(user, tenant, track.uploader()).await {
                tracing::debug!(target: "recommend", artist = track.uploader(), "Avoiding artist");
                continue;
            }
            tracks.push(track);
        }
        tracing::info!(target: "recommend", %tenant, %user, count = tracks.len(), "Radio batch ready");
        tracks
    }
}
