//! The guide lookup seam.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

use crate::error::Result;
use crate::types::{CandidateProgram, TitleMetadata};

/// A remote program guide.
///
/// Implementations make one request per call; retrying is left to callers.
#[async_trait]
pub trait GuideService: Send + Sync {
    /// Programs airing between `start` and `end`, on any channel.
    async fn find_programs(
        &self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Result<Vec<CandidateProgram>>;

    /// Full series metadata for a title id.
    async fn get_full_title(&self, title_id: u32) -> Result<TitleMetadata>;
}
