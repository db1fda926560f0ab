use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vibe_common::{Platform, RawPost, Result};

/// A configured feed the ingestion scheduler polls.
///
/// Implementations own their HTTP client and credentials; the caller owns
/// the cursor and rate limiting.
#[async_trait]
pub trait PostSource: Send + Sync {
    fn platform(&self) -> Platform;

    /// Value recorded as `source_name` on every post from this feed.
    fn source_name(&self) -> &str;

    /// Fetch up to `limit` raw items authored within `[since, until]`, newest
    /// first. Both bounds are inclusive, so items sitting on a bound come back
    /// again and are resolved by the store. Fewer than `limit` items means the
    /// window is exhausted; otherwise the caller narrows `until` to the oldest
    /// item it got and asks again.
    async fn fetch_window(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<RawPost>>;
}
