use inkwell_common::{model::post::Post, pagination::Page};
use moka::future::Cache;
use std::time::Duration;

pub const DEFAULT_INDEX_CACHE_TTL: Duration = Duration::from_secs(20);

/// Whole pages of the front page feed, keyed by the raw `page` query value.
///
/// Entries are never invalidated; a page changes at the latest once its entry expires.
#[derive(Clone, Debug)]
pub struct IndexCache {
    pages: Cache<Option<String>, Page<Post>>,
}

impl IndexCache {
    #[must_use]
    pub fn new(time_to_live: Duration) -> Self {
        let pages = Cache::builder()
            .max_capacity(1_000)
            .time_to_live(time_to_live)
            .build();

        Self { pages }
    }

    pub async fn get(&self, page: &Option<String>) -> Option<Page<Post>> {
        self.pages.get(page).await
    }

    pub async fn insert(&self, page: Option<String>, feed: Page<Post>) {
        self.pages.insert(page, feed).await;
    }
}

impl Default for IndexCache {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_CACHE_TTL)
    }
}
