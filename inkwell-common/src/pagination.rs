//! Page-number pagination for feeds.
//!
//! A [`Paginator`] resolves the requested page against the number of items in a feed and
//! yields a [`PageWindow`] describing which slice to load. The slice itself is fetched by
//! the storage layer and wrapped into a [`Page`].

use serde::{Deserialize, Serialize};
use std::num::{IntErrorKind, NonZeroU64};

/// How many posts every feed shows per page.
pub const POSTS_PER_PAGE: NonZeroU64 = NonZeroU64::new(10).unwrap();

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct Paginator {
    per_page: NonZeroU64,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(POSTS_PER_PAGE)
    }
}

/// The resolved position of one page within a collection of `count` items.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct PageWindow {
    pub number: u64,
    pub num_pages: u64,
    pub count: u64,
    pub per_page: u64,
}

impl Paginator {
    #[must_use]
    pub fn new(per_page: NonZeroU64) -> Self {
        Self { per_page }
    }

    #[must_use]
    pub fn per_page(self) -> NonZeroU64 {
        self.per_page
    }

    /// Number of pages needed for `count` items. An empty collection still has one page.
    #[must_use]
    pub fn num_pages(self, count: u64) -> u64 {
        count.div_ceil(self.per_page.get()).max(1)
    }

    /// Picks the page to show for the raw `page` query value.
    ///
    /// Anything that is not an integer shows the first page; integers outside the valid
    /// range, however large, are clamped to the nearest existing page.
    #[must_use]
    pub fn window(self, count: u64, requested: Option<&str>) -> PageWindow {
        let num_pages = self.num_pages(count);
        let number = match requested.map(|page| page.trim().parse::<i64>()) {
            Some(Ok(page)) => u64::try_from(page).unwrap_or(0).clamp(1, num_pages),
            Some(Err(err)) if *err.kind() == IntErrorKind::PosOverflow => num_pages,
            Some(Err(_)) | None => 1,
        };

        PageWindow {
            number,
            num_pages,
            count,
            per_page: self.per_page.get(),
        }
    }
}

impl PageWindow {
    #[must_use]
    pub fn offset(self) -> u64 {
        (self.number - 1) * self.per_page
    }

    #[must_use]
    pub fn limit(self) -> u64 {
        self.per_page
    }

    /// How many items actually land on this page.
    #[must_use]
    pub fn len(self) -> u64 {
        self.count.saturating_sub(self.offset()).min(self.per_page)
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn has_next(self) -> bool {
        self.number < self.num_pages
    }

    #[must_use]
    pub fn has_previous(self) -> bool {
        self.number > 1
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u64,
    pub num_pages: u64,
    pub count: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(window: PageWindow, items: Vec<T>) -> Self {
        Self {
            items,
            number: window.number,
            num_pages: window.num_pages,
            count: window.count,
            has_next: window.has_next(),
            has_previous: window.has_previous(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
