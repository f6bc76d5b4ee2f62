//! Paginated feed retrieval.

use crate::client::Client;
use crate::error::{Error, Result};
use crate::models::{FeedPage, Gfy, SortBy};
use crate::paged::FeedStream;
use crate::route::Route;
use crate::session::Call;
use crate::transport::Transport;
use http::Method;
use std::fmt;
use tokio_stream::Stream;
use tracing::instrument;

/// Smallest page [`Client::feed_stream`] will ask for.
pub const MIN_STREAM_PAGE_SIZE: usize = 20;

/// How many items a feed request should collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// At least this many, rounded up to a whole number of pages.
    Items(usize),
    /// Everything the feed has.
    All,
}

impl Default for Limit {
    fn default() -> Self {
        Limit::Items(100)
    }
}

/// Negative values mean [`Limit::All`].
impl From<i64> for Limit {
    fn from(n: i64) -> Self {
        usize::try_from(n).map_or(Limit::All, Limit::Items)
    }
}

/// Post-processing applied to a fetched feed: how much to fetch, which items to keep, and how
/// to order them.
///
/// ```rust
/// use gfycat::{FeedQuery, SortBy};
///
/// let query = FeedQuery::new()
///     .limit(250)
///     .sort_by(SortBy::Views)
///     .filter(|gfy| !gfy.is_pending_review());
/// ```
pub struct FeedQuery {
    limit: Limit,
    sort_by: Option<SortBy>,
    descending: bool,
    filter: Option<Box<dyn Fn(&Gfy) -> bool + Send + Sync>>,
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self {
            limit: Limit::default(),
            sort_by: None,
            descending: true,
            filter: None,
        }
    }
}

impl fmt::Debug for FeedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedQuery")
            .field("limit", &self.limit)
            .field("sort_by", &self.sort_by)
            .field("descending", &self.descending)
            .field("filter", &self.filter.as_ref().map(|_| ".."))
            .finish()
    }
}

impl FeedQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many items to fetch. A negative limit fetches the whole feed.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Limit::from(limit);
        self
    }

    /// Fetches the whole feed.
    pub fn unbounded(mut self) -> Self {
        self.limit = Limit::All;
        self
    }

    /// Sorts the result by `field`, largest first unless [`FeedQuery::ascending`] is set.
    pub fn sort_by(mut self, field: SortBy) -> Self {
        self.sort_by = Some(field);
        self
    }

    pub fn ascending(mut self) -> Self {
        self.descending = false;
        self
    }

    /// Keeps only items for which `predicate` returns true.
    pub fn filter(mut self, predicate: impl Fn(&Gfy) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn apply(&self, mut items: Vec<Gfy>) -> Vec<Gfy> {
        if let Some(keep) = &self.filter {
            items.retain(|gfy| keep(gfy));
        }
        if let Some(field) = self.sort_by {
            // Stable, so equal items keep their feed order either way.
            if self.descending {
                items.sort_by(|a, b| field.compare(b, a));
            } else {
                items.sort_by(|a, b| field.compare(a, b));
            }
        }
        items
    }
}

/// Works out how many items a bounded feed walk should collect.
///
/// Gfycat hands out whole pages, so a limit that is not a multiple of `page_size` is rounded up
/// (and a warning logged) rather than cutting the last page short on the wire.
///
/// # Returns
///
/// The rounded count, or `None` for [`Limit::All`].
fn target_count(limit: Limit, page_size: usize) -> Option<usize> {
    match limit {
        Limit::All => None,
        Limit::Items(requested) => {
            let rounded = requested.div_ceil(page_size) * page_size;
            if rounded != requested {
                tracing::warn!(
                    requested,
                    rounded,
                    page_size,
                    "feed limit is not a multiple of the page size, rounding up"
                );
            }
            Some(rounded)
        }
    }
}

impl<T: Transport> Client<T> {
    fn feed_route(&self, user_id: Option<&str>) -> Route {
        match user_id {
            None => self.route(Method::GET, &["me", "gfycats"]),
            Some(id) => self.route(Method::GET, &["users", id, "gfycats"]),
        }
    }

    /// Collects a user's gfycats, or the authenticated user's when `user_id` is `None`.
    ///
    /// Pages are fetched until the (rounded) limit is reached or the feed runs dry: an empty or
    /// repeated cursor, or a page without items, ends the walk. Filtering and sorting from
    /// `query` are applied to the collected items afterwards, so a filtered result can be
    /// shorter than the limit.
    #[instrument(skip(self))]
    pub async fn get_feed(&self, user_id: Option<&str>, query: FeedQuery) -> Result<Vec<Gfy>> {
        let page_size = self.inner.page_size;
        let target = target_count(query.limit, page_size);
        let route = self.feed_route(user_id);

        let mut items: Vec<Gfy> = Vec::new();
        let mut cursor = String::new();
        while target.is_none_or(|target| items.len() < target) {
            let call = Call::new(route.clone())
                .query("count", page_size)
                .query("cursor", &cursor);
            let page: FeedPage = self.session().request_json(&call).await?;

            let received = page.gfycats.len();
            items.extend(page.gfycats);
            tracing::trace!(received, total = items.len(), "fetched feed page");

            if received == 0 || page.cursor.is_empty() || page.cursor == cursor {
                tracing::debug!(total = items.len(), "no more feed entries");
                break;
            }
            cursor = page.cursor;
        }

        if let Some(target) = target {
            items.truncate(target);
        }
        Ok(query.apply(items))
    }

    /// [`Client::get_feed`] for the authenticated user.
    pub async fn get_own_feed(&self, query: FeedQuery) -> Result<Vec<Gfy>> {
        self.get_feed(None, query).await
    }

    /// Streams a feed item by item, requesting `per_request` items at a time.
    ///
    /// Pages are only requested once the previous one has been consumed. The stream ends after
    /// a short page, or when the cursor comes back empty or unchanged.
    pub fn feed_stream(
        &self,
        user_id: Option<&str>,
        per_request: usize,
    ) -> Result<impl Stream<Item = Result<Gfy>> + Send + use<T>> {
        if !(MIN_STREAM_PAGE_SIZE..=crate::config::MAX_PAGE_SIZE).contains(&per_request) {
            return Err(Error::InvalidPageSize {
                requested: per_request,
                min: MIN_STREAM_PAGE_SIZE,
                max: crate::config::MAX_PAGE_SIZE,
            });
        }

        let client = self.clone();
        let route = self.feed_route(user_id);
        Ok(FeedStream::new(per_request, move |cursor: String| {
            let client = client.clone();
            let call = Call::new(route.clone())
                .query("count", per_request)
                .query("cursor", cursor);
            async move { client.session().request_json::<FeedPage>(&call).await }
        }))
    }
}
