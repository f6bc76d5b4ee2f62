//! Lazily walking a cursor-paginated feed.

use crate::error::Result;
use crate::models::{FeedPage, Gfy};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_stream::Stream;

type PageRequest = Pin<Box<dyn Future<Output = Result<FeedPage>> + Send>>;

/// How far a [`FeedStream`] has gotten through its feed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    /// Nothing requested yet; the first page is asked for with an empty cursor.
    Start,
    /// The next page continues from this cursor.
    After(String),
    /// The feed ran dry, or a request failed.
    Exhausted,
}

impl Position {
    /// Decides where to go after `page` arrived for a request of `per_request` items.
    ///
    /// The feed is over once a page comes back short, or the cursor comes back empty or
    /// identical to the one just sent. Gfycat keeps handing out the last cursor after the end.
    fn advance(&self, page: &FeedPage, per_request: usize) -> Position {
        let sent = match self {
            Position::After(cursor) => cursor.as_str(),
            _ => "",
        };
        if page.gfycats.len() < per_request || page.cursor.is_empty() || page.cursor == sent {
            Position::Exhausted
        } else {
            Position::After(page.cursor.clone())
        }
    }
}

/// Yields a feed one gfycat at a time.
///
/// `fetch` is handed the cursor to continue from and requests one page of `per_request` items.
/// A page is only requested once everything from the previous one has been yielded. The first
/// error ends the stream after it has been yielded.
pub(crate) struct FeedStream<F> {
    fetch: F,
    per_request: usize,
    position: Position,
    buffered: VecDeque<Gfy>,
    in_flight: Option<PageRequest>,
}

impl<F, Fut> FeedStream<F>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<FeedPage>> + Send + 'static,
{
    pub(crate) fn new(per_request: usize, fetch: F) -> Self {
        Self {
            fetch,
            per_request,
            position: Position::Start,
            buffered: VecDeque::new(),
            in_flight: None,
        }
    }

    fn request_next(&mut self) -> Option<PageRequest> {
        let cursor = match &self.position {
            Position::Start => String::new(),
            Position::After(cursor) => cursor.clone(),
            Position::Exhausted => return None,
        };
        Some(Box::pin((self.fetch)(cursor)))
    }
}

// `fetch` is only ever called through a shared reference, never pinned.
impl<F> Unpin for FeedStream<F> {}

impl<F, Fut> Stream for FeedStream<F>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<FeedPage>> + Send + 'static,
{
    type Item = Result<Gfy>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(gfy) = this.buffered.pop_front() {
                return Poll::Ready(Some(Ok(gfy)));
            }

            let mut request = match this.in_flight.take().or_else(|| this.request_next()) {
                Some(request) => request,
                None => return Poll::Ready(None),
            };
            match request.as_mut().poll(cx) {
                Poll::Pending => {
                    this.in_flight = Some(request);
                    return Poll::Pending;
                }
                Poll::Ready(Ok(page)) => {
                    this.position = this.position.advance(&page, this.per_request);
                    tracing::trace!(received = page.gfycats.len(), "fetched feed page");
                    this.buffered.extend(page.gfycats);
                }
                Poll::Ready(Err(e)) => {
                    this.position = Position::Exhausted;
                    return Poll::Ready(Some(Err(e)));
                }
            }
        }
    }
}
