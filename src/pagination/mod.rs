//! Page iteration over list endpoints.
//!
//! Two cursor disciplines are supported: numeric offsets, used by the
//! metadata and global listing endpoints, and opaque page tokens, used by
//! record queries. Either way the iterator is driven by a fetch function that
//! maps a [`PageCursor`] to one [`Page`].

use crate::errors::ApaasResult;
use crate::types::{ListPayload, Record};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, trace};

/// Page size used when the caller passes zero.
pub const DEFAULT_PAGE_SIZE: u64 = 100;

/// Position of the next page to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// Number of items to skip.
    Offset(u64),
    /// Opaque token from the previous page; empty for the first page.
    Token(String),
}

impl PageCursor {
    /// The offset, for offset cursors.
    pub fn offset(&self) -> Option<u64> {
        match self {
            PageCursor::Offset(offset) => Some(*offset),
            PageCursor::Token(_) => None,
        }
    }

    /// The page token, for token cursors.
    pub fn token(&self) -> Option<&str> {
        match self {
            PageCursor::Offset(_) => None,
            PageCursor::Token(token) => Some(token),
        }
    }
}

/// One page of results.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Total reported by the server, zero if unknown.
    pub total: u64,
    /// Token of the following page, if any.
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    /// Creates a page without a continuation token.
    pub fn new(items: Vec<T>, total: u64) -> Self {
        Self {
            items,
            total,
            next_page_token: None,
        }
    }

    /// Sets the continuation token.
    pub fn with_next_page_token(mut self, token: impl Into<String>) -> Self {
        self.next_page_token = Some(token.into());
        self
    }

    /// Number of items on this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the page holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn continuation(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|token| !token.is_empty())
    }
}

impl<T> From<ListPayload<T>> for Page<T> {
    fn from(payload: ListPayload<T>) -> Self {
        Self {
            items: payload.items,
            total: payload.total,
            next_page_token: payload.next_page_token,
        }
    }
}

/// Everything collected by [`PageIterator::collect_all`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAccumulator<T> {
    /// First non-zero total reported by the server.
    pub total: u64,
    /// Items of every page, in order.
    pub items: Vec<T>,
}

impl<T> Default for PageAccumulator<T> {
    fn default() -> Self {
        Self {
            total: 0,
            items: Vec::new(),
        }
    }
}

/// Result of the iterator-style record listings.
pub type RecordsIteratorResult = PageAccumulator<Record>;

#[derive(Debug, Clone, Copy)]
enum Discipline {
    Offset { page_size: u64 },
    Token,
}

/// Drives a fetch function across pages until the listing is exhausted.
///
/// Any fetch error ends the iteration and is handed to the caller; items of
/// earlier pages are not returned with it.
pub struct PageIterator<T, F> {
    fetch: F,
    discipline: Discipline,
    cursor: PageCursor,
    fetched: u64,
    total: u64,
    pages: u32,
    done: bool,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T, F, Fut> PageIterator<T, F>
where
    F: FnMut(PageCursor) -> Fut,
    Fut: Future<Output = ApaasResult<Page<T>>>,
{
    /// Iterates by offset, `page_size` items at a time (zero means [`DEFAULT_PAGE_SIZE`]).
    pub fn offset(page_size: u64, fetch: F) -> Self {
        let page_size = if page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size
        };
        Self::with_discipline(Discipline::Offset { page_size }, PageCursor::Offset(0), fetch)
    }

    /// Iterates by page token, starting from an empty token.
    pub fn token(fetch: F) -> Self {
        Self::with_discipline(Discipline::Token, PageCursor::Token(String::new()), fetch)
    }

    fn with_discipline(discipline: Discipline, cursor: PageCursor, fetch: F) -> Self {
        Self {
            fetch,
            discipline,
            cursor,
            fetched: 0,
            total: 0,
            pages: 0,
            done: false,
            _marker: std::marker::PhantomData,
        }
    }

    /// Total fixed from the first page that reported one.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Returns true once no further page will be fetched.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Fetches the next page, or `None` when the listing is exhausted.
    pub async fn next_page(&mut self) -> ApaasResult<Option<Page<T>>> {
        if self.done {
            return Ok(None);
        }

        trace!(cursor = ?self.cursor, page = self.pages + 1, "fetching page");
        let page = match (self.fetch)(self.cursor.clone()).await {
            Ok(page) => page,
            Err(err) => {
                self.done = true;
                debug!(page = self.pages + 1, error = %err, "page fetch failed, stopping");
                return Err(err);
            }
        };

        self.pages += 1;
        if self.total == 0 && page.total > 0 {
            self.total = page.total;
        }
        self.fetched += page.items.len() as u64;

        match self.discipline {
            Discipline::Offset { page_size } => {
                let offset = self.cursor.offset().unwrap_or_default();
                self.cursor = PageCursor::Offset(offset + page_size);
                if self.fetched >= self.total || page.is_empty() {
                    self.done = true;
                }
            }
            Discipline::Token => match page.continuation() {
                Some(token) => self.cursor = PageCursor::Token(token.to_string()),
                None => self.done = true,
            },
        }

        debug!(
            page = self.pages,
            items = page.len(),
            fetched = self.fetched,
            total = self.total,
            "fetched page"
        );
        Ok(Some(page))
    }

    /// Fetches every remaining page and concatenates the items.
    pub async fn collect_all(mut self) -> ApaasResult<PageAccumulator<T>> {
        let mut acc = PageAccumulator::default();
        while let Some(page) = self.next_page().await? {
            acc.items.extend(page.items);
        }
        acc.total = self.total;
        Ok(acc)
    }

    /// Turns the iterator into a stream of pages; the stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = ApaasResult<Page<T>>> {
        futures::stream::unfold(Some(self), |state| async move {
            let mut iter = state?;
            match iter.next_page().await {
                Ok(Some(page)) => Some((Ok(page), Some(iter))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }
}
