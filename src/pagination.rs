//! Lazy, cursor-chained pagination over record pages.
//!
//! [`RecordStream`] yields records in server page order (document order
//! within a page) across however many pages exist. The cursor chain is
//! strict — page N's cursor is discoverable only after parsing page N — so
//! one stream never parallelizes internally; independent record kinds run
//! over independent streams.
//!
//! Each page fetch/extract is retried with bounded exponential backoff
//! before a terminal [`PipelineError`] surfaces; the error carries the last
//! successfully completed cursor so a caller can resume instead of
//! restarting from page one. Session and authentication failures are never
//! blind-retried here.

use std::collections::VecDeque;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use crate::config::ScrapeConfig;
use crate::extract::{
    ExtractError, Extraction, Order, RecordKind, Transaction, extract_orders,
    extract_transactions,
};
use crate::fetch::{FetchError, PageFetcher};
use crate::retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
use crate::transport::HtmlPage;

/// Opaque pagination token: where the next page of results comes from.
///
/// Created at pipeline start, advanced after each successful page parse,
/// terminal when the extractor reports no further pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor(CursorRepr);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum CursorRepr {
    /// Zero-based record offset into the listing.
    StartIndex(u32),
    /// Explicit next-page URL lifted from a pagination control.
    NextUrl(String),
}

impl PageCursor {
    /// The cursor for the first page of a listing.
    #[must_use]
    pub fn start() -> Self {
        Self(CursorRepr::StartIndex(0))
    }

    pub(crate) fn next_url(url: impl Into<String>) -> Self {
        Self(CursorRepr::NextUrl(url.into()))
    }

    /// Builds the fetch target for this cursor.
    fn target(&self, kind: RecordKind, config: &ScrapeConfig, filters: &HistoryFilters) -> String {
        match &self.0 {
            CursorRepr::NextUrl(url) => url.clone(),
            CursorRepr::StartIndex(index) => match kind {
                RecordKind::Orders => {
                    let mut target = format!("{}?", config.order_history_path);
                    if let Some(year) = filters.year {
                        target.push_str(&format!("timeFilter=year-{year}&"));
                    }
                    target.push_str(&format!("startIndex={index}"));
                    target
                }
                RecordKind::Transactions => config.transactions_path.clone(),
            },
        }
    }
}

/// Stop conditions and scoping for one record stream.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilters {
    /// Restrict the listing to one calendar year (server-side filter).
    pub year: Option<i32>,
    /// Stop once a record older than this date appears; listings are
    /// newest-first, so everything after it is older still.
    pub placed_after: Option<NaiveDate>,
    /// Hard page ceiling regardless of cursors.
    pub max_pages: Option<u32>,
}

/// What finally stopped a stream, with the resume point.
#[derive(Debug, Error)]
#[error("record stream failed after {} page(s): {source}", .pages_completed)]
pub struct PipelineError {
    /// Cursor of the last page that fetched and extracted successfully.
    /// Resume from here rather than restarting from page one.
    pub last_cursor: Option<PageCursor>,
    /// Pages completed before the failure.
    pub pages_completed: u32,
    /// The terminal failure.
    #[source]
    pub source: PageFailure,
}

/// Terminal failure of one page after its retry budget.
#[derive(Debug, Error)]
pub enum PageFailure {
    /// Fetching the page failed (transport budget exhausted, or a session
    /// failure that is never blind-retried).
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The page structure matched no known pattern.
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// A page of records of one kind.
///
/// The seam between the driver and the extractors: the driver is generic
/// over this, the extractors implement it per kind.
pub trait RecordPage: Sized + Send {
    /// Which stream this record kind belongs to.
    const KIND: RecordKind;

    /// Extracts one page of records plus the next-page cursor.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] when the page layout matches no known
    /// pattern.
    fn extract(page: &HtmlPage) -> Result<Extraction<Self>, ExtractError>;

    /// The record's own date, for the `placed_after` stop condition.
    fn record_date(&self) -> Option<NaiveDate>;
}

impl RecordPage for Order {
    const KIND: RecordKind = RecordKind::Orders;

    fn extract(page: &HtmlPage) -> Result<Extraction<Self>, ExtractError> {
        extract_orders(page)
    }

    fn record_date(&self) -> Option<NaiveDate> {
        self.placed
    }
}

impl RecordPage for Transaction {
    const KIND: RecordKind = RecordKind::Transactions;

    fn extract(page: &HtmlPage) -> Result<Extraction<Self>, ExtractError> {
        extract_transactions(page)
    }

    fn record_date(&self) -> Option<NaiveDate> {
        self.completed_date
    }
}

/// Orders across however many history pages exist.
pub type OrderStream<'a> = RecordStream<'a, Order>;

/// Payment postings across however many pages exist.
pub type TransactionStream<'a> = RecordStream<'a, Transaction>;

/// Lazy, finite, non-restartable sequence of records.
///
/// Pull with [`next`](Self::next) until it returns `None`. After a terminal
/// error the stream stays finished; construct a new stream with
/// [`resume_from`](Self::resume_from) and the error's cursor to continue.
pub struct RecordStream<'a, T: RecordPage> {
    fetcher: &'a PageFetcher,
    policy: RetryPolicy,
    filters: HistoryFilters,
    cursor: Option<PageCursor>,
    last_complete: Option<PageCursor>,
    pages_completed: u32,
    buffer: VecDeque<T>,
    finished: bool,
}

impl<'a, T: RecordPage> RecordStream<'a, T> {
    /// Starts a stream from the first page.
    #[must_use]
    pub fn new(fetcher: &'a PageFetcher, filters: HistoryFilters) -> Self {
        Self::resume_from(fetcher, filters, PageCursor::start())
    }

    /// Starts a stream from an explicit cursor (typically the
    /// `last_cursor` of a previous [`PipelineError`]).
    #[must_use]
    pub fn resume_from(
        fetcher: &'a PageFetcher,
        filters: HistoryFilters,
        cursor: PageCursor,
    ) -> Self {
        let policy = RetryPolicy::with_max_attempts(fetcher.config().fetch_attempts);
        Self {
            fetcher,
            policy,
            filters,
            cursor: Some(cursor),
            last_complete: None,
            pages_completed: 0,
            buffer: VecDeque::new(),
            finished: false,
        }
    }

    /// Cursor of the last successfully completed page.
    #[must_use]
    pub fn last_completed_cursor(&self) -> Option<&PageCursor> {
        self.last_complete.as_ref()
    }

    /// Yields the next record, fetching further pages as needed.
    ///
    /// Returns `None` when the listing is exhausted or a stop condition
    /// fired; returns `Some(Err(_))` exactly once on terminal failure.
    pub async fn next(&mut self) -> Option<Result<T, PipelineError>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                if let (Some(bound), Some(date)) =
                    (self.filters.placed_after, record.record_date())
                {
                    if date < bound {
                        debug!(%bound, %date, "record older than bound; stopping stream");
                        self.buffer.clear();
                        self.cursor = None;
                        self.finished = true;
                        return None;
                    }
                }
                return Some(Ok(record));
            }

            if self.finished {
                return None;
            }

            let Some(cursor) = self.cursor.take() else {
                self.finished = true;
                return None;
            };

            if let Some(max) = self.filters.max_pages {
                if self.pages_completed >= max {
                    debug!(max, "page ceiling reached; stopping stream");
                    self.finished = true;
                    return None;
                }
            }

            match self.fetch_page(&cursor).await {
                Ok(extraction) => {
                    self.pages_completed += 1;
                    self.cursor = extraction.next;
                    self.last_complete = Some(cursor);
                    self.buffer.extend(extraction.records);
                }
                Err(source) => {
                    self.finished = true;
                    return Some(Err(PipelineError {
                        last_cursor: self.last_complete.clone(),
                        pages_completed: self.pages_completed,
                        source,
                    }));
                }
            }
        }
    }

    /// Drains the rest of the stream into a vector.
    ///
    /// # Errors
    ///
    /// Returns the stream's terminal [`PipelineError`] if one occurs.
    pub async fn collect_remaining(&mut self) -> Result<Vec<T>, PipelineError> {
        let mut records = Vec::new();
        while let Some(result) = self.next().await {
            records.push(result?);
        }
        Ok(records)
    }

    /// Fetches and extracts one page under the bounded retry budget.
    #[instrument(level = "debug", skip(self, cursor), fields(kind = ?T::KIND))]
    async fn fetch_page(&self, cursor: &PageCursor) -> Result<Extraction<T>, PageFailure> {
        let target = cursor.target(T::KIND, self.fetcher.config(), &self.filters);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let failure_and_type = match self.fetcher.fetch(&target).await {
                Ok(page) => match T::extract(&page) {
                    Ok(extraction) => return Ok(extraction),
                    // Re-fetching can clear a transiently garbled page, but
                    // persistent drift exhausts the same budget and surfaces.
                    Err(error) => (PageFailure::Extract(error), FailureType::Transient),
                },
                Err(FetchError::Transport(error)) => {
                    let failure_type = classify_error(&error);
                    (PageFailure::Fetch(FetchError::Transport(error)), failure_type)
                }
                // Session and auth failures are terminal immediately: the
                // fetcher already performed its one recovery attempt, and
                // resubmitting sign-in risks lockout.
                Err(terminal) => return Err(PageFailure::Fetch(terminal)),
            };

            let (failure, failure_type) = failure_and_type;
            match self.policy.should_retry(failure_type, attempt) {
                RetryDecision::Retry { delay, attempt } => {
                    warn!(
                        url = %target,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %failure,
                        "page attempt failed; retrying"
                    );
                    sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    warn!(url = %target, %reason, "page attempts exhausted");
                    return Err(failure);
                }
            }
        }
    }
}

impl<T: RecordPage> std::fmt::Debug for RecordStream<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStream")
            .field("kind", &T::KIND)
            .field("pages_completed", &self.pages_completed)
            .field("buffered", &self.buffer.len())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
