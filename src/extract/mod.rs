//! Structural extraction of domain records from server-rendered HTML.
//!
//! Extraction is pattern-matching over the document tree: locate the
//! repeated container elements representing one record each, then locate
//! known sub-elements per field by role/class (exact position is not stable
//! across locales). One malformed field downgrades its record to
//! [`Completeness::Partial`] and is logged — it never aborts the page. A
//! page with zero containers is only legitimate when the explicit
//! empty-history marker is present; otherwise it is a structural failure
//! signalling markup drift.
//!
//! This module depends on nothing but raw HTML; session and pagination
//! concerns live elsewhere.

mod error;
pub mod money;
mod order;
mod transaction;

pub use error::ExtractError;
pub use money::{Money, MoneyError, parse_money};
pub use order::{Order, OrderItem, extract_orders};
pub use transaction::{Transaction, extract_transactions};

use chrono::NaiveDate;
use scraper::{ElementRef, Html};
use serde::Serialize;
use url::Url;

use crate::pagination::PageCursor;
use crate::selectors;

/// Which record stream a page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Order history cards.
    Orders,
    /// Payment transaction postings.
    Transactions,
}

/// Whether every field of a record parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Completeness {
    /// Every field parsed.
    Complete,
    /// One or more fields failed to parse; the record is kept rather than
    /// discarded.
    Partial {
        /// Names of the fields that failed.
        missing: Vec<&'static str>,
    },
}

impl Completeness {
    /// Whether the record parsed fully.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    pub(crate) fn from_missing(missing: Vec<&'static str>) -> Self {
        if missing.is_empty() {
            Self::Complete
        } else {
            Self::Partial { missing }
        }
    }
}

/// Result of extracting one page: the records in document order plus the
/// cursor for the following page, when one exists.
#[derive(Debug, Clone)]
pub struct Extraction<T> {
    /// Records in document order.
    pub records: Vec<T>,
    /// Cursor for the next page; `None` on the last page.
    pub next: Option<PageCursor>,
}

/// Collapses an element's text nodes into a single whitespace-normalized
/// string.
#[must_use]
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for chunk in el.text() {
        let trimmed = chunk.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(trimmed);
    }
    out
}

/// Absolutizes an href against the page it appeared on.
#[must_use]
pub(crate) fn absolutize(page_url: &Url, href: &str) -> String {
    page_url
        .join(href)
        .map_or_else(|_| href.to_string(), |url| url.to_string())
}

/// Parses the date formats the history pages render.
///
/// English long-form dates come first ("July 5, 2025"); day-first and ISO
/// forms cover other locales the markup has been seen in.
#[must_use]
pub(crate) fn parse_history_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    const FORMATS: [&str; 4] = ["%B %d, %Y", "%d %B %Y", "%B %d %Y", "%Y-%m-%d"];
    FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
}

/// Locates the shared next-page control and lifts it into a cursor.
pub(crate) fn next_page_cursor(doc: &Html, page_url: &Url) -> Option<PageCursor> {
    doc.select(&selectors::NEXT_PAGE_LINK)
        .next()
        .and_then(|link| link.value().attr("href"))
        .map(|href| PageCursor::next_url(absolutize(page_url, href)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_completeness_from_missing() {
        assert!(Completeness::from_missing(vec![]).is_complete());
        let partial = Completeness::from_missing(vec!["total"]);
        assert!(!partial.is_complete());
        assert_eq!(
            partial,
            Completeness::Partial {
                missing: vec!["total"]
            }
        );
    }

    #[test]
    fn test_element_text_collapses_whitespace() {
        let html = Html::parse_fragment("<div>  Order\n  <span> placed </span>\t</div>");
        let root = html.root_element();
        assert_eq!(element_text(root), "Order placed");
    }

    #[test]
    fn test_parse_history_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 7, 5).unwrap();
        assert_eq!(parse_history_date("July 5, 2025"), Some(expected));
        assert_eq!(parse_history_date(" 5 July 2025 "), Some(expected));
        assert_eq!(parse_history_date("2025-07-05"), Some(expected));
        assert_eq!(parse_history_date("soon"), None);
    }

    #[test]
    fn test_next_page_cursor_absent_on_terminal_page() {
        let doc = Html::parse_document(
            r#"<ul class="a-pagination"><li class="a-last a-disabled">Next</li></ul>"#,
        );
        let url = Url::parse("https://store.test/your-orders/orders").unwrap();
        assert!(next_page_cursor(&doc, &url).is_none());
    }

    #[test]
    fn test_next_page_cursor_present() {
        let doc = Html::parse_document(
            r#"<ul class="a-pagination"><li class="a-last"><a href="/your-orders/orders?startIndex=10">Next</a></li></ul>"#,
        );
        let url = Url::parse("https://store.test/your-orders/orders").unwrap();
        let cursor = next_page_cursor(&doc, &url).unwrap();
        assert!(format!("{cursor:?}").contains("startIndex=10"));
    }
}
