//! Payment transaction extraction.
//!
//! The payments page interleaves date group headers with posting containers;
//! a header's date applies to every container until the next header.
//! Postings correlate to orders by order number, parsed out of the order
//! link text — they are not physically nested in the order history pages.

use chrono::NaiveDate;
use scraper::Html;
use serde::Serialize;
use tracing::warn;
use url::Url;

use crate::extract::money::{Money, parse_money};
use crate::extract::{
    Completeness, ExtractError, Extraction, absolutize, element_text, next_page_cursor,
};
use crate::selectors;
use crate::transport::HtmlPage;

/// One payment posting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    /// Date the posting completed, from its group header.
    pub completed_date: Option<NaiveDate>,
    /// Payment instrument line, e.g. `Visa ****1234`.
    pub payment_method: Option<String>,
    /// Signed amount; charges are negative, refunds positive.
    pub amount: Option<Money>,
    /// Correlated order number, when the posting links one.
    pub order_id: Option<String>,
    /// Absolute link to the correlated order.
    pub order_link: Option<String>,
    /// Whether every field parsed.
    pub completeness: Completeness,
}

/// Extracts the postings on one payments page plus the next-page cursor.
///
/// # Errors
///
/// Returns [`ExtractError::Structural`] when the page has no posting
/// containers and no explicit empty-state marker.
pub fn extract_transactions(page: &HtmlPage) -> Result<Extraction<Transaction>, ExtractError> {
    let doc = Html::parse_document(&page.body);

    let mut records = Vec::new();
    let mut current_date: Option<NaiveDate> = None;

    for element in doc.select(&selectors::TXN_DATE_OR_CONTAINER) {
        let is_date_header = element
            .value()
            .classes()
            .any(|class| class == "apx-transaction-date-container");
        if is_date_header {
            current_date = crate::extract::parse_history_date(&element_text(element));
            continue;
        }
        records.push(parse_transaction(element, current_date, &page.url));
    }

    if records.is_empty() {
        if doc.select(&selectors::TXN_EMPTY_MARKER).next().is_some() {
            return Ok(Extraction {
                records,
                next: None,
            });
        }
        return Err(ExtractError::structural(
            &page.url,
            "no transaction containers and no empty-state marker",
        ));
    }

    let next = next_page_cursor(&doc, &page.url);
    Ok(Extraction { records, next })
}

/// Parses one posting container. Field failures downgrade, never abort.
fn parse_transaction(
    container: scraper::ElementRef<'_>,
    completed_date: Option<NaiveDate>,
    page_url: &Url,
) -> Transaction {
    let mut missing: Vec<&'static str> = Vec::new();

    if completed_date.is_none() {
        missing.push("completed_date");
    }

    let payment_method = container
        .select(&selectors::TXN_PAYMENT_METHOD)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty());
    if payment_method.is_none() {
        missing.push("payment_method");
    }

    let amount = container
        .select(&selectors::TXN_AMOUNT)
        .next()
        .map(element_text)
        .and_then(|text| {
            parse_money(&text)
                .map_err(|error| warn!(%error, "transaction amount failed to parse"))
                .ok()
        });
    if amount.is_none() {
        missing.push("amount");
    }

    // Not every posting references an order (gift card reloads, refund
    // adjustments), so a missing link is not a downgrade.
    let order_anchor = container
        .select(&selectors::TXN_ORDER_LINK)
        .find(|link| element_text(*link).contains("Order #"));
    let order_id = order_anchor
        .map(|link| element_text(link))
        .as_deref()
        .and_then(|text| selectors::ORDER_ID_RE.find(text).map(|m| m.as_str().to_string()));
    let order_link = order_anchor
        .and_then(|link| link.value().attr("href"))
        .map(|href| absolutize(page_url, href));

    let completeness = Completeness::from_missing(missing);
    if !completeness.is_complete() {
        warn!(
            order_id = order_id.as_deref().unwrap_or("<none>"),
            ?completeness,
            "transaction extracted partially"
        );
    }

    Transaction {
        completed_date,
        payment_method,
        amount,
        order_id,
        order_link,
        completeness,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn page(body: &str) -> HtmlPage {
        HtmlPage {
            url: Url::parse("https://store.test/cpe/yourpayments/transactions").unwrap(),
            body: body.to_string(),
        }
    }

    fn date_header(date: &str) -> String {
        format!(r#"<div class="apx-transaction-date-container"><span>{date}</span></div>"#)
    }

    fn posting(method: &str, order_id: &str, amount: &str) -> String {
        format!(
            r#"<div class="apx-transactions-line-item-component-container">
              <span class="a-size-base a-text-bold">{method}</span>
              <a class="a-link-normal" href="/gp/css/order-details?orderID={order_id}">Order #{order_id}</a>
              <span class="a-size-base-plus a-text-bold">{amount}</span>
            </div>"#
        )
    }

    #[test]
    fn test_extract_transactions_with_date_groups() {
        let body = format!(
            "{}{}{}{}",
            date_header("July 6, 2025"),
            posting("Visa ****1234", "114-0004321-5678901", "-$42.99"),
            date_header("July 2, 2025"),
            posting("Mastercard ****9876", "113-9999999-0000001", "-$12.50"),
        );
        let extraction = extract_transactions(&page(&body)).unwrap();
        assert_eq!(extraction.records.len(), 2);

        let first = &extraction.records[0];
        assert_eq!(
            first.completed_date,
            Some(NaiveDate::from_ymd_opt(2025, 7, 6).unwrap())
        );
        assert_eq!(first.payment_method.as_deref(), Some("Visa ****1234"));
        assert_eq!(
            first.amount.as_ref().unwrap().amount,
            Decimal::from_str("-42.99").unwrap()
        );
        assert_eq!(first.order_id.as_deref(), Some("114-0004321-5678901"));
        assert!(first.completeness.is_complete());

        let second = &extraction.records[1];
        assert_eq!(
            second.completed_date,
            Some(NaiveDate::from_ymd_opt(2025, 7, 2).unwrap())
        );
    }

    #[test]
    fn test_posting_without_order_link_stays_complete() {
        let body = format!(
            "{}{}",
            date_header("July 6, 2025"),
            r#"<div class="apx-transactions-line-item-component-container">
              <span class="a-size-base a-text-bold">Gift Card</span>
              <span class="a-size-base-plus a-text-bold">$25.00</span>
            </div>"#,
        );
        let extraction = extract_transactions(&page(&body)).unwrap();
        let record = &extraction.records[0];
        assert_eq!(record.order_id, None);
        assert!(record.completeness.is_complete());
    }

    #[test]
    fn test_posting_before_any_date_header_is_partial() {
        let body = posting("Visa ****1234", "114-0004321-5678901", "-$42.99");
        let extraction = extract_transactions(&page(&body)).unwrap();
        let record = &extraction.records[0];
        assert_eq!(record.completed_date, None);
        assert_eq!(
            record.completeness,
            Completeness::Partial {
                missing: vec!["completed_date"]
            }
        );
    }

    #[test]
    fn test_empty_state_marker_is_not_structural() {
        let body = r#"<div class="apx-transactions-empty-state">No transactions</div>"#;
        let extraction = extract_transactions(&page(body)).unwrap();
        assert!(extraction.records.is_empty());
        assert!(extraction.next.is_none());
    }

    #[test]
    fn test_zero_postings_without_marker_is_structural() {
        let result = extract_transactions(&page("<html><body></body></html>"));
        assert!(matches!(result, Err(ExtractError::Structural { .. })));
    }

    #[test]
    fn test_next_cursor_lifted_from_pagination() {
        let body = format!(
            r#"{}{}<ul class="a-pagination"><li class="a-last"><a href="/cpe/yourpayments/transactions?page=2">Next</a></li></ul>"#,
            date_header("July 6, 2025"),
            posting("Visa ****1234", "114-0004321-5678901", "-$42.99"),
        );
        let extraction = extract_transactions(&page(&body)).unwrap();
        assert!(extraction.next.is_some());
    }
}
