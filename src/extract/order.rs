//! Order history extraction.
//!
//! Each history page renders zero or more order cards; a card owns its
//! items. Field selectors miss on some locales and card generations, so the
//! order number and grand total fall back to text scans before the record is
//! downgraded to `Partial`.

use chrono::NaiveDate;
use scraper::{ElementRef, Html};
use serde::Serialize;
use tracing::warn;
use url::Url;

use crate::extract::money::{Money, parse_money};
use crate::extract::{
    Completeness, ExtractError, Extraction, absolutize, element_text, next_page_cursor,
    parse_history_date,
};
use crate::selectors;
use crate::transport::HtmlPage;

/// One order from the history listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    /// Order number, e.g. `114-0004321-5678901`.
    pub order_id: Option<String>,
    /// Date the order was placed.
    pub placed: Option<NaiveDate>,
    /// Grand total charged for the order.
    pub total: Option<Money>,
    /// Shipment/delivery status line, when the card shows one.
    pub status: Option<String>,
    /// Absolute link to the order details page.
    pub details_link: Option<String>,
    /// Absolute link to the printable invoice.
    pub invoice_link: Option<String>,
    /// Items in document order. Items never outlive their order.
    pub items: Vec<OrderItem>,
    /// Whether every field parsed.
    pub completeness: Completeness,
}

/// One purchased item within an order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItem {
    /// Product title.
    pub title: Option<String>,
    /// Absolute product link.
    pub link: Option<String>,
    /// Quantity ordered; the card omits the marker for single items.
    pub quantity: u32,
    /// Unit price.
    pub price: Option<Money>,
    /// Merchant, from the "Sold by" line.
    pub seller: Option<String>,
    /// Per-item return/refund status, when shown.
    pub return_status: Option<String>,
}

/// Extracts the orders on one history page plus the next-page cursor.
///
/// # Errors
///
/// Returns [`ExtractError::Structural`] when the page has no order cards
/// and no explicit empty-history marker — the two must never be conflated:
/// one is markup drift, the other is simply the last page of a short
/// history.
pub fn extract_orders(page: &HtmlPage) -> Result<Extraction<Order>, ExtractError> {
    let doc = Html::parse_document(&page.body);

    let cards: Vec<ElementRef<'_>> = doc.select(&selectors::ORDER_CARD).collect();
    if cards.is_empty() {
        if history_is_empty(&doc) {
            return Ok(Extraction {
                records: Vec::new(),
                next: None,
            });
        }
        return Err(ExtractError::structural(
            &page.url,
            "no order cards and no empty-history marker",
        ));
    }

    let records = cards
        .into_iter()
        .map(|card| parse_order(card, &page.url))
        .collect();
    let next = next_page_cursor(&doc, &page.url);

    Ok(Extraction { records, next })
}

/// Whether the page explicitly reports zero orders for the window.
fn history_is_empty(doc: &Html) -> bool {
    doc.select(&selectors::ORDER_COUNT)
        .next()
        .map(element_text)
        .is_some_and(|text| text.trim_start().starts_with("0 order"))
}

/// Parses one order card. Field failures downgrade the record, never abort.
fn parse_order(card: ElementRef<'_>, page_url: &Url) -> Order {
    let mut missing: Vec<&'static str> = Vec::new();
    let card_text = element_text(card);

    let order_id = card
        .select(&selectors::ORDER_ID)
        .next()
        .map(element_text)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .or_else(|| {
            selectors::ORDER_ID_RE
                .find(&card_text)
                .map(|m| m.as_str().to_string())
        });
    if order_id.is_none() {
        missing.push("order_id");
    }

    let placed = card
        .select(&selectors::ORDER_DATE)
        .next()
        .map(element_text)
        .and_then(|text| parse_history_date(&text));
    if placed.is_none() {
        missing.push("placed_date");
    }

    let total = card
        .select(&selectors::ORDER_TOTAL)
        .next()
        .map(element_text)
        .and_then(|text| parse_money(&text).ok())
        .or_else(|| {
            selectors::ORDER_TOTAL_RE
                .captures(&card_text)
                .and_then(|captures| captures.get(1))
                .and_then(|m| parse_money(m.as_str()).ok())
        });
    if total.is_none() {
        missing.push("total");
    }

    let status = card
        .select(&selectors::DELIVERY_STATUS)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty());

    let details_link = first_href(card, &selectors::ORDER_DETAILS_LINK, page_url);
    let invoice_link = first_href(card, &selectors::ORDER_INVOICE_LINK, page_url);

    let items = card
        .select(&selectors::ORDER_ITEM)
        .map(|item| parse_item(item, page_url, &mut missing))
        .collect();

    let completeness = Completeness::from_missing(missing);
    if !completeness.is_complete() {
        warn!(
            order_id = order_id.as_deref().unwrap_or("<unknown>"),
            ?completeness,
            "order extracted partially"
        );
    }

    Order {
        order_id,
        placed,
        total,
        status,
        details_link,
        invoice_link,
        items,
        completeness,
    }
}

/// Parses one item element, pushing any field failures onto the order's
/// missing list.
fn parse_item(
    item: ElementRef<'_>,
    page_url: &Url,
    missing: &mut Vec<&'static str>,
) -> OrderItem {
    let title_link = item
        .select(&selectors::ITEM_TITLE_LINK)
        .find(|link| !element_text(*link).is_empty());
    let title = title_link.map(element_text);
    let link = title_link
        .and_then(|link| link.value().attr("href"))
        .map(|href| absolutize(page_url, href));
    if title.is_none() {
        missing.push("item_title");
    }

    let quantity = match item.select(&selectors::ITEM_QUANTITY).next() {
        None => 1,
        Some(el) => match element_text(el).trim().parse::<u32>() {
            Ok(qty) => qty,
            Err(_) => {
                missing.push("item_quantity");
                1
            }
        },
    };

    let price = match item.select(&selectors::ITEM_PRICE).next() {
        None => {
            missing.push("item_price");
            None
        }
        Some(el) => {
            let text = element_text(el);
            match parse_money(&text) {
                Ok(money) => Some(money),
                Err(error) => {
                    warn!(%error, "item price failed to parse");
                    missing.push("item_price");
                    None
                }
            }
        }
    };

    let seller = item
        .select(&selectors::ITEM_SELLER)
        .next()
        .map(element_text)
        .map(|text| {
            text.trim_start_matches("Sold by:")
                .trim_start_matches("Sold by")
                .trim()
                .to_string()
        })
        .filter(|text| !text.is_empty());

    let return_status = item
        .select(&selectors::ITEM_RETURN_STATUS)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty());

    OrderItem {
        title,
        link,
        quantity,
        price,
        seller,
        return_status,
    }
}

fn first_href(
    card: ElementRef<'_>,
    selector: &scraper::Selector,
    page_url: &Url,
) -> Option<String> {
    card.select(selector)
        .next()
        .and_then(|link| link.value().attr("href"))
        .map(|href| absolutize(page_url, href))
}
