//! Every CSS selector and fallback regex the crate relies on.
//!
//! Markup-shape assumptions are concentrated here so that when the storefront
//! drifts, the breakage is localized and diagnosable instead of smeared
//! across the classifier and extractors. Selectors target elements by
//! role/class, never absolute position, since exact position is not stable
//! across locales.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Selector;

/// Compiles a static selector, panicking on invalid patterns.
///
/// Only used with compile-time literals, where a parse failure is a
/// programming error caught by the unit tests below.
fn compile_static_selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid static selector '{css}': {e}"))
}

/// Compiles a static regex, panicking on invalid patterns.
fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

// ---- Sign-in flow ----

/// The credential form served at the sign-in path.
pub(crate) static SIGN_IN_FORM: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"form[name="signIn"]"#));

/// Any input within a form, for hidden-field harvesting.
pub(crate) static FORM_INPUT: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("input"));

/// Explicit credential-rejection box.
pub(crate) static AUTH_ERROR_BOX: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("#auth-error-message-box"));

/// One-time-password prompt form.
pub(crate) static MFA_FORM: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("form#auth-mfa-form"));

/// The OTP code input inside [`MFA_FORM`].
pub(crate) static MFA_CODE_INPUT: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("input#auth-mfa-otpcode"));

/// CAPTCHA image embedded in the sign-in form.
pub(crate) static AUTH_CAPTCHA_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("img#auth-captcha-image"));

/// Guess input paired with [`AUTH_CAPTCHA_IMAGE`].
pub(crate) static AUTH_CAPTCHA_GUESS: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("input#auth-captcha-guess"));

/// Standalone CAPTCHA interstitial guarding the whole login retry.
pub(crate) static RETRY_CAPTCHA_FORM: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"form[action*="validateCaptcha"]"#));

/// Character input on the CAPTCHA interstitial.
pub(crate) static RETRY_CAPTCHA_INPUT: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("input#captchacharacters"));

/// Image element scoped inside a CAPTCHA form.
pub(crate) static CAPTCHA_FORM_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("img"));

/// "Approve on another device" interstitial marker.
pub(crate) static APPROVAL_MARKER: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("#channelDetails"));

/// Marker served when the account holder denied the approval prompt.
pub(crate) static APPROVAL_DENIED: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("#transaction-approval-denied"));

/// Element present only when a signed-in session rendered the page.
pub(crate) static SIGNED_IN_MARKER: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("#nav-item-signout"));

/// Account menu element carrying the customer identifier.
pub(crate) static ACCOUNT_MENU: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("#nav-link-accountList"));

/// Fallback scan for the customer identifier embedded in page scripts.
pub(crate) static CUSTOMER_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r#""customerId"\s*:\s*"([A-Za-z0-9]+)""#));

// ---- Order history ----

/// One order card per order in the history listing.
pub(crate) static ORDER_CARD: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("div.order-card"));

/// Order number text inside a card.
pub(crate) static ORDER_ID: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#".yohtmlc-order-id span[dir="ltr"]"#));

/// Fallback scan for an order number anywhere in a card.
pub(crate) static ORDER_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"[A-Z0-9]{3}-[0-9]{7}-[0-9]{7}"));

/// Placed date inside the card header.
pub(crate) static ORDER_DATE: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(".order-header .order-date"));

/// Grand total inside the card header.
pub(crate) static ORDER_TOTAL: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(".order-header .order-total"));

/// Fallback scan for the grand total in card text.
pub(crate) static ORDER_TOTAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"(?i)(?:order total|total for this order)[^0-9$€£¥]*([0-9$€£¥][0-9.,\s]*)")
});

/// Order details page link.
pub(crate) static ORDER_DETAILS_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"a[href*="order-details"]"#));

/// Printable invoice link.
pub(crate) static ORDER_INVOICE_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"a[href*="print.html"]"#));

/// Shipment/delivery status line.
pub(crate) static DELIVERY_STATUS: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(".delivery-box__primary-text"));

/// One element per purchased item within a card.
pub(crate) static ORDER_ITEM: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(".yohtmlc-item"));

/// Product link inside an item.
pub(crate) static ITEM_TITLE_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("a.a-link-normal"));

/// Quantity marker inside an item; absent means quantity one.
pub(crate) static ITEM_QUANTITY: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(".item-view-qty"));

/// Unit price inside an item.
pub(crate) static ITEM_PRICE: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(".a-color-price"));

/// Per-item return/refund status line.
pub(crate) static ITEM_RETURN_STATUS: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(".yohtmlc-return-status"));

/// "Sold by" merchant line inside an item.
pub(crate) static ITEM_SELLER: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(".yohtmlc-merchant"));

/// Result count header; text beginning with "0 orders" marks a legitimately
/// empty history page, distinguishing it from markup drift.
pub(crate) static ORDER_COUNT: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("span.num-orders"));

/// Next-page control shared by both paginated listings.
pub(crate) static NEXT_PAGE_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("ul.a-pagination li.a-last a"));

// ---- Transactions ----

/// Posting-date group header; applies to following transaction containers.
pub(crate) static TXN_DATE: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("div.apx-transaction-date-container span"));

/// One container per payment posting.
pub(crate) static TXN_CONTAINER: LazyLock<Selector> = LazyLock::new(|| {
    compile_static_selector("div.apx-transactions-line-item-component-container")
});

/// Date headers and postings interleaved in document order.
pub(crate) static TXN_DATE_OR_CONTAINER: LazyLock<Selector> = LazyLock::new(|| {
    compile_static_selector(
        "div.apx-transaction-date-container, div.apx-transactions-line-item-component-container",
    )
});

/// Signed posting amount.
pub(crate) static TXN_AMOUNT: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("span.a-size-base-plus.a-text-bold"));

/// Payment instrument line ("Visa ****1234").
pub(crate) static TXN_PAYMENT_METHOD: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("span.a-size-base.a-text-bold"));

/// Link correlating a posting to its order.
pub(crate) static TXN_ORDER_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("a.a-link-normal"));

/// Marker for an account with no postings in the selected window.
pub(crate) static TXN_EMPTY_MARKER: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(".apx-transactions-empty-state"));

// ---- Diagnostics ----

/// Any form, for unknown-page diagnostics.
pub(crate) static ANY_FORM: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("form"));

/// Page title, for unknown-page diagnostics.
pub(crate) static PAGE_TITLE: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("title"));
