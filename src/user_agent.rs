//! Shared User-Agent string for all storefront HTTP traffic.
//!
//! Single source for the UA format so sign-in, page, and image requests stay
//! consistent and are not trivially fingerprintable per component.

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/amazon-orders-rs";

/// Default User-Agent sent on every request (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("amazon-orders/{version} (order-history-tool; +{PROJECT_UA_URL})")
}
