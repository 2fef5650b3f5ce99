//! Runtime configuration for the scrape pipeline.
//!
//! [`ScrapeConfig`] is a plain value the caller constructs (or takes the
//! defaults of) and hands to the transport, authenticator, and fetcher.
//! Loading configuration from files or the environment is the caller's
//! concern; tests repoint `base_url` at a mock server.

use std::time::Duration;

/// Default connect timeout for storefront requests.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default read timeout; order pages are small but the site can be slow.
const READ_TIMEOUT_SECS: u64 = 30;

/// Default number of CAPTCHA solve submissions before giving up.
///
/// The solver is probabilistic and may be wrong; this budget, not the
/// resolver, absorbs that uncertainty.
pub const DEFAULT_CAPTCHA_ATTEMPTS: u32 = 3;

/// Ceiling on form submissions within one sign-in ceremony.
///
/// A misbehaving server re-serving challenge pages forever must terminate as
/// a typed error, not loop.
const DEFAULT_MAX_AUTH_STEPS: u32 = 10;

/// Default per-page fetch/extract attempt budget for the pagination driver.
const DEFAULT_FETCH_ATTEMPTS: u32 = 3;

/// Configuration for one storefront scrape session.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Storefront origin, e.g. `https://www.amazon.com`.
    pub base_url: String,
    /// Sign-in form page path.
    pub sign_in_path: String,
    /// Sign-out endpoint path.
    pub sign_out_path: String,
    /// Order history listing path (paginated with `startIndex`).
    pub order_history_path: String,
    /// Payment transactions listing path.
    pub transactions_path: String,
    /// Cheap authenticated page used to probe whether a session is still
    /// accepted by the server.
    pub probe_path: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request read timeout.
    pub read_timeout: Duration,
    /// CAPTCHA solve submissions allowed before `CaptchaExhausted`.
    pub captcha_attempts: u32,
    /// Form submissions allowed within one sign-in ceremony.
    pub max_auth_steps: u32,
    /// Per-page fetch/extract attempts for the pagination driver.
    pub fetch_attempts: u32,
    /// Interval between "approve on another device" status polls.
    pub approval_poll_interval: Duration,
    /// Overall deadline for device approval before `ApprovalTimeout`.
    pub approval_deadline: Duration,
    /// Age beyond which an authenticated session is refreshed before use.
    pub session_freshness: Duration,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.amazon.com".to_string(),
            sign_in_path: "/ap/signin".to_string(),
            sign_out_path: "/gp/sign-out".to_string(),
            order_history_path: "/your-orders/orders".to_string(),
            transactions_path: "/cpe/yourpayments/transactions".to_string(),
            probe_path: "/gp/css/order-history".to_string(),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            captcha_attempts: DEFAULT_CAPTCHA_ATTEMPTS,
            max_auth_steps: DEFAULT_MAX_AUTH_STEPS,
            fetch_attempts: DEFAULT_FETCH_ATTEMPTS,
            approval_poll_interval: Duration::from_secs(5),
            approval_deadline: Duration::from_secs(60),
            session_freshness: Duration::from_secs(60 * 60),
        }
    }
}

impl ScrapeConfig {
    /// Creates a config pointed at a custom origin (for tests).
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}
