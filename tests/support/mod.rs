//! Shared fixtures and scaffolding for the integration suites.
//!
//! Builds authenticators/fetchers pointed at a wiremock server and provides
//! scripted captcha solvers plus HTML page builders for the paginated
//! listings.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use amazon_orders::{
    Authenticator, CaptchaSolver, Credentials, PageFetcher, ScrapeConfig, SolverError, Transport,
};

pub const SIGN_IN_PAGE: &str = include_str!("../fixtures/sign_in.html");
pub const SIGNED_IN_PAGE: &str = include_str!("../fixtures/signed_in.html");
pub const CAPTCHA_PAGE: &str = include_str!("../fixtures/captcha.html");
pub const OTP_PAGE: &str = include_str!("../fixtures/otp.html");
pub const APPROVAL_PAGE: &str = include_str!("../fixtures/approval.html");
pub const APPROVAL_DENIED_PAGE: &str = include_str!("../fixtures/approval_denied.html");
pub const BAD_CREDENTIALS_PAGE: &str = include_str!("../fixtures/bad_credentials.html");
pub const UNKNOWN_PAGE: &str = include_str!("../fixtures/unknown.html");
pub const ORDERS_EMPTY_PAGE: &str = include_str!("../fixtures/orders_empty.html");
pub const ORDERS_PARTIAL_PAGE: &str = include_str!("../fixtures/orders_partial.html");
pub const TRANSACTIONS_PAGE: &str = include_str!("../fixtures/transactions_page.html");

/// Standard test credentials.
pub fn credentials() -> Credentials {
    Credentials::new("user@example.com", "hunter2")
}

/// Config pointed at the mock server, with timings tightened for tests.
pub fn config_for(server: &MockServer) -> ScrapeConfig {
    let mut config = ScrapeConfig::with_base_url(server.uri());
    config.approval_poll_interval = std::time::Duration::from_millis(25);
    config.approval_deadline = std::time::Duration::from_millis(500);
    config
}

/// Builds an authenticator over a fresh transport.
pub fn authenticator(config: &ScrapeConfig, solver: Arc<dyn CaptchaSolver>) -> Authenticator {
    let transport = Transport::new(config).expect("transport builds against mock server");
    Authenticator::new(transport, config.clone(), solver)
}

/// Builds a fetcher with standard credentials and the given solver.
pub fn fetcher(config: &ScrapeConfig, solver: Arc<dyn CaptchaSolver>) -> PageFetcher {
    PageFetcher::new(authenticator(config, solver), credentials())
}

/// An HTML 200 response.
pub fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body)
}

/// Mounts the unchallenged sign-in flow: GET serves the form, any POST
/// grants the session cookie.
pub async fn mount_plain_sign_in(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/ap/signin"))
        .respond_with(html(SIGN_IN_PAGE))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ap/signin"))
        .respond_with(
            html(SIGNED_IN_PAGE).insert_header("set-cookie", "session-id=tok-abc123; Path=/"),
        )
        .mount(server)
        .await;
}

/// Solver that returns a scripted sequence of guesses and counts calls.
pub struct ScriptedSolver {
    answers: Mutex<VecDeque<String>>,
    calls: AtomicU32,
}

impl ScriptedSolver {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|s| (*s).to_string()).collect()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptchaSolver for ScriptedSolver {
    async fn solve(&self, _image: &[u8]) -> Result<String, SolverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .expect("solver script lock")
            .pop_front()
            .ok_or_else(|| SolverError::new("script exhausted"))
    }
}

/// Solver that always answers the same thing.
pub struct StaticSolver(pub &'static str);

#[async_trait]
impl CaptchaSolver for StaticSolver {
    async fn solve(&self, _image: &[u8]) -> Result<String, SolverError> {
        Ok(self.0.to_string())
    }
}

/// Solver for flows that must never reach a captcha.
pub struct NoSolver;

#[async_trait]
impl CaptchaSolver for NoSolver {
    async fn solve(&self, _image: &[u8]) -> Result<String, SolverError> {
        Err(SolverError::new("no captcha expected in this flow"))
    }
}

/// One order card for a generated history page.
pub fn order_card(order_id: &str, date: &str, total: &str) -> String {
    format!(
        r#"<div class="order-card">
          <div class="order-header">
            <span class="order-date">{date}</span>
            <span class="order-total">{total}</span>
            <div class="yohtmlc-order-id"><span dir="ltr">{order_id}</span></div>
          </div>
          <div class="yohtmlc-item">
            <a class="a-link-normal" href="/dp/B000{order_id}">Item for {order_id}</a>
            <span class="a-color-price">{total}</span>
          </div>
        </div>"#
    )
}

/// A full history page from cards plus an optional next-page link.
pub fn orders_page(cards: &[String], next_href: Option<&str>) -> String {
    let pagination = match next_href {
        Some(href) => format!(
            r#"<ul class="a-pagination"><li class="a-last"><a href="{href}">Next</a></li></ul>"#
        ),
        None => r#"<ul class="a-pagination"><li class="a-last a-disabled">Next</li></ul>"#
            .to_string(),
    };
    format!(
        "<!DOCTYPE html><html><head><title>Your Orders</title></head><body>{}{pagination}</body></html>",
        cards.join("\n")
    )
}
