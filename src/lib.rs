//! Amazon Orders Core Library
//!
//! This library authenticates against the Amazon storefront — which exposes
//! no official programmatic API for order history — and extracts structured
//! order and transaction records from its server-rendered HTML pages.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`transport`] - cookie-jar-backed HTTP client with shared policy
//! - [`session`] - credentials, session lifecycle, and the sign-in state
//!   machine with pluggable challenge resolvers
//! - [`fetch`] - session-aware page fetching with transparent renewal
//! - [`extract`] - structural extraction of orders and transactions
//! - [`pagination`] - lazy cursor-chained record streams with bounded retry
//! - [`retry`] - exponential backoff policy shared by the driver
//! - [`config`] - runtime configuration values
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use amazon_orders::{
//!     Authenticator, CaptchaSolver, Credentials, HistoryFilters, OrderStream, PageFetcher,
//!     ScrapeConfig, SolverError, Transport,
//! };
//!
//! struct NoSolver;
//!
//! #[async_trait::async_trait]
//! impl CaptchaSolver for NoSolver {
//!     async fn solve(&self, _image: &[u8]) -> Result<String, SolverError> {
//!         Err(SolverError::new("no solver configured"))
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScrapeConfig::default();
//! let transport = Transport::new(&config)?;
//! let authenticator = Authenticator::new(transport, config, Arc::new(NoSolver));
//! let credentials = Credentials::new("user@example.com", "password");
//! let fetcher = PageFetcher::new(authenticator, credentials);
//!
//! let mut orders = OrderStream::new(&fetcher, HistoryFilters::default());
//! while let Some(order) = orders.next().await {
//!     let order = order?;
//!     println!("{:?} {:?}", order.order_id, order.total);
//! }
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod extract;
pub mod fetch;
pub mod pagination;
pub mod retry;
mod selectors;
pub mod session;
pub mod transport;
mod user_agent;

// Re-export commonly used types
pub use config::ScrapeConfig;
pub use extract::{
    Completeness, ExtractError, Extraction, Money, MoneyError, Order, OrderItem, RecordKind,
    Transaction, parse_money,
};
pub use fetch::{FetchError, PageFetcher};
pub use pagination::{
    HistoryFilters, OrderStream, PageCursor, PageFailure, PipelineError, RecordPage, RecordStream,
    TransactionStream,
};
pub use retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
pub use session::{
    ApprovalPollResolver, ApprovalStatus, AuthError, Authenticator, CaptchaChallengeResolver,
    CaptchaSolver, Challenge, ChallengeResolver, Credentials, FormSubmission, LoginOutcome,
    MemorySessionStore, OtpChallengeResolver, OtpSource, ParsedForm, ResolverError, Session,
    SessionBlob, SessionState, SessionStore, SolverError, StoreError, TotpError,
    build_default_resolvers, classify_login_page,
};
pub use transport::{HtmlPage, Transport, TransportError};
