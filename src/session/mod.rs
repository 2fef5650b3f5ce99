//! Session lifecycle, credentials, and the sign-in state machine.
//!
//! A [`Session`] is either `Unauthenticated`, `Authenticated` (usable), or
//! `Expired` (must be discarded, never reused). The live session state is
//! the transport's cookie jar; [`SessionBlob`] is its persistable snapshot.
//! Persistence itself sits behind the [`SessionStore`] collaborator trait —
//! the core only validates a restored blob with one cheap probe request
//! before trusting it.

pub(crate) mod authenticator;
pub(crate) mod challenge;
mod error;
pub(crate) mod resolver;
pub(crate) mod totp;

pub use authenticator::Authenticator;
pub use challenge::{
    ApprovalStatus, Challenge, FormSubmission, LoginOutcome, ParsedForm, classify_login_page,
};
pub use error::{AuthError, ResolverError, SolverError, StoreError};
pub use resolver::{
    ApprovalPollResolver, CaptchaChallengeResolver, CaptchaSolver, ChallengeResolver,
    OtpChallengeResolver, build_default_resolvers,
};
pub use totp::TotpError;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::cookie::CookieStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::transport::Transport;

/// Sign-in inputs. Immutable; the password and OTP seed are never logged —
/// the `Debug` impl redacts them.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
    otp: Option<OtpSource>,
}

/// Where one-time passwords come from when the site demands one.
#[derive(Clone)]
pub enum OtpSource {
    /// Base32 TOTP seed; codes are derived locally (RFC 6238).
    TotpSeed(String),
    /// A single externally supplied code.
    Code(String),
}

impl Credentials {
    /// Creates credentials from a username and password.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            otp: None,
        }
    }

    /// Attaches a base32 TOTP seed for the OTP challenge.
    #[must_use]
    pub fn with_totp_seed(mut self, seed: impl Into<String>) -> Self {
        self.otp = Some(OtpSource::TotpSeed(seed.into()));
        self
    }

    /// Attaches a single pre-supplied OTP code.
    #[must_use]
    pub fn with_otp_code(mut self, code: impl Into<String>) -> Self {
        self.otp = Some(OtpSource::Code(code.into()));
        self
    }

    /// The account username (email).
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The password. Sensitive — never log the return value.
    #[must_use]
    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    pub(crate) fn otp(&self) -> Option<&OtpSource> {
        self.otp.as_ref()
    }
}

// Custom Debug impls that redact secrets.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("otp", &self.otp)
            .finish()
    }
}

impl fmt::Debug for OtpSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TotpSeed(_) => write!(f, "TotpSeed([REDACTED])"),
            Self::Code(_) => write!(f, "Code([REDACTED])"),
        }
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No successful sign-in yet.
    Unauthenticated,
    /// Signed in; cookies in the jar are believed valid.
    Authenticated,
    /// The server stopped honoring the cookies; must be discarded.
    Expired,
}

/// Metadata for the cookie state living in the transport's jar.
///
/// Owned by the authenticator, read-shared with the fetcher. The cookies
/// themselves stay in the jar; this value tracks whether they may be used.
#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    authenticated_at: Option<DateTime<Utc>>,
    last_validated: Option<DateTime<Utc>>,
    customer_id: Option<String>,
}

impl Session {
    /// A session that has never signed in.
    #[must_use]
    pub fn unauthenticated() -> Self {
        Self {
            state: SessionState::Unauthenticated,
            authenticated_at: None,
            last_validated: None,
            customer_id: None,
        }
    }

    /// A session freshly granted by the sign-in ceremony.
    pub(crate) fn authenticated(customer_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            state: SessionState::Authenticated,
            authenticated_at: Some(now),
            last_validated: Some(now),
            customer_id,
        }
    }

    /// A session restored from a blob and accepted by the validity probe.
    pub(crate) fn restored(
        authenticated_at: DateTime<Utc>,
        customer_id: Option<String>,
    ) -> Self {
        Self {
            state: SessionState::Authenticated,
            authenticated_at: Some(authenticated_at),
            last_validated: Some(Utc::now()),
            customer_id,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether requests may be issued against this session.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Customer identifier extracted post-login, when the page carried one.
    #[must_use]
    pub fn customer_id(&self) -> Option<&str> {
        self.customer_id.as_deref()
    }

    /// When the session was last granted by a full sign-in.
    #[must_use]
    pub fn authenticated_at(&self) -> Option<DateTime<Utc>> {
        self.authenticated_at
    }

    /// Whether the session has not been validated within `freshness`.
    ///
    /// A session that was never validated is always stale.
    #[must_use]
    pub fn is_stale(&self, freshness: Duration) -> bool {
        self.last_validated.is_none_or(|at| {
            Utc::now()
                .signed_duration_since(at)
                .to_std()
                .map_or(true, |age| age > freshness)
        })
    }

    /// Records a successful authenticated request against this session.
    pub(crate) fn touch(&mut self) {
        self.last_validated = Some(Utc::now());
    }

    /// Marks the session expired; it must never be reused for requests.
    pub(crate) fn expire(&mut self) {
        self.state = SessionState::Expired;
    }
}

/// One cookie captured into a [`SessionBlob`].
///
/// The value is redacted in `Debug` output to prevent accidental logging of
/// live session tokens.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    /// Cookie name.
    pub name: String,
    value: String,
}

impl SessionCookie {
    /// The cookie value. Sensitive — never log the return value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCookie")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Persistable snapshot of an authenticated session.
///
/// Opaque to everything except the validity probe: the core never interprets
/// the cookies, it only loads them back into a jar and asks the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionBlob {
    /// When the captured session was granted.
    pub authenticated_at: DateTime<Utc>,
    /// Customer identifier captured post-login, when present.
    pub customer_id: Option<String>,
    cookies: Vec<SessionCookie>,
}

impl SessionBlob {
    /// Number of captured cookies.
    #[must_use]
    pub fn cookie_count(&self) -> usize {
        self.cookies.len()
    }

    /// Age of the captured session.
    #[must_use]
    pub fn age(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.authenticated_at)
            .to_std()
            .unwrap_or_default()
    }

    /// Whether the blob's recorded age exceeds the freshness threshold.
    #[must_use]
    pub fn is_stale(&self, freshness: Duration) -> bool {
        self.age() > freshness
    }
}

/// Captures the transport's cookies for the storefront origin into a blob.
pub(crate) fn snapshot(transport: &Transport, session: &Session) -> SessionBlob {
    let jar = transport.cookie_jar();
    let cookies = jar
        .cookies(transport.base_url())
        .and_then(|header| header.to_str().map(str::to_string).ok())
        .map(|header| {
            header
                .split("; ")
                .filter_map(|pair| {
                    pair.split_once('=').map(|(name, value)| SessionCookie {
                        name: name.to_string(),
                        value: value.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    SessionBlob {
        authenticated_at: session.authenticated_at().unwrap_or_else(Utc::now),
        customer_id: session.customer_id().map(str::to_string),
        cookies,
    }
}

/// Loads a blob's cookies back into the transport's jar.
///
/// Cookies are added host-only against the storefront origin; every request
/// this crate makes goes to that host, so domain scoping is not widened.
pub(crate) fn restore_cookies(transport: &Transport, blob: &SessionBlob) {
    let jar = transport.cookie_jar();
    for cookie in &blob.cookies {
        jar.add_cookie_str(
            &format!("{}={}; Path=/", cookie.name, cookie.value()),
            transport.base_url(),
        );
    }
    debug!(cookie_count = blob.cookies.len(), "restored session cookies into jar");
    if blob.cookies.is_empty() {
        warn!("restored session blob contained no cookies");
    }
}

/// Session persistence collaborator contract.
///
/// Implementations own where and how blobs live (disk cache, keychain,
/// database); the core only calls `load` before sign-in and `save` after.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads the previously saved blob, if any.
    async fn load(&self) -> Result<Option<SessionBlob>, StoreError>;

    /// Saves a blob, replacing any previous one.
    async fn save(&self, blob: &SessionBlob) -> Result<(), StoreError>;
}

/// In-memory [`SessionStore`] for tests and single-process callers.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    blob: tokio::sync::RwLock<Option<SessionBlob>>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<SessionBlob>, StoreError> {
        Ok(self.blob.read().await.clone())
    }

    async fn save(&self, blob: &SessionBlob) -> Result<(), StoreError> {
        *self.blob.write().await = Some(blob.clone());
        Ok(())
    }
}
