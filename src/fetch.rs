//! Session-aware page fetching.
//!
//! [`PageFetcher`] wraps the transport with session lifecycle handling: it
//! refreshes a stale session before use, and when a fetch bounces to the
//! sign-in page mid-pipeline it re-authenticates once and retries. Both are
//! invisible to the pagination driver except as added latency.
//!
//! The session is the cookie jar's single point of coordination: exactly one
//! writer at a time, serialized by the mutex around every "use-or-refresh"
//! scope. Re-authentication happens at most once per fetch — a second
//! consecutive sign-in bounce means the server itself is misbehaving and
//! surfaces as [`FetchError::SessionUnrecoverable`].

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::ScrapeConfig;
use crate::session::challenge::is_sign_in_page;
use crate::session::{AuthError, Authenticator, Credentials, Session, SessionBlob};
use crate::transport::{HtmlPage, Transport, TransportError};

/// Errors raised by session-aware fetches.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Re-authentication succeeded but the server kept bouncing the fetch to
    /// sign-in; the session cannot be recovered by this client.
    #[error("session unrecoverable: sign-in redirect persisted after re-authentication at {url}")]
    SessionUnrecoverable {
        /// The page that kept bouncing.
        url: String,
    },

    /// Transparent re-authentication failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The page request itself failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Fetches pages under an authenticated session, renewing it as needed.
pub struct PageFetcher {
    transport: Transport,
    authenticator: Authenticator,
    credentials: Credentials,
    config: ScrapeConfig,
    session: Mutex<Session>,
}

impl std::fmt::Debug for PageFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageFetcher")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl PageFetcher {
    /// Creates a fetcher over the authenticator's transport.
    ///
    /// The session starts unauthenticated; the first fetch signs in.
    #[must_use]
    pub fn new(authenticator: Authenticator, credentials: Credentials) -> Self {
        let transport = authenticator.transport().clone();
        let config = authenticator.config().clone();
        Self {
            transport,
            authenticator,
            credentials,
            config,
            session: Mutex::new(Session::unauthenticated()),
        }
    }

    pub(crate) fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    /// Seeds the fetcher from a persisted blob, validating it with the
    /// authenticator's probe (falling back to a fresh sign-in).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Auth`] when neither the blob nor a fresh
    /// sign-in produces a usable session.
    #[instrument(skip_all)]
    pub async fn restore_session(&self, blob: &SessionBlob) -> Result<(), FetchError> {
        let mut session = self.session.lock().await;
        *session = self
            .authenticator
            .authenticate(&self.credentials, Some(blob))
            .await?;
        Ok(())
    }

    /// Captures the current session as a persistable blob, or `None` when
    /// the session is not authenticated.
    pub async fn session_blob(&self) -> Option<SessionBlob> {
        let session = self.session.lock().await;
        session
            .is_usable()
            .then(|| self.authenticator.snapshot(&session))
    }

    /// The customer identifier of the current session, when known.
    pub async fn customer_id(&self) -> Option<String> {
        let session = self.session.lock().await;
        session.customer_id().map(str::to_string)
    }

    /// Fetches a page under the session, authenticating or renewing as
    /// required.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::SessionUnrecoverable`] when a sign-in bounce
    /// persists after one re-authentication, [`FetchError::Auth`] when
    /// authentication itself fails, and [`FetchError::Transport`] for
    /// network failures.
    #[instrument(level = "debug", skip_all, fields(url = %target))]
    pub async fn fetch(&self, target: &str) -> Result<HtmlPage, FetchError> {
        // Single "use-or-refresh" scope: the authenticator and this method
        // must never race over the jar.
        let mut session = self.session.lock().await;

        if !session.is_usable() || session.is_stale(self.config.session_freshness) {
            debug!(usable = session.is_usable(), "session missing or stale; authenticating");
            self.refresh(&mut session).await?;
        }

        let page = self.transport.get(target).await?;
        if !is_sign_in_page(&page) {
            session.touch();
            return Ok(page);
        }

        // Mid-pipeline expiry: the server bounced an authenticated fetch to
        // sign-in. Renew once and retry.
        info!(url = %target, "fetch bounced to sign-in; re-authenticating once");
        session.expire();
        self.refresh(&mut session).await?;

        let page = self.transport.get(target).await?;
        if is_sign_in_page(&page) {
            warn!(url = %target, "second consecutive sign-in bounce");
            session.expire();
            return Err(FetchError::SessionUnrecoverable {
                url: page.url.to_string(),
            });
        }

        session.touch();
        Ok(page)
    }

    async fn refresh(&self, session: &mut Session) -> Result<(), FetchError> {
        *session = self
            .authenticator
            .authenticate(&self.credentials, None)
            .await?;
        Ok(())
    }
}
