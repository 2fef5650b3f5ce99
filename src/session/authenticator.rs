//! The sign-in state machine.
//!
//! Drives the credential form, challenge resolution, and approval polling
//! end-to-end over the shared transport, producing an authenticated
//! [`Session`]. Every branch is explicit and budgeted:
//!
//! - CAPTCHA submissions are capped by `ScrapeConfig::captcha_attempts`
//!   (the solver is probabilistic and may be wrong).
//! - One-time passwords are submitted exactly once; a stale code will not
//!   become valid on retry.
//! - Device approval polls at a fixed interval up to a fixed deadline.
//! - The whole ceremony is capped by `ScrapeConfig::max_auth_steps`.
//!
//! An unrecognized response shape is a hard [`AuthError::UnknownChallenge`],
//! never a silent retry — guessing against an unfamiliar page risks
//! credential lockout. Side effects are network calls only; persistence is
//! the caller's responsibility via [`crate::session::SessionStore`].

use std::sync::Arc;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};

use crate::config::ScrapeConfig;
use crate::session::challenge::{
    ApprovalStatus, Challenge, FormSubmission, LoginOutcome, classify_login_page,
    extract_customer_id, is_sign_in_page, is_signed_in_page,
};
use crate::session::error::{AuthError, ResolverError};
use crate::session::resolver::{
    ApprovalPollResolver, CaptchaSolver, ChallengeResolver, build_default_resolvers,
};
use crate::session::{Credentials, Session, SessionBlob, restore_cookies, snapshot};
use crate::transport::{HtmlPage, Transport, TransportError};

/// Drives the login state machine end-to-end.
///
/// One logical session per instance: the transport's cookie jar is the
/// shared mutable resource, and this type is its writer during
/// authentication.
pub struct Authenticator {
    transport: Transport,
    config: ScrapeConfig,
    resolvers: Vec<Box<dyn ChallengeResolver>>,
    approval: ApprovalPollResolver,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("base_url", &self.config.base_url)
            .field("resolver_count", &self.resolvers.len())
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Creates an authenticator with the default resolver set.
    #[must_use]
    pub fn new(
        transport: Transport,
        config: ScrapeConfig,
        solver: Arc<dyn CaptchaSolver>,
    ) -> Self {
        let resolvers = build_default_resolvers(transport.clone(), solver);
        Self::with_resolvers(transport, config, resolvers)
    }

    /// Creates an authenticator with a custom resolver list (for tests or
    /// alternative challenge handling).
    #[must_use]
    pub fn with_resolvers(
        transport: Transport,
        config: ScrapeConfig,
        resolvers: Vec<Box<dyn ChallengeResolver>>,
    ) -> Self {
        Self {
            transport,
            config,
            resolvers,
            approval: ApprovalPollResolver,
        }
    }

    pub(crate) fn transport(&self) -> &Transport {
        &self.transport
    }

    pub(crate) fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    /// Authenticates, preferring a restored session when one is offered.
    ///
    /// A fresh-enough blob is loaded into the jar and validated with one
    /// cheap probe; if the server still accepts it, no credentials are
    /// submitted at all. Otherwise a full sign-in ceremony runs.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] for every terminal failure of the ceremony; see
    /// the module docs for the budget on each branch.
    #[instrument(skip_all, fields(username = credentials.username()))]
    pub async fn authenticate(
        &self,
        credentials: &Credentials,
        existing: Option<&SessionBlob>,
    ) -> Result<Session, AuthError> {
        if let Some(blob) = existing {
            if blob.is_stale(self.config.session_freshness) {
                debug!(age_secs = blob.age().as_secs(), "stored session too old; signing in fresh");
            } else {
                restore_cookies(&self.transport, blob);
                if self.probe().await? {
                    info!("restored session accepted by validity probe");
                    return Ok(Session::restored(
                        blob.authenticated_at,
                        blob.customer_id.clone(),
                    ));
                }
                debug!("restored session rejected by server; signing in fresh");
            }
        }

        self.sign_in(credentials).await
    }

    /// Issues one cheap authenticated request and reports whether the server
    /// still honors the cookies in the jar.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the probe request itself fails.
    pub async fn probe(&self) -> Result<bool, TransportError> {
        let page = self.transport.get(&self.config.probe_path).await?;
        Ok(is_signed_in_page(&page) && !is_sign_in_page(&page))
    }

    /// Captures the current jar state as a persistable blob.
    #[must_use]
    pub fn snapshot(&self, session: &Session) -> SessionBlob {
        snapshot(&self.transport, session)
    }

    /// Signs out server-side. The in-memory [`Session`] value held by the
    /// caller should be discarded afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the sign-out request fails.
    pub async fn logout(&self) -> Result<(), TransportError> {
        self.transport.get(&self.config.sign_out_path).await?;
        Ok(())
    }

    /// Runs the full sign-in ceremony.
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let mut page = self.transport.get(&self.config.sign_in_path).await?;
        let mut captcha_submissions: u32 = 0;
        let mut otp_submitted = false;
        let mut password_submitted = false;

        for step in 0..self.config.max_auth_steps {
            match classify_login_page(&page) {
                LoginOutcome::Authenticated => {
                    return Ok(self.finish(&page));
                }

                LoginOutcome::BadCredentials { message } => {
                    warn!(step, "credentials explicitly rejected");
                    return Err(AuthError::BadCredentials { message });
                }

                LoginOutcome::SignInForm(form) => {
                    // The site splits email and password across two pages for
                    // some accounts; fill whatever the form exposes.
                    if password_submitted {
                        return Err(AuthError::UnknownChallenge {
                            url: page.url.to_string(),
                            diagnostic: "sign-in form re-served after credential submission"
                                .to_string(),
                        });
                    }
                    let mut filled = Vec::new();
                    if form.has_visible("email") {
                        filled.push(("email".to_string(), credentials.username().to_string()));
                    }
                    if form.has_visible("password") {
                        filled.push(("password".to_string(), credentials.password().to_string()));
                        password_submitted = true;
                    }
                    debug!(step, password_submitted, "submitting credential form");
                    page = self.transport.submit(&form.submission(filled)).await?;
                }

                LoginOutcome::Challenge(Challenge::ApprovalRequired { poll_url }) => {
                    debug!(step, "device approval required; polling");
                    page = self.await_approval(&poll_url).await?;
                }

                LoginOutcome::Challenge(challenge @ Challenge::OtpCode { .. }) => {
                    if otp_submitted {
                        warn!(step, "server re-served the OTP prompt; not retrying");
                        return Err(AuthError::OtpRejected);
                    }
                    otp_submitted = true;
                    let submission = self.resolve_challenge(&challenge, credentials).await?;
                    debug!(step, "submitting one-time password");
                    page = self.transport.submit(&submission).await?;
                }

                LoginOutcome::Challenge(challenge) => {
                    // Both CAPTCHA variants share the submission budget.
                    captcha_submissions += 1;
                    if captcha_submissions > self.config.captcha_attempts {
                        warn!(
                            attempts = captcha_submissions - 1,
                            budget = self.config.captcha_attempts,
                            "captcha budget exhausted"
                        );
                        return Err(AuthError::CaptchaExhausted {
                            attempts: captcha_submissions - 1,
                            budget: self.config.captcha_attempts,
                        });
                    }
                    let submission = self.resolve_challenge(&challenge, credentials).await?;
                    debug!(
                        step,
                        attempt = captcha_submissions,
                        kind = challenge.kind(),
                        "submitting captcha guess"
                    );
                    page = self.transport.submit(&submission).await?;
                }

                LoginOutcome::Unknown { diagnostic } => {
                    warn!(step, %diagnostic, "unrecognized sign-in response");
                    return Err(AuthError::UnknownChallenge {
                        url: page.url.to_string(),
                        diagnostic,
                    });
                }
            }
        }

        Err(AuthError::TooManySteps {
            steps: self.config.max_auth_steps,
        })
    }

    /// Dispatches a challenge to the first resolver that accepts it.
    async fn resolve_challenge(
        &self,
        challenge: &Challenge,
        credentials: &Credentials,
    ) -> Result<FormSubmission, AuthError> {
        for resolver in &self.resolvers {
            if resolver.can_handle(challenge) {
                debug!(resolver = resolver.name(), kind = challenge.kind(), "resolving challenge");
                return resolver
                    .resolve(challenge, credentials)
                    .await
                    .map_err(AuthError::from);
            }
        }
        Err(AuthError::Resolver(ResolverError::Unhandled {
            kind: challenge.kind(),
        }))
    }

    /// Polls the approval endpoint until granted, denied, or the deadline.
    async fn await_approval(&self, poll_url: &str) -> Result<HtmlPage, AuthError> {
        let started = Instant::now();
        let deadline = started + self.config.approval_deadline;

        loop {
            let page = self.transport.get(poll_url).await?;
            match self.approval.classify(&page) {
                ApprovalStatus::Approved => {
                    info!("device approval granted");
                    return Ok(page);
                }
                ApprovalStatus::Denied => {
                    return Err(AuthError::ApprovalDenied);
                }
                ApprovalStatus::Pending => {
                    if Instant::now() + self.config.approval_poll_interval > deadline {
                        return Err(AuthError::ApprovalTimeout {
                            waited_secs: started.elapsed().as_secs(),
                        });
                    }
                    sleep(self.config.approval_poll_interval).await;
                }
            }
        }
    }

    /// Builds the terminal session from the signed-in landing page.
    fn finish(&self, page: &HtmlPage) -> Session {
        let customer_id = extract_customer_id(page);
        if customer_id.is_none() {
            debug!("customer identifier not found on post-login page");
        }
        info!(customer_id = customer_id.as_deref().unwrap_or("<unknown>"), "authenticated");
        Session::authenticated(customer_id)
    }
}
