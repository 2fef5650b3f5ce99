//! Pluggable resolvers for authentication challenges.
//!
//! Each resolver consumes a parsed [`Challenge`] and produces the next
//! [`FormSubmission`]. Resolvers are registered in a priority-ordered list
//! and dispatched dynamically; `async_trait` keeps the trait object-safe.
//!
//! The CAPTCHA resolver is allowed to be *wrong* — the authenticator's
//! attempt budget, not the resolver, absorbs that uncertainty. The OTP
//! resolver is deterministic and offline. The approval flow has no
//! resolution per se; [`ApprovalPollResolver`] only classifies poll pages.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::session::challenge::{
    ApprovalStatus, Challenge, FormSubmission, classify_poll_page,
};
use crate::session::error::{ResolverError, SolverError};
use crate::session::{Credentials, OtpSource};
use crate::session::totp;
use crate::transport::{HtmlPage, Transport};

/// Opaque CAPTCHA-image-to-text capability supplied by the caller.
///
/// Implementations may be wrong; they must not block indefinitely (the
/// transport timeout bounds the image fetch, and implementations should
/// bound their own inference time).
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Returns a best-guess transcription of the challenge image.
    async fn solve(&self, image: &[u8]) -> Result<String, SolverError>;
}

/// Trait that all challenge resolvers implement.
#[async_trait]
pub trait ChallengeResolver: Send + Sync {
    /// The resolver's name, for logging.
    fn name(&self) -> &'static str;

    /// Whether this resolver accepts the given challenge.
    fn can_handle(&self, challenge: &Challenge) -> bool;

    /// Produces the next form submission for the challenge.
    async fn resolve(
        &self,
        challenge: &Challenge,
        credentials: &Credentials,
    ) -> Result<FormSubmission, ResolverError>;
}

/// Builds the default resolver list used by the authenticator.
///
/// Order is deterministic; the first resolver whose `can_handle` accepts a
/// challenge wins.
#[must_use]
pub fn build_default_resolvers(
    transport: Transport,
    solver: Arc<dyn CaptchaSolver>,
) -> Vec<Box<dyn ChallengeResolver>> {
    vec![
        Box::new(CaptchaChallengeResolver::new(transport, solver)),
        Box::new(OtpChallengeResolver),
    ]
}

/// Resolves both CAPTCHA variants by fetching the challenge image and
/// delegating transcription to the [`CaptchaSolver`] collaborator.
pub struct CaptchaChallengeResolver {
    transport: Transport,
    solver: Arc<dyn CaptchaSolver>,
}

impl CaptchaChallengeResolver {
    /// Creates the resolver over a transport clone (shares the session jar).
    #[must_use]
    pub fn new(transport: Transport, solver: Arc<dyn CaptchaSolver>) -> Self {
        Self { transport, solver }
    }
}

impl std::fmt::Debug for CaptchaChallengeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptchaChallengeResolver")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChallengeResolver for CaptchaChallengeResolver {
    fn name(&self) -> &'static str {
        "captcha"
    }

    fn can_handle(&self, challenge: &Challenge) -> bool {
        matches!(
            challenge,
            Challenge::CaptchaImage { .. } | Challenge::CaptchaRetryLogin { .. }
        )
    }

    #[instrument(skip_all, fields(resolver = "captcha", kind = challenge.kind()))]
    async fn resolve(
        &self,
        challenge: &Challenge,
        credentials: &Credentials,
    ) -> Result<FormSubmission, ResolverError> {
        let (image_url, answer_field, form) = match challenge {
            Challenge::CaptchaImage {
                image_url,
                answer_field,
                form,
            }
            | Challenge::CaptchaRetryLogin {
                image_url,
                answer_field,
                form,
            } => (image_url, answer_field, form),
            Challenge::OtpCode { .. } | Challenge::ApprovalRequired { .. } => {
                return Err(ResolverError::Unhandled {
                    kind: challenge.kind(),
                });
            }
        };

        let image = self.transport.get_bytes(image_url).await?;
        let guess = self.solver.solve(&image).await?;
        debug!(guess_len = guess.len(), "captcha solver produced a guess");

        // The embedded variant requires the credentials to ride along with
        // the guess; the interstitial form has no credential inputs.
        let mut filled = Vec::new();
        if form.has_visible("email") {
            filled.push(("email".to_string(), credentials.username().to_string()));
        }
        if form.has_visible("password") {
            filled.push(("password".to_string(), credentials.password().to_string()));
        }
        filled.push((answer_field.clone(), guess));

        Ok(form.submission(filled))
    }
}

/// Resolves the OTP challenge from the credentials' OTP source.
///
/// Time-based codes are derived locally (no network); a pre-supplied code is
/// used verbatim. Either way the authenticator submits the result exactly
/// once — a stale code will not become valid on retry.
#[derive(Debug, Default)]
pub struct OtpChallengeResolver;

#[async_trait]
impl ChallengeResolver for OtpChallengeResolver {
    fn name(&self) -> &'static str {
        "otp"
    }

    fn can_handle(&self, challenge: &Challenge) -> bool {
        matches!(challenge, Challenge::OtpCode { .. })
    }

    #[instrument(skip_all, fields(resolver = "otp"))]
    async fn resolve(
        &self,
        challenge: &Challenge,
        credentials: &Credentials,
    ) -> Result<FormSubmission, ResolverError> {
        let Challenge::OtpCode { code_field, form } = challenge else {
            return Err(ResolverError::Unhandled {
                kind: challenge.kind(),
            });
        };

        let code = match credentials.otp() {
            Some(OtpSource::TotpSeed(seed)) => totp::code_now(seed)?,
            Some(OtpSource::Code(code)) => code.clone(),
            None => return Err(ResolverError::MissingOtpSource),
        };

        Ok(form.submission([(code_field.clone(), code)]))
    }
}

/// Classifies approval-poll responses; there is nothing to "resolve".
///
/// Kept alongside the form-producing resolvers because it is the approval
/// flow's counterpart of one, but it does not join the dyn registry: the
/// authenticator drives the poll loop directly.
#[derive(Debug, Default)]
pub struct ApprovalPollResolver;

impl ApprovalPollResolver {
    /// Classifies one poll response as pending, approved, or denied.
    #[must_use]
    pub fn classify(&self, page: &HtmlPage) -> ApprovalStatus {
        classify_poll_page(page)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::session::challenge::ParsedForm;

    fn otp_challenge() -> Challenge {
        Challenge::OtpCode {
            code_field: "otpCode".to_string(),
            form: ParsedForm {
                action: "https://store.test/ap/signin".to_string(),
                method: "post".to_string(),
                hidden: vec![("mfaState".to_string(), "m1".to_string())],
                visible: vec!["otpCode".to_string()],
            },
        }
    }

    #[tokio::test]
    async fn test_otp_resolver_uses_presupplied_code() {
        let resolver = OtpChallengeResolver;
        let credentials =
            Credentials::new("user@example.com", "hunter2").with_otp_code("123456");
        let submission = resolver
            .resolve(&otp_challenge(), &credentials)
            .await
            .unwrap();
        assert!(
            submission
                .fields
                .contains(&("otpCode".to_string(), "123456".to_string()))
        );
        assert!(
            submission
                .fields
                .contains(&("mfaState".to_string(), "m1".to_string()))
        );
    }

    #[tokio::test]
    async fn test_otp_resolver_derives_totp_from_seed() {
        let resolver = OtpChallengeResolver;
        let credentials = Credentials::new("user@example.com", "hunter2")
            .with_totp_seed("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ");
        let submission = resolver
            .resolve(&otp_challenge(), &credentials)
            .await
            .unwrap();
        let code = submission
            .fields
            .iter()
            .find(|(name, _)| name == "otpCode")
            .map(|(_, value)| value.clone())
            .unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_otp_resolver_without_source_fails() {
        let resolver = OtpChallengeResolver;
        let credentials = Credentials::new("user@example.com", "hunter2");
        let result = resolver.resolve(&otp_challenge(), &credentials).await;
        assert!(matches!(result, Err(ResolverError::MissingOtpSource)));
    }

    #[test]
    fn test_resolver_dispatch_by_kind() {
        let otp = OtpChallengeResolver;
        assert!(otp.can_handle(&otp_challenge()));
        assert!(!otp.can_handle(&Challenge::ApprovalRequired {
            poll_url: "https://store.test/poll".to_string(),
        }));
    }
}
