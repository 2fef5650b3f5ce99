//! Error types for authentication and challenge resolution.
//!
//! Every terminal outcome of the sign-in ceremony is a distinct variant so
//! callers can map failures to exit codes or alerts without string matching.
//! None of these are blind-retried: an unfamiliar challenge or repeated
//! credential submission risks account lockout.

use thiserror::Error;

use crate::session::totp::TotpError;
use crate::transport::TransportError;

/// Errors raised by the CAPTCHA-solving collaborator.
///
/// "Failed" here means the capability itself broke (crashed, timed out) —
/// a *wrong* guess is not an error; the authenticator's attempt budget
/// absorbs wrong guesses.
#[derive(Debug, Error)]
#[error("captcha solver failed: {message}")]
pub struct SolverError {
    /// Description of the failure.
    pub message: String,
}

impl SolverError {
    /// Creates a solver error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors raised while resolving a single challenge into a form submission.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// The CAPTCHA-solving capability failed outright.
    #[error(transparent)]
    Solver(#[from] SolverError),

    /// The site asked for a one-time password but the credentials carry no
    /// OTP seed or pre-supplied code.
    #[error("the site requested a one-time password but no OTP source is configured")]
    MissingOtpSource,

    /// The configured OTP seed could not be used.
    #[error(transparent)]
    Totp(#[from] TotpError),

    /// No registered resolver accepts this challenge kind.
    #[error("no resolver can handle challenge: {kind}")]
    Unhandled {
        /// The challenge kind that went unhandled.
        kind: &'static str,
    },

    /// Network failure while gathering challenge material (e.g. the image).
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Terminal outcomes of the sign-in state machine.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The site explicitly rejected the supplied credentials.
    #[error("credentials rejected: {message}")]
    BadCredentials {
        /// The rejection message shown on the page.
        message: String,
    },

    /// The CAPTCHA submission budget ran out; the solver never produced an
    /// accepted answer.
    #[error("captcha attempt budget ({budget}) exhausted after {attempts} submissions")]
    CaptchaExhausted {
        /// Submissions actually made.
        attempts: u32,
        /// The configured budget.
        budget: u32,
    },

    /// The one-time password was rejected. Stale codes never become valid,
    /// so there is exactly one submission.
    #[error("one-time password rejected; codes are submitted exactly once")]
    OtpRejected,

    /// Device approval was not granted before the configured deadline.
    #[error("device approval not granted within {waited_secs}s")]
    ApprovalTimeout {
        /// Seconds waited before giving up.
        waited_secs: u64,
    },

    /// The account holder denied the approval prompt.
    #[error("device approval was denied")]
    ApprovalDenied,

    /// The response matched no known success or challenge shape. Surfaced
    /// instead of guessing, since guessing risks lockout.
    #[error("unrecognized response at {url} during sign-in: {diagnostic}")]
    UnknownChallenge {
        /// URL the response was served from.
        url: String,
        /// Structural summary of what the page contained.
        diagnostic: String,
    },

    /// The ceremony exceeded its step ceiling without terminating.
    #[error("sign-in exceeded {steps} steps without terminating")]
    TooManySteps {
        /// The configured ceiling.
        steps: u32,
    },

    /// A challenge resolver failed.
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    /// Network failure during the ceremony. Not retried here: resubmitting
    /// auth forms on a flaky network risks duplicate submissions.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Error raised by a [`crate::session::SessionStore`] implementation.
#[derive(Debug, Error)]
#[error("session store error: {message}")]
pub struct StoreError {
    /// Description of the failure.
    pub message: String,
}

impl StoreError {
    /// Creates a store error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
