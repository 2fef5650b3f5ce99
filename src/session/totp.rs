//! RFC 6238 time-based one-time passwords.
//!
//! Derives the 6-digit code the OTP challenge expects from a shared base32
//! seed, entirely offline. The code must land inside the server's clock
//! tolerance window; a stale code is rejected and never becomes valid, which
//! is why the authenticator submits each code exactly once.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha1::Sha1;
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;

/// Time step mandated by the storefront's authenticator enrollment.
const STEP_SECS: u64 = 30;

/// Codes are 6 digits.
const DIGITS: u32 = 6;

/// Errors raised while deriving a one-time password.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TotpError {
    /// The configured seed is not valid base32.
    #[error("OTP seed is not valid base32")]
    InvalidSeed,
}

/// Derives the code for the current wall-clock time.
///
/// # Errors
///
/// Returns [`TotpError::InvalidSeed`] when the seed does not decode.
pub fn code_now(seed: &str) -> Result<String, TotpError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    code_at(seed, now)
}

/// Derives the code for an explicit Unix timestamp.
///
/// Seeds are accepted with or without padding, whitespace, or lowercase, the
/// way enrollment screens present them.
///
/// # Errors
///
/// Returns [`TotpError::InvalidSeed`] when the seed does not decode.
pub fn code_at(seed: &str, unix_time: u64) -> Result<String, TotpError> {
    let normalized: String = seed
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    let normalized = normalized.trim_end_matches('=');

    let key = base32::decode(base32::Alphabet::Rfc4648 { padding: false }, normalized)
        .filter(|key| !key.is_empty())
        .ok_or(TotpError::InvalidSeed)?;

    let counter = unix_time / STEP_SECS;
    let mut mac = HmacSha1::new_from_slice(&key).map_err(|_| TotpError::InvalidSeed)?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    // Dynamic truncation per RFC 4226 §5.3.
    let offset = (digest[19] & 0x0f) as usize;
    let binary = ((u32::from(digest[offset]) & 0x7f) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);
    let code = binary % 10u32.pow(DIGITS);

    Ok(format!("{code:06}"))
}
