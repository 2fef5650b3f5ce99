//! Error types for the extraction module.

use thiserror::Error;
use url::Url;

/// Page-level extraction failures.
///
/// Per-record field failures never raise these; they downgrade the record to
/// [`crate::extract::Completeness::Partial`] instead. A structural failure
/// means the page's container/field layout matched no known pattern —
/// markup drift requiring investigation, not a transient error.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The page layout matched no known pattern.
    #[error("page structure did not match any known pattern at {url}: {diagnostic}")]
    Structural {
        /// URL of the page that failed.
        url: String,
        /// What was expected and what was found.
        diagnostic: String,
    },
}

impl ExtractError {
    /// Creates a structural failure with diagnostic context.
    pub(crate) fn structural(url: &Url, diagnostic: impl Into<String>) -> Self {
        Self::Structural {
            url: url.to_string(),
            diagnostic: diagnostic.into(),
        }
    }
}
