//! Cookie-jar-backed HTTP transport for the storefront.
//!
//! This module centralizes client construction so every request shares the
//! same timeout, user-agent, compression, redirect, and cookie policy. The
//! jar is the live carrier of session state; [`crate::session`] snapshots it
//! into a persistable blob and restores blobs back into it.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::ACCEPT;
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::config::ScrapeConfig;
use crate::session::challenge::FormSubmission;
use crate::user_agent;

/// Accept header sent for page requests; the site content-negotiates some
/// endpoints into JSON widgets without it.
const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Redirect hops allowed before treating the chain as broken.
const MAX_REDIRECTS: usize = 10;

/// Errors raised by storefront HTTP requests.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Client construction failed (TLS backend, system configuration).
    #[error("failed to build HTTP client: {source}")]
    Build {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Network-level error (DNS, connection refused, TLS handshake).
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// HTTP error response. The sign-in ceremony never branches on status
    /// (the site returns 200 for every obstacle); 4xx/5xx here mean the
    /// transport itself was refused.
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// A path or href could not be resolved into an absolute URL.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The offending input.
        url: String,
    },
}

impl TransportError {
    pub(crate) fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Network {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// A fetched page: final URL after redirects plus the decoded body.
///
/// Carrying the final URL lets callers detect sign-in bounces and absolutize
/// relative links without a second request.
#[derive(Debug, Clone)]
pub struct HtmlPage {
    /// URL the response was ultimately served from.
    pub url: Url,
    /// Decoded response body.
    pub body: String,
}

/// HTTP client for the storefront, created once and cloned freely.
///
/// Cloning shares the connection pool and the cookie jar; the authenticator
/// and fetcher therefore always observe the same session state.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    jar: Arc<Jar>,
    base_url: Url,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Builds a transport from the scrape configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] when `base_url` does not parse
    /// and [`TransportError::Build`] when client construction fails.
    pub fn new(config: &ScrapeConfig) -> Result<Self, TransportError> {
        let base_url = Url::parse(&config.base_url).map_err(|_| TransportError::InvalidUrl {
            url: config.base_url.clone(),
        })?;

        let jar = Arc::new(Jar::default());
        let client = build_client(
            Arc::clone(&jar),
            config.connect_timeout,
            config.read_timeout,
        )?;

        Ok(Self {
            client,
            jar,
            base_url,
        })
    }

    /// The cookie jar shared by every clone of this transport.
    #[must_use]
    pub fn cookie_jar(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }

    /// Storefront origin this transport is bound to.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves a path or absolute URL against the storefront origin.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] when the input cannot be
    /// joined onto the base URL.
    pub fn resolve(&self, target: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(target)
            .map_err(|_| TransportError::InvalidUrl {
                url: target.to_string(),
            })
    }

    /// Fetches a page, following redirects, and returns the final URL plus
    /// the decoded body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on timeout, network failure, or a non-2xx
    /// final status.
    #[instrument(level = "debug", skip_all, fields(url = %target))]
    pub async fn get(&self, target: &str) -> Result<HtmlPage, TransportError> {
        let url = self.resolve(target)?;
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, HTML_ACCEPT)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url.as_str(), e))?;

        Self::page_from_response(response).await
    }

    /// Fetches raw bytes (the CAPTCHA challenge image).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on timeout, network failure, or a non-2xx
    /// final status.
    #[instrument(level = "debug", skip_all, fields(url = %target))]
    pub async fn get_bytes(&self, target: &str) -> Result<Vec<u8>, TransportError> {
        let url = self.resolve(target)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url.as_str(), e))?;

        let status = response.status();
        let final_url = response.url().clone();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                url: final_url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(final_url.as_str(), e))?;
        Ok(bytes.to_vec())
    }

    /// Submits a harvested form and returns the resulting page.
    ///
    /// POST forms are URL-encoded in the body; GET forms carry their fields
    /// as query parameters, matching browser behavior.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on timeout, network failure, or a non-2xx
    /// final status.
    #[instrument(level = "debug", skip(self, submission), fields(action = %submission.action))]
    pub async fn submit(&self, submission: &FormSubmission) -> Result<HtmlPage, TransportError> {
        let url = self.resolve(&submission.action)?;
        debug!(method = %submission.method, field_count = submission.fields.len(), "submitting form");

        let request = if submission.method.eq_ignore_ascii_case("get") {
            self.client.get(url.clone()).query(&submission.fields)
        } else {
            self.client.post(url.clone()).form(&submission.fields)
        };

        let response = request
            .header(ACCEPT, HTML_ACCEPT)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url.as_str(), e))?;

        Self::page_from_response(response).await
    }

    async fn page_from_response(response: reqwest::Response) -> Result<HtmlPage, TransportError> {
        let status: StatusCode = response.status();
        let final_url = response.url().clone();

        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                url: final_url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(final_url.as_str(), e))?;

        Ok(HtmlPage {
            url: final_url,
            body,
        })
    }
}

fn build_client(
    jar: Arc<Jar>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, TransportError> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(read_timeout)
        .user_agent(user_agent::default_user_agent())
        .gzip(true)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .cookie_provider(jar)
        .build()
        .map_err(|source| TransportError::Build { source })
}
