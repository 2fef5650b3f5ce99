//! Structural classification of login-flow responses.
//!
//! The storefront returns HTTP 200 for success and for every obstacle, so
//! "what just happened" can only be decided by inspecting the markup. This
//! module runs a prioritized list of structural predicates and produces a
//! tagged [`LoginOutcome`]; a response matching none of them is a distinct
//! [`LoginOutcome::Unknown`], never a default branch — guessing against an
//! unfamiliar page risks credential lockout.

use scraper::{ElementRef, Html};
use tracing::debug;
use url::Url;

use crate::extract::{absolutize, element_text};
use crate::selectors;
use crate::transport::HtmlPage;

/// A login-flow `<form>` lifted out of the document: where to submit, how,
/// and which fields ride along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedForm {
    /// Absolute submission URL.
    pub action: String,
    /// Lowercased form method; defaults to `get` like a browser.
    pub method: String,
    /// Hidden fields, submitted verbatim.
    pub hidden: Vec<(String, String)>,
    /// Names of fillable (non-hidden) inputs.
    pub visible: Vec<String>,
}

impl ParsedForm {
    /// Whether the form exposes a fillable input with this name.
    #[must_use]
    pub fn has_visible(&self, name: &str) -> bool {
        self.visible.iter().any(|n| n == name)
    }

    /// Builds a submission from the hidden fields plus caller-filled values.
    #[must_use]
    pub fn submission(&self, filled: impl IntoIterator<Item = (String, String)>) -> FormSubmission {
        let mut fields = self.hidden.clone();
        fields.extend(filled);
        FormSubmission {
            action: self.action.clone(),
            method: self.method.clone(),
            fields,
        }
    }
}

/// A ready-to-send form submission produced by a challenge resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSubmission {
    /// Absolute submission URL.
    pub action: String,
    /// HTTP method, lowercased.
    pub method: String,
    /// Field name/value pairs.
    pub fields: Vec<(String, String)>,
}

/// An authentication obstacle the server inserted between credential
/// submission and session grant. Ephemeral within one sign-in attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    /// CAPTCHA image embedded in the sign-in form itself.
    CaptchaImage {
        /// Absolute URL of the challenge image.
        image_url: String,
        /// Name of the input expecting the solved text.
        answer_field: String,
        /// The form to resubmit (password must be refilled).
        form: ParsedForm,
    },
    /// Standalone CAPTCHA interstitial guarding the whole login retry.
    CaptchaRetryLogin {
        /// Absolute URL of the challenge image.
        image_url: String,
        /// Name of the input expecting the solved text.
        answer_field: String,
        /// The interstitial form.
        form: ParsedForm,
    },
    /// One-time-password prompt.
    OtpCode {
        /// Name of the input expecting the code.
        code_field: String,
        /// The OTP form.
        form: ParsedForm,
    },
    /// "Approve on another device" interstitial; resolved by polling, not by
    /// a form submission.
    ApprovalRequired {
        /// Absolute URL to poll for approval status.
        poll_url: String,
    },
}

impl Challenge {
    /// Short tag for logging and error context.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CaptchaImage { .. } => "captcha-image",
            Self::CaptchaRetryLogin { .. } => "captcha-retry-login",
            Self::OtpCode { .. } => "otp-code",
            Self::ApprovalRequired { .. } => "approval-required",
        }
    }
}

/// Classification of one login-flow response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Signed-in markers present; the ceremony is over.
    Authenticated,
    /// The credential form is being served (initial page, or the password
    /// step of a split email/password flow).
    SignInForm(ParsedForm),
    /// An obstacle to resolve.
    Challenge(Challenge),
    /// Explicit credential-rejection markers present.
    BadCredentials {
        /// The rejection message shown on the page.
        message: String,
    },
    /// No predicate matched; surfaced with a structural summary.
    Unknown {
        /// Forms and title found on the page.
        diagnostic: String,
    },
}

/// Approval-poll page classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    /// Still waiting for the account holder.
    Pending,
    /// The session was granted; the page is a signed-in landing.
    Approved,
    /// The account holder denied the prompt.
    Denied,
}

/// Classifies a login-flow response by structural predicates, most specific
/// first.
///
/// Priority order matters: challenge pages can also carry the generic error
/// box (e.g. "enter the characters as shown"), so the challenge predicates
/// run before the credential-rejection one.
#[must_use]
pub fn classify_login_page(page: &HtmlPage) -> LoginOutcome {
    let doc = Html::parse_document(&page.body);

    // 1. OTP prompt
    if let Some(form_el) = doc.select(&selectors::MFA_FORM).next() {
        let code_field = doc
            .select(&selectors::MFA_CODE_INPUT)
            .next()
            .and_then(|input| input.value().attr("name"))
            .unwrap_or("otpCode")
            .to_string();
        return LoginOutcome::Challenge(Challenge::OtpCode {
            code_field,
            form: harvest_form(&page.url, form_el),
        });
    }

    // 2. CAPTCHA embedded in the sign-in form
    if let Some(image) = doc.select(&selectors::AUTH_CAPTCHA_IMAGE).next() {
        if let Some(form_el) = doc.select(&selectors::SIGN_IN_FORM).next() {
            let image_url = image
                .value()
                .attr("src")
                .map(|src| absolutize(&page.url, src))
                .unwrap_or_default();
            let answer_field = doc
                .select(&selectors::AUTH_CAPTCHA_GUESS)
                .next()
                .and_then(|input| input.value().attr("name"))
                .unwrap_or("guess")
                .to_string();
            return LoginOutcome::Challenge(Challenge::CaptchaImage {
                image_url,
                answer_field,
                form: harvest_form(&page.url, form_el),
            });
        }
    }

    // 3. Standalone CAPTCHA interstitial
    if let Some(form_el) = doc.select(&selectors::RETRY_CAPTCHA_FORM).next() {
        if let Some(input) = form_el.select(&selectors::RETRY_CAPTCHA_INPUT).next() {
            let image_url = form_el
                .select(&selectors::CAPTCHA_FORM_IMAGE)
                .next()
                .and_then(|img| img.value().attr("src"))
                .map(|src| absolutize(&page.url, src))
                .unwrap_or_default();
            let answer_field = input
                .value()
                .attr("name")
                .unwrap_or("field-keywords")
                .to_string();
            return LoginOutcome::Challenge(Challenge::CaptchaRetryLogin {
                image_url,
                answer_field,
                form: harvest_form(&page.url, form_el),
            });
        }
    }

    // 4. Approve-on-device interstitial
    if let Some(marker) = doc.select(&selectors::APPROVAL_MARKER).next() {
        let poll_url = marker
            .value()
            .attr("data-poll-url")
            .map_or_else(|| page.url.to_string(), |href| absolutize(&page.url, href));
        return LoginOutcome::Challenge(Challenge::ApprovalRequired { poll_url });
    }

    // 5. Explicit credential rejection
    if let Some(error_box) = doc.select(&selectors::AUTH_ERROR_BOX).next() {
        return LoginOutcome::BadCredentials {
            message: element_text(error_box),
        };
    }

    // 6. Signed in
    if doc.select(&selectors::SIGNED_IN_MARKER).next().is_some() {
        return LoginOutcome::Authenticated;
    }

    // 7. Plain credential form
    if let Some(form_el) = doc.select(&selectors::SIGN_IN_FORM).next() {
        return LoginOutcome::SignInForm(harvest_form(&page.url, form_el));
    }

    LoginOutcome::Unknown {
        diagnostic: page_diagnostic(&doc),
    }
}

/// Classifies one approval-poll response.
///
/// Unrecognized intermediate pages stay `Pending`; the poll deadline bounds
/// how long that can go on.
#[must_use]
pub fn classify_poll_page(page: &HtmlPage) -> ApprovalStatus {
    let doc = Html::parse_document(&page.body);
    if doc.select(&selectors::SIGNED_IN_MARKER).next().is_some() {
        return ApprovalStatus::Approved;
    }
    if doc.select(&selectors::APPROVAL_DENIED).next().is_some() {
        return ApprovalStatus::Denied;
    }
    if doc.select(&selectors::APPROVAL_MARKER).next().is_none() {
        debug!(url = %page.url, "approval poll returned an unrecognized page; still pending");
    }
    ApprovalStatus::Pending
}

/// Whether a response landed on (or was redirected to) the sign-in page.
///
/// Used by the fetcher to detect mid-pipeline session expiry.
#[must_use]
pub fn is_sign_in_page(page: &HtmlPage) -> bool {
    if page.url.path().starts_with("/ap/signin") {
        return true;
    }
    let doc = Html::parse_document(&page.body);
    doc.select(&selectors::SIGN_IN_FORM).next().is_some()
}

/// Whether signed-in markers rendered on this page.
#[must_use]
pub fn is_signed_in_page(page: &HtmlPage) -> bool {
    let doc = Html::parse_document(&page.body);
    doc.select(&selectors::SIGNED_IN_MARKER).next().is_some()
}

/// Extracts the customer identifier from a post-login page.
///
/// Primary: the account menu's data attribute. Fallback: a scan for the
/// identifier embedded in page scripts, mirroring how order numbers are
/// recovered when their selector misses.
#[must_use]
pub fn extract_customer_id(page: &HtmlPage) -> Option<String> {
    let doc = Html::parse_document(&page.body);
    if let Some(id) = doc
        .select(&selectors::ACCOUNT_MENU)
        .next()
        .and_then(|el| el.value().attr("data-customer-id"))
        .map(str::trim)
        .filter(|id| !id.is_empty())
    {
        return Some(id.to_string());
    }

    selectors::CUSTOMER_ID_RE
        .captures(&page.body)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

/// Lifts a `<form>` element into an owned [`ParsedForm`].
fn harvest_form(page_url: &Url, form_el: ElementRef<'_>) -> ParsedForm {
    let action = form_el
        .value()
        .attr("action")
        .filter(|action| !action.is_empty())
        .map_or_else(|| page_url.to_string(), |action| absolutize(page_url, action));
    let method = form_el
        .value()
        .attr("method")
        .unwrap_or("get")
        .to_ascii_lowercase();

    let mut hidden = Vec::new();
    let mut visible = Vec::new();
    for input in form_el.select(&selectors::FORM_INPUT) {
        let Some(name) = input.value().attr("name").filter(|n| !n.is_empty()) else {
            continue;
        };
        match input.value().attr("type").unwrap_or("text") {
            "hidden" => hidden.push((
                name.to_string(),
                input.value().attr("value").unwrap_or("").to_string(),
            )),
            "submit" | "button" | "image" | "reset" => {}
            _ => visible.push(name.to_string()),
        }
    }

    ParsedForm {
        action,
        method,
        hidden,
        visible,
    }
}

/// Structural summary of an unclassifiable page for the diagnostic.
fn page_diagnostic(doc: &Html) -> String {
    let forms: Vec<String> = doc
        .select(&selectors::ANY_FORM)
        .map(|form| {
            form.value()
                .attr("name")
                .or_else(|| form.value().attr("id"))
                .or_else(|| form.value().attr("action"))
                .unwrap_or("<anonymous>")
                .to_string()
        })
        .collect();
    let title = doc
        .select(&selectors::PAGE_TITLE)
        .next()
        .map(element_text)
        .unwrap_or_default();
    format!("title: '{title}', forms: [{}]", forms.join(", "))
}
