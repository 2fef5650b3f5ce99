//! Locale-aware currency parsing.
//!
//! The storefront renders amounts differently per locale: `$1,234.56`,
//! `EUR 1.234,56`, `1 234,56 €`, parenthesized or minus-prefixed refunds.
//! Amounts are decimals, never floats. Ambiguous grouping is resolved by
//! treating the last separator as the decimal point when it is followed by
//! one or two digits.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// A parsed monetary amount with its currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Money {
    /// Signed amount; refunds and credits are negative.
    pub amount: Decimal,
    /// ISO currency code derived from the symbol or code in the text.
    pub currency: String,
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

/// Errors raised while parsing a monetary amount.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    /// The text contained no parseable amount.
    #[error("unparseable amount: '{text}'")]
    Unparseable {
        /// The offending input.
        text: String,
    },
}

/// Currency symbols the storefront renders, mapped to ISO codes.
const SYMBOLS: [(&str, &str); 4] = [("$", "USD"), ("€", "EUR"), ("£", "GBP"), ("¥", "JPY")];

/// ISO codes accepted as bare tokens before or after the amount.
const CODES: [&str; 6] = ["USD", "EUR", "GBP", "JPY", "CAD", "AUD"];

/// Parses a rendered amount into a [`Money`].
///
/// # Errors
///
/// Returns [`MoneyError::Unparseable`] when no digits survive
/// normalization or the normalized digits do not form a decimal.
pub fn parse_money(text: &str) -> Result<Money, MoneyError> {
    let original = text;
    let text = text.replace('\u{a0}', " ");
    let trimmed = text.trim();

    let unparseable = || MoneyError::Unparseable {
        text: original.trim().to_string(),
    };

    // Parenthesized amounts are negative postings.
    let (trimmed, paren_negative) =
        if let Some(inner) = trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
            (inner.trim(), true)
        } else {
            (trimmed, false)
        };

    let currency = detect_currency(trimmed);

    // Strip everything that is not a digit, separator, or sign, then decide
    // which separator is the decimal point.
    let numeric: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    let negative = paren_negative || numeric.starts_with('-');
    let digits: String = numeric.chars().filter(|c| *c != '-').collect();
    if !digits.chars().any(|c| c.is_ascii_digit()) {
        return Err(unparseable());
    }

    let normalized = normalize_separators(&digits);
    let mut amount = Decimal::from_str(&normalized).map_err(|_| unparseable())?;
    if negative {
        amount = -amount;
    }

    Ok(Money { amount, currency })
}

/// Picks the currency from a symbol or ISO code in the text; the storefront
/// default applies when neither is present.
fn detect_currency(text: &str) -> String {
    for (symbol, code) in SYMBOLS {
        if text.contains(symbol) {
            return code.to_string();
        }
    }
    for code in CODES {
        let has_code = text
            .split(|c: char| !c.is_ascii_alphabetic())
            .any(|token| token == code);
        if has_code {
            return code.to_string();
        }
    }
    "USD".to_string()
}

/// Rewrites `1.234,56` / `1,234.56` / `1,234` digit strings into a plain
/// decimal literal.
fn normalize_separators(digits: &str) -> String {
    let last_dot = digits.rfind('.');
    let last_comma = digits.rfind(',');

    let decimal_sep = match (last_dot, last_comma) {
        // Both present: the later one is the decimal point.
        (Some(dot), Some(comma)) => Some(if dot > comma { '.' } else { ',' }),
        // A lone comma is decimal only when followed by 1-2 digits;
        // `1,234` is grouping.
        (None, Some(comma)) => {
            let fractional = digits.len() - comma - 1;
            ((1..=2).contains(&fractional)).then_some(',')
        }
        // A lone dot is decimal unless it reads as grouping with exactly 3
        // trailing digits and a longer integer part is implied elsewhere;
        // storefront prices always carry decimals, so treat it as decimal.
        (Some(_), None) => Some('.'),
        (None, None) => None,
    };

    let mut out = String::with_capacity(digits.len());
    for c in digits.chars() {
        match c {
            '.' | ',' if Some(c) != decimal_sep => {}
            '.' | ',' => out.push('.'),
            _ => out.push(c),
        }
    }
    out
}
