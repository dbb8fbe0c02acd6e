//! Recipient address normalisation
//!
//! Suppression lookups and dispatch both compare addresses in this form, so
//! `" Alice@Example.COM "` and `"alice@example.com"` are the same recipient.

use thiserror::Error;

/// An address that cannot be used as a recipient
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidEmail {
    #[error("Email address is empty")]
    Empty,

    #[error("Email address {0:?} has no '@'")]
    MissingAt(String),

    #[error("Email address {0:?} has an empty local part or domain")]
    EmptyPart(String),

    #[error("Email address {0:?} contains whitespace")]
    Whitespace(String),
}

/// Trim surrounding whitespace and lower-case the whole address.
///
/// # Errors
///
/// Returns [`InvalidEmail`] when the result is empty, has no `@`, has an
/// empty local part or domain, or contains inner whitespace.
pub fn normalize_email(raw: &str) -> Result<String, InvalidEmail> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(InvalidEmail::Empty);
    }

    let normalized = trimmed.to_lowercase();
    if normalized.chars().any(char::is_whitespace) {
        return Err(InvalidEmail::Whitespace(normalized));
    }

    let Some((local, domain)) = normalized.rsplit_once('@') else {
        return Err(InvalidEmail::MissingAt(normalized));
    };

    if local.is_empty() || domain.is_empty() {
        return Err(InvalidEmail::EmptyPart(normalized));
    }

    Ok(normalized)
}
