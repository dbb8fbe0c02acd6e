//! Recipient address masking for logs and unprivileged status reads

/// Hides recipient addresses from callers that may not see them
pub trait Redactor: std::fmt::Debug + Send + Sync {
    fn mask_email(&self, raw: &str) -> String;

    /// Replace every occurrence of `email` in free text (e.g. a provider
    /// error message) with its masked form.
    fn mask_detail(&self, detail: &str, email: &str) -> String {
        if email.is_empty() {
            detail.to_string()
        } else {
            detail.replace(email, &self.mask_email(email))
        }
    }
}

/// Keeps the first and last character of the local part: `a***z@domain`
#[derive(Debug, Clone, Copy, Default)]
pub struct MaskingRedactor;

impl Redactor for MaskingRedactor {
    fn mask_email(&self, raw: &str) -> String {
        mask_email(raw)
    }
}

/// Mask the local part of `raw`, leaving the domain readable.
///
/// Local parts of one or two characters are fully starred. Input without an
/// `@` is returned unchanged.
pub fn mask_email(raw: &str) -> String {
    let Some((local, domain)) = raw.split_once('@') else {
        return raw.to_string();
    };

    let mut chars = local.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) if local.chars().count() > 2 => {
            format!("{first}***{last}@{domain}")
        }
        _ => format!("{}@{domain}", "*".repeat(local.chars().count())),
    }
}
