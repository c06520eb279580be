//! Contact-address handling shared by assignment resolution and invites.

use super::errors::BoardError;

/// Trim and lower-case an address so it can be compared for equality.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalize `raw` and reject anything that is not shaped like
/// `local@domain.tld`.
pub fn validate_email(raw: &str) -> Result<String, BoardError> {
    let email = normalize_email(raw);
    let malformed = || BoardError::validation(format!("malformed email: {raw:?}"));

    if email.chars().any(char::is_whitespace) {
        return Err(malformed());
    }
    let (local, domain) = email.split_once('@').ok_or_else(malformed)?;
    if local.is_empty() || domain.contains('@') {
        return Err(malformed());
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return Err(malformed());
    };
    if host.is_empty() || tld.is_empty() {
        return Err(malformed());
    }
    Ok(email)
}
