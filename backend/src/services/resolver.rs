use async_trait::async_trait;
use thiserror::Error;

use crate::models::AuthMethod;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Identifier could not be read")]
    Unreadable,
    #[error("Card number must be 6 to 10 digits")]
    MalformedCedula,
}

/// Turns whatever the capture client extracted from an image into a clean
/// patient identifier. The image processing itself lives on the client; the
/// server only normalizes and sanity-checks the extracted token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, raw: &str, method: AuthMethod) -> Result<String, IdentityError>;
}

/// Default resolver: trims, rejects empties, and enforces the cedula format
/// (6-10 digits, matching the registration rules).
pub struct PassthroughResolver;

#[async_trait]
impl IdentityResolver for PassthroughResolver {
    async fn resolve(&self, raw: &str, method: AuthMethod) -> Result<String, IdentityError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IdentityError::Unreadable);
        }
        if method == AuthMethod::Cedula {
            let digits = trimmed.len() >= 6
                && trimmed.len() <= 10
                && trimmed.chars().all(|c| c.is_ascii_digit());
            if !digits {
                return Err(IdentityError::MalformedCedula);
            }
        }
        Ok(trimmed.to_string())
    }
}
