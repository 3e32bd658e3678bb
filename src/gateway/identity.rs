//! Identity provider boundary.
//!
//! The auth handler asks an [`IdentityVerifier`] to vouch for the Telegram
//! payload before touching any account. Deployments that validate the
//! provider's signed init data plug their own implementation in here.

use crate::protocol::TelegramAuthRequest;

pub trait IdentityVerifier: Send + Sync {
    /// `Err(message)` rejects the request with a validation failure.
    fn verify(&self, request: &TelegramAuthRequest) -> Result<(), String>;
}

/// Accepts every payload with a positive id and a non-empty first name.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl IdentityVerifier for AcceptAll {
    fn verify(&self, request: &TelegramAuthRequest) -> Result<(), String> {
        if request.id <= 0 {
            return Err("Invalid Telegram user ID".to_string());
        }
        if request.first_name.trim().is_empty() {
            return Err("first_name is required".to_string());
        }
        Ok(())
    }
}
