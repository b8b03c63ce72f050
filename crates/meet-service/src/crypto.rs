//! Room password hashing.
//!
//! Passwords are hashed with bcrypt on creation and verified on admission.
//! Both run on the blocking pool so a slow hash never stalls the runtime.

use crate::errors::MeetError;

use common::secret::{ExposeSecret, SecretString};
use tracing::instrument;

/// Lowest accepted bcrypt cost.
pub const MIN_BCRYPT_COST: u32 = 4;

/// Highest accepted bcrypt cost.
pub const MAX_BCRYPT_COST: u32 = 14;

/// Default bcrypt cost for room passwords.
pub const DEFAULT_BCRYPT_COST: u32 = 10;

/// Hash a room password.
///
/// # Errors
///
/// Returns `MeetError::Internal` if the cost is out of range or hashing fails.
#[instrument(skip_all)]
pub async fn hash_password(password: &SecretString, cost: u32) -> Result<String, MeetError> {
    if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
        return Err(MeetError::Internal(format!(
            "Invalid bcrypt cost: {cost} (must be {MIN_BCRYPT_COST}-{MAX_BCRYPT_COST})"
        )));
    }

    let password = password.expose_secret().to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| MeetError::Internal(format!("Password hashing task failed: {e}")))?
        .map_err(|e| MeetError::Internal(format!("Password hashing failed: {e}")))
}

/// Verify a supplied password against a stored hash.
///
/// # Errors
///
/// Returns `MeetError::Internal` if the stored hash is malformed.
#[instrument(skip_all)]
pub async fn verify_password(password: &SecretString, hash: &str) -> Result<bool, MeetError> {
    let password = password.expose_secret().to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| MeetError::Internal(format!("Password verification task failed: {e}")))?
        .map_err(|e| MeetError::Internal(format!("Password verification failed: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_then_verify() {
        let password = SecretString::from("abc123");
        let hash = hash_password(&password, MIN_BCRYPT_COST).await.unwrap();

        assert!(hash.starts_with("$2"));
        assert!(!hash.contains("abc123"));
        assert!(verify_password(&password, &hash).await.unwrap());
        assert!(!verify_password(&SecretString::from("abc124"), &hash)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_cost_out_of_range_rejected() {
        let password = SecretString::from("abc123");
        assert!(hash_password(&password, 3).await.is_err());
        assert!(hash_password(&password, 15).await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_hash_is_an_error() {
        let password = SecretString::from("abc123");
        assert!(verify_password(&password, "not-a-hash").await.is_err());
    }
}
