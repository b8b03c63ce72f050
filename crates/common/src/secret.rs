//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used across Huddle. Room passwords and
//! database URLs travel as [`SecretString`] so that deriving `Debug` on a
//! request or config struct never prints them, and tracing fields built from
//! `{:?}` stay safe.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct JoinAttempt {
//!     identity: String,
//!     password: Option<SecretString>,
//! }
//!
//! let attempt = JoinAttempt {
//!     identity: "user0000000000000000001".to_string(),
//!     password: Some(SecretString::from("abc123")),
//! };
//!
//! assert!(!format!("{attempt:?}").contains("abc123"));
//! assert_eq!(attempt.password.as_ref().map(|p| p.expose_secret()), Some("abc123"));
//! ```
//!
//! With the `serde` feature the secrets deserialize straight from JSON request
//! bodies, so handlers never hold the plain text in a `String`.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("abc123");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("abc123"));
    }

    #[test]
    fn test_optional_password_deserializes() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct JoinBody {
            identity: String,
            #[serde(default)]
            password: Option<SecretString>,
        }

        let with: JoinBody =
            serde_json::from_str(r#"{"identity": "a", "password": "room-pass"}"#).unwrap();
        assert_eq!(
            with.password.as_ref().map(ExposeSecret::expose_secret),
            Some("room-pass")
        );
        assert!(!format!("{with:?}").contains("room-pass"));

        let without: JoinBody = serde_json::from_str(r#"{"identity": "a"}"#).unwrap();
        assert!(without.password.is_none());
    }
}
