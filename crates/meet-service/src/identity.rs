//! Identity format validation.
//!
//! Identities are issued and authenticated by an external provider; this
//! service only checks that a supplied identifier has the provider's shape
//! before trusting it.

/// Minimum length of an external account identifier.
pub const MIN_IDENTITY_LENGTH: usize = 20;

/// Returns true if `identifier` is an ASCII alphanumeric string of at least
/// [`MIN_IDENTITY_LENGTH`] characters.
#[must_use]
pub fn validate(identifier: &str) -> bool {
    identifier.len() >= MIN_IDENTITY_LENGTH
        && identifier.bytes().all(|b| b.is_ascii_alphanumeric())
}
