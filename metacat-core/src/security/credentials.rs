//! Secure credential container with automatic memory zeroing.
//!
//! Plaintext passwords exist only while building a live connection URL for
//! a probe or introspection call. Wrapping them in `Zeroizing` clears the
//! memory as soon as the container goes out of scope.

use zeroize::{Zeroize, Zeroizing};

/// Credential pair for a live connector handshake.
///
/// # Example
///
/// ```rust
/// use metacat_core::security::Credentials;
///
/// let creds = Credentials::new("reader".to_string(), Some("secret".to_string()));
/// assert_eq!(creds.username(), "reader");
/// assert!(creds.has_password());
/// // Password memory is zeroed when `creds` is dropped
/// ```
#[derive(Debug, Clone, Zeroize)]
#[zeroize(drop)]
pub struct Credentials {
    username: Zeroizing<String>,
    password: Zeroizing<Option<String>>,
}

impl Credentials {
    /// Creates new credentials with automatic memory zeroing.
    pub fn new(username: String, password: Option<String>) -> Self {
        Self {
            username: Zeroizing::new(username),
            password: Zeroizing::new(password),
        }
    }

    /// Gets the username (still protected by `Zeroizing`).
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Gets the password, if present.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Checks whether a password is present without exposing it.
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_new() {
        let creds = Credentials::new("reader".to_string(), Some("secret".to_string()));
        assert_eq!(creds.username(), "reader");
        assert_eq!(creds.password(), Some("secret"));
        assert!(creds.has_password());
    }

    #[test]
    fn test_credentials_no_password() {
        let creds = Credentials::new("reader".to_string(), None);
        assert!(!creds.has_password());
        assert_eq!(creds.password(), None);
    }
}
