//! Reversible password obfuscation for connector credentials at rest.
//!
//! This is a byte-wise XOR against a repeating key-byte sequence,
//! base64-encoded for storage. It is deliberately not a cryptographic
//! primitive: the contract is that the same key recovers the same
//! plaintext, and a wrong or missing key yields `None` rather than an
//! error. Callers that need real secrecy must hold the datasource key
//! outside the store.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::Rng;

/// Obfuscates a plaintext password with the server-held datasource key.
///
/// Returns `None` when either the password or the key is empty; the store
/// persists null in that case.
pub fn obfuscate(password: &str, key: &str) -> Option<String> {
    if password.is_empty() || key.is_empty() {
        return None;
    }

    let key_bytes = key.as_bytes();
    let mixed: Vec<u8> = password
        .as_bytes()
        .iter()
        .enumerate()
        .map(|(i, b)| b ^ key_bytes[i % key_bytes.len()])
        .collect();

    Some(BASE64.encode(mixed))
}

/// Recovers the plaintext password from its stored form.
///
/// Any failure (absent key, malformed base64, non-UTF-8 result under a
/// wrong key) yields `None`, never an error.
pub fn deobfuscate(stored: &str, key: &str) -> Option<String> {
    if stored.is_empty() || key.is_empty() {
        return None;
    }

    let decoded = BASE64.decode(stored).ok()?;
    let key_bytes = key.as_bytes();
    let plain: Vec<u8> = decoded
        .iter()
        .enumerate()
        .map(|(i, b)| b ^ key_bytes[i % key_bytes.len()])
        .collect();

    String::from_utf8(plain).ok()
}

/// Generates a random datasource key of lowercase letters and digits.
///
/// Used by operators to seed `METACAT_DATASOURCE_KEY`; the service itself
/// never generates or rotates the key.
pub fn generate_datasource_key(length: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..length)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_obfuscate_round_trip() {
        let cases = [
            ("hunter2", "k3y"),
            ("p@ssw0rd with spaces", "longer-key-than-password"),
            ("短密码", "key"),
        ];
        for (password, key) in cases {
            let stored = obfuscate(password, key).unwrap();
            assert_ne!(stored, password);
            assert_eq!(deobfuscate(&stored, key).as_deref(), Some(password));
        }
    }

    #[test]
    fn test_different_keys_differ() {
        let a = obfuscate("same-password", "key-one").unwrap();
        let b = obfuscate("same-password", "key-two").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_inputs_yield_none() {
        assert_eq!(obfuscate("", "key"), None);
        assert_eq!(obfuscate("password", ""), None);
        assert_eq!(deobfuscate("", "key"), None);
        assert_eq!(deobfuscate("stored", ""), None);
    }

    #[test]
    fn test_malformed_stored_value_yields_none() {
        assert_eq!(deobfuscate("not base64 !!!", "key"), None);
    }

    #[test]
    fn test_wrong_key_never_recovers_plaintext() {
        let stored = obfuscate("top-secret", "right-key").unwrap();
        let recovered = deobfuscate(&stored, "wrong-key");
        // Wrong key either fails UTF-8 validation or produces garbage;
        // it must never round-trip to the original.
        assert_ne!(recovered.as_deref(), Some("top-secret"));
    }

    #[test]
    fn test_generate_datasource_key() {
        let key = generate_datasource_key(32);
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
