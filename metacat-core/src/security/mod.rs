//! Security utilities for connector credentials.
//!
//! # Security Guarantees
//! - Stored connector passwords are never cleartext: either null or the
//!   output of [`obfuscate`] keyed by the server-held datasource key
//! - Plaintext passwords in transit live in `Zeroizing` containers
//! - Connection strings are sanitized before they reach logs or errors

mod credentials;
mod obfuscate;

pub use credentials::Credentials;
pub use obfuscate::{deobfuscate, generate_datasource_key, obfuscate};
