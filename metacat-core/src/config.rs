//! Service configuration.
//!
//! The only process-wide state in the core is captured here: the catalog
//! store URL, the server-held datasource key used to obfuscate connector
//! passwords (read-only after startup), and the time bound applied to live
//! probes and introspection.

use std::time::Duration;

use crate::error::{CatalogError, Result};

/// Environment variable naming the catalog's own store.
pub const DATABASE_URL_VAR: &str = "METACAT_DATABASE_URL";
/// Environment variable holding the datasource obfuscation key.
pub const DATASOURCE_KEY_VAR: &str = "METACAT_DATASOURCE_KEY";
/// Environment variable bounding live probe/introspection calls, in seconds.
pub const PROBE_TIMEOUT_VAR: &str = "METACAT_PROBE_TIMEOUT_SECS";

const DEFAULT_DATABASE_URL: &str = "sqlite://metacat.db";
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_PROBE_TIMEOUT_SECS: u64 = 300;

/// Runtime settings for the catalog service.
#[derive(Debug, Clone)]
pub struct Settings {
    /// SQLite URL for the catalog's own store.
    pub database_url: String,
    /// Key for connector password obfuscation. When absent, passwords are
    /// persisted as null rather than stored in cleartext.
    pub datasource_key: Option<String>,
    /// Upper bound for connection tests and live schema introspection. An
    /// unresponsive target store must not stall the service indefinitely.
    pub probe_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            datasource_key: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl Settings {
    /// Loads settings from the environment, falling back to defaults.
    ///
    /// # Errors
    /// Returns a configuration error if the probe timeout is present but
    /// unparseable or outside `1..=300` seconds.
    pub fn from_env() -> Result<Self> {
        let database_url =
            std::env::var(DATABASE_URL_VAR).unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let datasource_key = std::env::var(DATASOURCE_KEY_VAR)
            .ok()
            .filter(|k| !k.is_empty());
        if datasource_key.is_none() {
            tracing::warn!(
                "{} not set - connector passwords will be persisted as null",
                DATASOURCE_KEY_VAR
            );
        }

        let probe_timeout = match std::env::var(PROBE_TIMEOUT_VAR) {
            Ok(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    CatalogError::configuration(format!(
                        "{} must be an integer number of seconds",
                        PROBE_TIMEOUT_VAR
                    ))
                })?;
                if secs == 0 || secs > MAX_PROBE_TIMEOUT_SECS {
                    return Err(CatalogError::configuration(format!(
                        "{} must be between 1 and {} seconds",
                        PROBE_TIMEOUT_VAR, MAX_PROBE_TIMEOUT_SECS
                    )));
                }
                Duration::from_secs(secs)
            }
            Err(_) => DEFAULT_PROBE_TIMEOUT,
        };

        Ok(Self {
            database_url,
            datasource_key,
            probe_timeout,
        })
    }
}
