//! MongoDB connection configuration.

use std::{path::PathBuf, time::Duration};

use mongodb::options::{ClientOptions, Tls, TlsOptions};
use serde::Deserialize;

use docmap_core::error::{DocumentError, DocumentResult};

fn default_retry_wait() -> u64 {
    5
}

fn default_retry_max() -> u32 {
    10
}

/// Connection settings for a [`MongoProvider`](crate::MongoProvider).
///
/// Deserializable from any serde source, so it can sit inside an application's
/// own configuration file:
///
/// ```ignore
/// let config: MongoConfig = serde_json::from_str(r#"{ "uri": "mongodb://localhost/shop" }"#)?;
/// let provider = MongoProviderBuilder::from(config).connect().await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoConfig {
    /// MongoDB connection URI.
    pub uri: String,
    /// Database name. Falls back to the default database named in the URI.
    #[serde(default)]
    pub database: Option<String>,
    /// Seconds to wait between connection attempts.
    #[serde(default = "default_retry_wait")]
    pub connection_retry_wait: u64,
    /// Maximum number of connection attempts. `0` is treated as `1`.
    #[serde(default = "default_retry_max")]
    pub connection_retry_max: u32,
    /// CA certificate used for TLS in production. Restricts the pool to one connection.
    #[serde(default)]
    pub cert_file: Option<PathBuf>,
    /// Whether this is a production deployment.
    #[serde(default)]
    pub production: bool,
    /// Application name reported to the server.
    #[serde(default)]
    pub app_name: Option<String>,
}

impl MongoConfig {
    /// Creates a configuration for `uri` with default retry settings.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: None,
            connection_retry_wait: default_retry_wait(),
            connection_retry_max: default_retry_max(),
            cert_file: None,
            production: false,
            app_name: None,
        }
    }

    /// Pause between connection attempts.
    pub fn retry_wait(&self) -> Duration {
        Duration::from_secs(self.connection_retry_wait)
    }

    /// Number of connection attempts, never less than one.
    pub fn retry_attempts(&self) -> u32 {
        self.connection_retry_max.max(1)
    }

    /// Parses the URI and applies the TLS and application settings.
    ///
    /// The certificate is only honoured for production deployments.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Initialization`] when the URI cannot be parsed.
    pub async fn to_client_options(&self) -> DocumentResult<ClientOptions> {
        let mut options = ClientOptions::parse(&self.uri)
            .await
            .map_err(|e| DocumentError::Initialization(format!("failed to parse URI: {e}")))?;

        if let Some(app_name) = &self.app_name {
            options.app_name = Some(app_name.clone());
        }

        if let (true, Some(cert_file)) = (self.production, &self.cert_file) {
            let mut tls = TlsOptions::default();
            tls.ca_file_path = Some(cert_file.clone());

            options.tls = Some(Tls::Enabled(tls));
            options.max_pool_size = Some(1);
        }

        Ok(options)
    }

    /// Resolves the database name, preferring the explicit setting over the URI default.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Initialization`] when neither names a database.
    pub fn database_name(&self, options: &ClientOptions) -> DocumentResult<String> {
        self.database
            .clone()
            .or_else(|| options.default_database.clone())
            .ok_or_else(|| DocumentError::Initialization("no database named in config or URI".to_string()))
    }
}
