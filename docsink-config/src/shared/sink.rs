use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::shared::ValidationError;

/// Port assumed for document store uris that carry no explicit port.
pub const DEFAULT_DRIVER_PORT: u16 = 28015;

/// Port assumed for `redis://` uris that carry no explicit port.
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Policy applied when dropping or recreating the target collection fails while a session is
/// being opened.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    /// Log the failure and hand out the session anyway. The collection may then hold stale
    /// documents or be missing entirely.
    #[default]
    BestEffort,
    /// Abort opening the session on the first drop or create failure.
    FailFast,
}

/// Configuration of the sink target.
///
/// This intentionally does not implement [`Serialize`] to avoid accidentally leaking the
/// password into serialized forms.
#[derive(Clone, Debug, Deserialize)]
pub struct SinkConfig {
    /// Uri of the store, e.g. `redis://localhost:6379`. The scheme selects the store driver.
    pub uri: String,
    /// Target of the sink in the form `database.collection`.
    pub namespace: String,
    /// Emits connection, reset and acknowledgment diagnostics at `info` level.
    #[serde(default)]
    pub debug: bool,
    /// What to do when the collection reset fails during session setup.
    #[serde(default)]
    pub reset_policy: ResetPolicy,
    /// Optional user name for stores that require authentication.
    #[serde(default)]
    pub username: Option<String>,
    /// Optional password for stores that require authentication.
    #[serde(default)]
    pub password: Option<SecretString>,
}

impl SinkConfig {
    /// Creates a configuration with default debug, reset and authentication settings.
    pub fn new(uri: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            namespace: namespace.into(),
            debug: false,
            reset_policy: ResetPolicy::default(),
            username: None,
            password: None,
        }
    }

    /// Validates the uri and the namespace.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.address()?;
        self.split_namespace()?;

        Ok(())
    }

    /// Parses the configured uri.
    pub fn parsed_uri(&self) -> Result<Url, ValidationError> {
        Url::parse(&self.uri).map_err(|err| ValidationError::InvalidUri {
            uri: self.uri.clone(),
            reason: err.to_string(),
        })
    }

    /// Returns the uri scheme, lowercased by the parser.
    pub fn scheme(&self) -> Result<String, ValidationError> {
        Ok(self.parsed_uri()?.scheme().to_owned())
    }

    /// Returns the `host:port` address of the store.
    ///
    /// When the uri has no port, [`DEFAULT_REDIS_PORT`] is used for `redis` and
    /// [`DEFAULT_DRIVER_PORT`] for every other scheme.
    pub fn address(&self) -> Result<String, ValidationError> {
        let uri = self.parsed_uri()?;

        let host = match uri.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => return Err(ValidationError::MissingHost(self.uri.clone())),
        };
        let port = uri.port().unwrap_or(match uri.scheme() {
            "redis" => DEFAULT_REDIS_PORT,
            _ => DEFAULT_DRIVER_PORT,
        });

        Ok(format!("{host}:{port}"))
    }

    /// Splits the namespace into its database and collection parts.
    ///
    /// The split happens on the first `.`, so collection names may contain dots.
    pub fn split_namespace(&self) -> Result<(&str, &str), ValidationError> {
        match self.namespace.split_once('.') {
            Some((database, collection)) if !database.is_empty() && !collection.is_empty() => {
                Ok((database, collection))
            }
            _ => Err(ValidationError::MalformedNamespace(self.namespace.clone())),
        }
    }
}
