use crate::{
    api::{translate, LogGroupList, LogRecord},
    error::Error,
    ingest::{HttpIngestion, LogIngestion},
    model::TraceBatch,
};
use log::{debug, trace, warn};
use serde::Deserialize;
use std::fmt;

/// Request metadata key carrying an alternative topic id.
pub const TRACE_TOPIC_KEY: &str = "tracetopic";
/// Request metadata key carrying an alternative access key.
pub const ACCESS_KEY_KEY: &str = "ak";
/// Request metadata key carrying an alternative secret key.
pub const SECRET_KEY_KEY: &str = "sk";
/// Request metadata key carrying an alternative region.
pub const REGION_KEY: &str = "region";

/// A secret that never shows up in `Debug` or `Display` output.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(secret: impl Into<String>) -> Self {
        SecretKey(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SecretKey {
    fn from(secret: &str) -> Self {
        SecretKey::new(secret)
    }
}

impl From<String> for SecretKey {
    fn from(secret: String) -> Self {
        SecretKey(secret)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Configuration settings for the uploader.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// TLS endpoint, e.g. `https://tls-cn-beijing.volces.com`
    pub endpoint: String,
    /// TLS topic id receiving the trace records
    pub topic_id: String,
    /// Volcengine access key
    pub access_key: String,
    /// Volcengine secret key
    pub secret_key: SecretKey,
    /// Volcengine region
    pub region: String,
}

impl Config {
    /// Fails with [`Error::Configuration`] naming every empty field.
    pub fn validate(&self) -> Result<(), Error> {
        let missing: Vec<&str> = [
            ("Endpoint", self.endpoint.is_empty()),
            ("TopicID", self.topic_id.is_empty()),
            ("AccessKey", self.access_key.is_empty()),
            ("SecretKey", self.secret_key.is_empty()),
            ("Region", self.region.is_empty()),
        ]
        .into_iter()
        .filter(|(_, empty)| *empty)
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Configuration(missing.join(", ")))
        }
    }
}

/// Topic and credentials used for one submission.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Credentials {
    pub topic_id: String,
    pub access_key: String,
    pub secret_key: SecretKey,
    pub region: String,
}

/// Fully resolved target of one `PutLogs` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Destination {
    pub endpoint: String,
    pub credentials: Credentials,
}

/// Per-call replacement for the default topic and credentials.
///
/// It only takes effect when all four fields are present; otherwise the
/// defaults are used in full. The endpoint can not be overridden.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DestinationOverride {
    pub topic_id: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<SecretKey>,
    pub region: Option<String>,
}

impl DestinationOverride {
    pub fn new(
        topic_id: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<SecretKey>,
        region: impl Into<String>,
    ) -> Self {
        DestinationOverride {
            topic_id: Some(topic_id.into()),
            access_key: Some(access_key.into()),
            secret_key: Some(secret_key.into()),
            region: Some(region.into()),
        }
    }

    /// Picks the override out of request metadata using [`TRACE_TOPIC_KEY`],
    /// [`ACCESS_KEY_KEY`], [`SECRET_KEY_KEY`] and [`REGION_KEY`]. Unknown
    /// keys are ignored; a repeated key keeps its last value.
    pub fn from_metadata<I, K, V>(metadata: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut found = DestinationOverride::default();
        for (key, value) in metadata {
            match key.as_ref() {
                TRACE_TOPIC_KEY => found.topic_id = Some(value.into()),
                ACCESS_KEY_KEY => found.access_key = Some(value.into()),
                SECRET_KEY_KEY => found.secret_key = Some(SecretKey(value.into())),
                REGION_KEY => found.region = Some(value.into()),
                _ => {}
            }
        }
        found
    }

    /// The replacement credentials, if and only if all four are present.
    pub fn credentials(&self) -> Option<Credentials> {
        match (
            &self.topic_id,
            &self.access_key,
            &self.secret_key,
            &self.region,
        ) {
            (Some(topic_id), Some(access_key), Some(secret_key), Some(region)) => {
                Some(Credentials {
                    topic_id: topic_id.clone(),
                    access_key: access_key.clone(),
                    secret_key: secret_key.clone(),
                    region: region.clone(),
                })
            }
            _ => None,
        }
    }
}

/// Uploads translated trace records to a TLS topic.
///
/// Holds the endpoint and default credentials; nothing else changes between
/// calls, so one instance can be shared across threads.
pub struct Uploader {
    endpoint: String,
    defaults: Credentials,
    ingestion: Box<dyn LogIngestion>,
}

impl fmt::Debug for Uploader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Uploader")
            .field("endpoint", &self.endpoint)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl Uploader {
    pub fn new(config: Config, ingestion: impl LogIngestion + 'static) -> Result<Uploader, Error> {
        config.validate()?;

        Ok(Uploader {
            endpoint: config.endpoint,
            defaults: Credentials {
                topic_id: config.topic_id,
                access_key: config.access_key,
                secret_key: config.secret_key,
                region: config.region,
            },
            ingestion: Box::new(ingestion),
        })
    }

    /// Uploader backed by [`HttpIngestion`].
    pub fn with_http(config: Config) -> Result<Uploader, Error> {
        Self::new(config, HttpIngestion::new())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn default_credentials(&self) -> &Credentials {
        &self.defaults
    }

    /// Applies `destination_override` all-or-nothing over the defaults.
    pub fn resolve(&self, destination_override: Option<&DestinationOverride>) -> Destination {
        let credentials = match destination_override.and_then(DestinationOverride::credentials) {
            Some(credentials) => {
                debug!(
                    "Using per-call destination topic {} in region {}",
                    credentials.topic_id, credentials.region
                );
                credentials
            }
            None => self.defaults.clone(),
        };

        Destination {
            endpoint: self.endpoint.clone(),
            credentials,
        }
    }

    /// Sends every record in a single `PutLogs` call. No retry is attempted;
    /// a failure is returned to the caller as is.
    pub fn submit(
        &self,
        records: Vec<LogRecord>,
        destination_override: Option<&DestinationOverride>,
    ) -> Result<(), Error> {
        let destination = self.resolve(destination_override);
        let logs = LogGroupList::single(records);

        trace!(
            "Putting {} records to topic {}",
            logs.record_count(),
            destination.credentials.topic_id
        );

        self.ingestion.put_logs(&destination, &logs).map_err(|err| {
            warn!(
                "error sending traces to volcengine tls topic {}: {}",
                destination.credentials.topic_id, err
            );
            Error::Transmission(err)
        })
    }

    /// Translates `batch` and submits the result.
    pub fn export(
        &self,
        batch: &TraceBatch,
        destination_override: Option<&DestinationOverride>,
    ) -> Result<(), Error> {
        self.submit(translate(batch), destination_override)
    }
}
