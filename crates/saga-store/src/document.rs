use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::CorrelationId;

/// Version token of a saga document, used for optimistic concurrency control.
///
/// A document that has never been saved is at version 0; every successful
/// save moves it to the next version.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) of a document that does not exist yet.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the version (1) of a freshly created document.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// One persisted saga, keyed by its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaDocument {
    /// The saga this document belongs to.
    pub correlation_id: CorrelationId,

    /// The kind of saga (e.g., "PurchaseSaga").
    pub saga_type: String,

    /// Version of the document as stored.
    pub version: Version,

    /// The saga state as JSON.
    pub data: serde_json::Value,

    /// When the document was last written.
    pub updated_at: DateTime<Utc>,
}

impl SagaDocument {
    /// Creates a document holding the serialized form of `state`.
    ///
    /// The version is left at [`Version::initial`]; the store assigns the
    /// real version on save.
    pub fn new<T: Serialize>(
        correlation_id: CorrelationId,
        saga_type: impl Into<String>,
        state: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            correlation_id,
            saga_type: saga_type.into(),
            version: Version::initial(),
            data: serde_json::to_value(state)?,
            updated_at: Utc::now(),
        })
    }

    /// Deserializes the saga state held in this document.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}
