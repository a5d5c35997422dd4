use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::kms::client::EncryptionContext;

/// The persisted form of a master key inside an encrypted document.
///
/// Field names are a compatibility contract with documents already on disk:
/// `arn`, `created_at`, `enc` and, when non-empty, `context`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterKeyRecord {
    pub arn: String,

    #[serde(with = "rfc3339_seconds")]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub enc: String,

    #[serde(default, skip_serializing_if = "EncryptionContext::is_empty")]
    pub context: EncryptionContext,
}

impl MasterKeyRecord {
    /// Converts the record into the generic map a host document stores
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("arn".to_string(), Value::String(self.arn.clone()));
        map.insert(
            "created_at".to_string(),
            Value::String(format_created_at(&self.created_at)),
        );
        map.insert("enc".to_string(), Value::String(self.enc.clone()));
        if !self.context.is_empty() {
            let context = self
                .context
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            map.insert("context".to_string(), Value::Object(context));
        }
        map
    }

    /// Restores a record from a stored map
    pub fn from_map(map: &Map<String, Value>) -> Result<Self> {
        Self::try_from(Value::Object(map.clone()))
    }
}

impl TryFrom<Value> for MasterKeyRecord {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::InvalidRecord(e.to_string()))
    }
}

pub(crate) fn format_created_at(created_at: &DateTime<Utc>) -> String {
    created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

mod rfc3339_seconds {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_created_at(value))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let value = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
