use chrono::{DateTime, SecondsFormat, Utc};
use schemars::{json_schema, JsonSchema, Schema, SchemaGenerator};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;

/// Timestamp of a condition transition.
///
/// Two `VolatileTime`s always compare equal, so a status whose conditions
/// only differ in transition times is considered unchanged.
#[derive(Clone, Copy, Debug)]
pub struct VolatileTime(pub DateTime<Utc>);

impl VolatileTime {
    pub fn now() -> Self {
        VolatileTime(Utc::now())
    }
}

impl PartialEq for VolatileTime {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl From<DateTime<Utc>> for VolatileTime {
    fn from(dt: DateTime<Utc>) -> Self {
        VolatileTime(dt)
    }
}

impl Serialize for VolatileTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // metav1.Time has second precision
        serializer.serialize_str(&self.0.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

impl<'de> Deserialize<'de> for VolatileTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| VolatileTime(dt.with_timezone(&Utc)))
            .map_err(de::Error::custom)
    }
}

impl JsonSchema for VolatileTime {
    fn schema_name() -> Cow<'static, str> {
        "VolatileTime".into()
    }

    fn json_schema(_: &mut SchemaGenerator) -> Schema {
        json_schema!({ "type": "string", "format": "date-time" })
    }
}
