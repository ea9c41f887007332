use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const LATITUDE_FIELD: &str = "latitude";
pub const LONGITUDE_FIELD: &str = "longitude";

/// One address as submitted by a client. Field order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawAddressRecord {
    fields: Map<String, Value>,
}

impl RawAddressRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Non-object values carry no fields and fail keying.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            _ => Self::default(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

impl From<Value> for RawAddressRecord {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub(crate) fn new(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// A record augmented with the resolved coordinates.
///
/// Serializes as the record's fields in input order followed by `latitude`
/// and `longitude`. Coordinates are `f64`, so whole numbers are written as
/// `1.0` rather than `1`; clients comparing bytes instead of numbers will
/// see that difference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedAddress {
    #[serde(flatten)]
    fields: Map<String, Value>,
    pub latitude: f64,
    pub longitude: f64,
}

impl ValidatedAddress {
    pub fn new(record: RawAddressRecord, coordinates: Coordinates) -> Self {
        let mut fields = record.into_fields();
        fields.shift_remove(LATITUDE_FIELD);
        fields.shift_remove(LONGITUDE_FIELD);
        Self {
            fields,
            latitude: coordinates.lat,
            longitude: coordinates.lng,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn field_text(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(value_text)
    }
}

/// Outcome reported for one input record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemResult {
    Validated(ValidatedAddress),
    Failed {
        #[serde(rename = "errorMessage")]
        error_message: String,
    },
}

impl ItemResult {
    pub fn unresolved(key: &CanonicalKey) -> Self {
        ItemResult::Failed {
            error_message: format!("Could not get info for address {key}"),
        }
    }

    pub fn as_validated(&self) -> Option<&ValidatedAddress> {
        match self {
            ItemResult::Validated(address) => Some(address),
            ItemResult::Failed { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ItemResult::Validated(_) => None,
            ItemResult::Failed { error_message } => Some(error_message),
        }
    }
}

/// Text used for a field in keys and storage columns: strings verbatim,
/// everything else (`null` included) as its JSON text.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
