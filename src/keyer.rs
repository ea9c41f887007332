use crate::address::{value_text, CanonicalKey, RawAddressRecord};
use crate::errors::ValidationError;

pub const ADDRESS_LINE_ONE: &str = "address_line_one";
pub const CITY: &str = "city";
pub const STATE: &str = "state";
pub const ZIP_CODE: &str = "zip_code";

/// Key order is part of the storage format; do not reorder.
pub const REQUIRED_FIELDS: [&str; 4] = [ADDRESS_LINE_ONE, CITY, STATE, ZIP_CODE];

const KEY_SEPARATOR: &str = ", ";

/// Builds the canonical lookup key `"<line_one>, <city>, <state>, <zip_code>"`.
///
/// Extra fields never influence the key. A field is missing only when its
/// name is absent; a present `null` is keyed as `null`. Fails with every
/// missing required field, in `REQUIRED_FIELDS` order.
pub fn canonical_key(record: &RawAddressRecord) -> Result<CanonicalKey, ValidationError> {
    let mut parts = Vec::with_capacity(REQUIRED_FIELDS.len());
    let mut missing = Vec::new();

    for field in REQUIRED_FIELDS {
        match record.get(field).map(value_text) {
            Some(text) => parts.push(text),
            None => missing.push(field.to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(ValidationError::MissingFields { fields: missing });
    }

    Ok(CanonicalKey::new(parts.join(KEY_SEPARATOR)))
}
