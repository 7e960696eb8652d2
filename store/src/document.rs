//! Schemaless documents and the typed-record codec.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::StoreError;

/// A datastore document: a JSON object with sorted keys.
pub type Document = serde_json::Map<String, Value>;

/// Encode a typed record as a document.
///
/// Fails if the record does not serialize to a JSON object.
pub fn to_document<T: Serialize>(record: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// Decode a document into a typed record.
pub fn from_document<T: DeserializeOwned>(document: Document) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(document))?)
}
