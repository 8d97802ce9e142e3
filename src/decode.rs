//! YAML-or-JSON document decoding
//!
//! Documents are accepted in either encoding without the caller saying
//! which: the first non-whitespace byte inside the sniffing window decides.
//! Everything is decoded into `serde_json::Value` first and then into the
//! typed resource, so both encodings share one deserialization path.

use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::resource::ResourceKind;
use crate::{Error, DEFAULT_BUFFER_SIZE};

/// Type and identity header shared by every resource document
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceHeader {
    /// API version (e.g., "apps/v1")
    #[serde(default)]
    pub api_version: String,
    /// Resource kind (e.g., "Deployment")
    #[serde(default)]
    pub kind: String,
    /// Resource metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
}

impl ResourceHeader {
    /// Resolve the header's kind against the supported kinds
    pub fn resource_kind(&self) -> Result<ResourceKind, Error> {
        self.kind.parse()
    }
}

/// Ownership record the control plane stores in a pod annotation
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SerializedReference {
    /// Reference to the controller that created the pod
    pub reference: ObjectReference,
}

/// Whether the document looks like JSON rather than YAML
fn is_json(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(DEFAULT_BUFFER_SIZE)];
    window
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{')
}

/// Decode a single document into a generic value
pub fn decode_value(bytes: &[u8]) -> Result<Value, Error> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Value::Null);
    }
    if is_json(bytes) {
        serde_json::from_slice(bytes).map_err(|e| Error::decode(format!("invalid JSON: {e}")))
    } else {
        serde_yaml::from_slice(bytes).map_err(|e| Error::decode(format!("invalid YAML: {e}")))
    }
}

/// Decode a single document into a typed resource
pub fn decode<K: DeserializeOwned>(bytes: &[u8], kind: ResourceKind) -> Result<K, Error> {
    let value = decode_value(bytes)?;
    from_value(value, kind)
}

/// Convert a generic value into a typed resource
pub fn from_value<K: DeserializeOwned>(value: Value, kind: ResourceKind) -> Result<K, Error> {
    if value.is_null() {
        return Err(Error::decode_kind(kind.as_str(), "empty document"));
    }
    serde_json::from_value(value).map_err(|e| Error::decode_kind(kind.as_str(), e.to_string()))
}

/// Split a stream into its documents
///
/// A JSON stream holds one document; a YAML stream may hold several separated
/// by `---`. Empty documents are skipped.
pub fn decode_documents(bytes: &[u8]) -> Result<Vec<Value>, Error> {
    if is_json(bytes) {
        return decode_value(bytes).map(|v| vec![v]);
    }

    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_slice(bytes) {
        let value = Value::deserialize(document)
            .map_err(|e| Error::decode(format!("invalid YAML: {e}")))?;
        if !value.is_null() {
            documents.push(value);
        }
    }
    Ok(documents)
}

/// Read only the type and identity header of a document
pub fn parse_resource_header(value: &Value) -> Result<ResourceHeader, Error> {
    ResourceHeader::deserialize(value).map_err(|e| Error::decode(format!("invalid header: {e}")))
}

/// Decode the ownership annotation of a pod
pub fn parse_serialized_reference(text: &str) -> Result<SerializedReference, Error> {
    let value = decode_value(text.as_bytes())?;
    serde_json::from_value(value)
        .map_err(|e| Error::decode(format!("invalid serialized reference: {e}")))
}
