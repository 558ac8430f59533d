//! Brokered message envelope.

/// Metadata key naming the payload encoding.
pub const CONTENT_TYPE: &str = "content-type";
/// Content type of `serde_json` payloads.
pub const JSON_CONTENT_TYPE: &str = "application/json";
/// Content type of `bitcode` payloads (the default when no content type is set).
pub const BITCODE_CONTENT_TYPE: &str = "application/x-bitcode";

/// A message delivered by a broker subscription.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Unique identifier, used as the lock token for complete/abandon.
    pub id: String,
    /// Canonical name of the event type carried in the payload.
    pub event_type: String,
    /// Serialized payload.
    pub payload: Vec<u8>,
    /// Optional metadata (content type, correlation IDs, etc.)
    pub metadata: Option<Vec<(String, String)>>,
    /// How many times this message has been handed to a receiver.
    pub delivery_count: u32,
}

impl Message {
    /// Create a new message with the given type and payload.
    pub fn new(id: impl Into<String>, event_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            payload,
            metadata: None,
            delivery_count: 0,
        }
    }

    /// Create a message with a bitcode-serialized payload.
    pub fn encode<T: serde::Serialize>(
        id: impl Into<String>,
        event_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, bitcode::Error> {
        let bytes = bitcode::serialize(payload)?;
        Ok(Self::new(id, event_type, bytes).with_metadata(CONTENT_TYPE, BITCODE_CONTENT_TYPE))
    }

    /// Create a message with a JSON payload.
    pub fn encode_json<T: serde::Serialize>(
        id: impl Into<String>,
        event_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(payload)?;
        Ok(Self::new(id, event_type, bytes).with_metadata(CONTENT_TYPE, JSON_CONTENT_TYPE))
    }

    /// Decode the payload from bitcode binary format.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, bitcode::Error> {
        bitcode::deserialize(&self.payload)
    }

    /// Decode the payload from JSON.
    pub fn decode_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    /// Decode the payload with the codec named by the `content-type` metadata.
    pub fn decode_payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, String> {
        if self.is_json() {
            self.decode_json().map_err(|e| e.to_string())
        } else {
            self.decode().map_err(|e| e.to_string())
        }
    }

    /// Add metadata to the message.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(Vec::new)
            .push((key.into(), value.into()));
        self
    }

    /// Look up the first metadata value for `key`.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get the payload as a string (if valid UTF-8).
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    fn is_json(&self) -> bool {
        self.metadata_value(CONTENT_TYPE) == Some(JSON_CONTENT_TYPE)
    }
}
