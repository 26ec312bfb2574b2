use chrono::{DateTime, Utc};
use common::{LogPosition, TxHash};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

/// Delivery-level identifier for a log entry.
///
/// Distinct from the entry's position: redeliveries of the same position
/// get fresh event ids, which keeps log lines about duplicates legible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A decoded log entry with its ordering metadata.
///
/// The payload stays as JSON here; the synchronizer decodes it into a
/// ledger event at application time. This keeps the transport crate free
/// of domain knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEnvelope {
    /// Delivery identifier (not stable across redeliveries).
    pub event_id: EventId,

    /// The kind of ledger fact carried, e.g. "ViolationRecorded".
    pub event_type: String,

    /// Position in the ordered log: block number plus log index.
    pub position: LogPosition,

    /// Hash of the transaction that emitted this entry.
    pub tx_hash: TxHash,

    /// When the entry was appended to the log.
    pub timestamp: DateTime<Utc>,

    /// The event payload as JSON.
    pub payload: serde_json::Value,
}

impl LogEnvelope {
    pub fn builder() -> LogEnvelopeBuilder {
        LogEnvelopeBuilder::default()
    }

    /// Decodes the payload into a typed event.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Builder for constructing log envelopes.
#[derive(Debug, Default)]
pub struct LogEnvelopeBuilder {
    event_id: Option<EventId>,
    event_type: Option<String>,
    position: Option<LogPosition>,
    tx_hash: Option<TxHash>,
    timestamp: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
}

impl LogEnvelopeBuilder {
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn position(mut self, position: LogPosition) -> Self {
        self.position = Some(position);
        self
    }

    pub fn tx_hash(mut self, tx_hash: TxHash) -> Self {
        self.tx_hash = Some(tx_hash);
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Builds the envelope.
    ///
    /// # Panics
    ///
    /// Panics if `event_type`, `position`, `tx_hash`, or `payload` is unset.
    pub fn build(self) -> LogEnvelope {
        LogEnvelope {
            event_id: self.event_id.unwrap_or_default(),
            event_type: self.event_type.expect("event_type is required"),
            position: self.position.expect("position is required"),
            tx_hash: self.tx_hash.expect("tx_hash is required"),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            payload: self.payload.expect("payload is required"),
        }
    }
}
