//! Messages: a payload plus immutable headers.
//!
//! Every [`MessageHeaders`] carries two identity headers assigned at build
//! time, [`ID`] (a UUID from an [`IdGenerator`]) and [`TIMESTAMP`]
//! (milliseconds since the Unix epoch). They are never copied from another
//! message and never merged into a batch.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub const ID: &str = "id";
pub const TIMESTAMP: &str = "timestamp";
pub const SEQUENCE_NUMBER: &str = "sequence_number";
pub const SEQUENCE_SIZE: &str = "sequence_size";
pub const CORRELATION_ID: &str = "correlation_id";
/// Name of the channel a result should be sent to.
pub const REPLY_TO: &str = "reply_to";
/// Name of the channel failures for this message should be reported to.
pub const ERROR_CHANNEL: &str = "error_channel";

/// Headers that identify one particular message instance.
pub const IDENTITY_HEADERS: [&str; 4] = [ID, TIMESTAMP, SEQUENCE_NUMBER, SEQUENCE_SIZE];

/// Typed header value. Serialized externally tagged, so a string that
/// parses as a UUID stays a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HeaderValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Uuid(Uuid),
    String(String),
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(u) => Some(*u),
            _ => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for HeaderValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for HeaderValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Uuid> for HeaderValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

// ---------------------------------------------------------------------------
// ID generation
// ---------------------------------------------------------------------------

/// Source of message ids.
pub trait IdGenerator: Send + Sync {
    fn generate_id(&self) -> Uuid;
}

/// Random (v4) UUIDs. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn generate_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Sequential ids from a process-local counter: cheap, unique only within
/// this generator.
#[derive(Debug, Default)]
pub struct IncrementingIdGenerator {
    counter: AtomicU64,
}

impl IncrementingIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for IncrementingIdGenerator {
    fn generate_id(&self) -> Uuid {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        Uuid::from_u128(u128::from(n))
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

/// Immutable header map of a [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageHeaders {
    entries: BTreeMap<String, HeaderValue>,
}

impl MessageHeaders {
    /// Builds headers from `entries`, replacing any identity `id` and
    /// `timestamp` with fresh values.
    pub fn new(entries: BTreeMap<String, HeaderValue>) -> Self {
        Self::with_generator(entries, &RandomIdGenerator)
    }

    pub fn with_generator(
        mut entries: BTreeMap<String, HeaderValue>,
        ids: &dyn IdGenerator,
    ) -> Self {
        entries.insert(ID.to_string(), HeaderValue::Uuid(ids.generate_id()));
        entries.insert(TIMESTAMP.to_string(), HeaderValue::Int(now_millis()));
        Self { entries }
    }

    pub fn id(&self) -> Uuid {
        self.get(ID).and_then(HeaderValue::as_uuid).unwrap_or_default()
    }

    /// Creation time in milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.get(TIMESTAMP).and_then(HeaderValue::as_int).unwrap_or_default()
    }

    pub fn reply_to(&self) -> Option<&str> {
        self.get(REPLY_TO).and_then(HeaderValue::as_str)
    }

    pub fn error_channel(&self) -> Option<&str> {
        self.get(ERROR_CHANNEL).and_then(HeaderValue::as_str)
    }

    pub fn correlation_id(&self) -> Option<&HeaderValue> {
        self.get(CORRELATION_ID)
    }

    pub fn sequence_number(&self) -> Option<i64> {
        self.get(SEQUENCE_NUMBER).and_then(HeaderValue::as_int)
    }

    pub fn sequence_size(&self) -> Option<i64> {
        self.get(SEQUENCE_SIZE).and_then(HeaderValue::as_int)
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.entries.get(key)
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A payload with its headers.
#[derive(Debug, Clone, PartialEq)]
pub struct Message<P> {
    payload: P,
    headers: MessageHeaders,
}

impl<P> Message<P> {
    /// Creates a message with only the identity headers.
    pub fn new(payload: P) -> Self {
        Self {
            payload,
            headers: MessageHeaders::new(BTreeMap::new()),
        }
    }

    pub fn with_headers(payload: P, headers: MessageHeaders) -> Self {
        Self { payload, headers }
    }

    #[inline]
    pub fn payload(&self) -> &P {
        &self.payload
    }

    #[inline]
    pub fn headers(&self) -> &MessageHeaders {
        &self.headers
    }

    pub fn into_payload(self) -> P {
        self.payload
    }

    pub fn into_parts(self) -> (P, MessageHeaders) {
        (self.payload, self.headers)
    }
}

/// Builds a [`Message`], assigning fresh identity headers on [`build`](Self::build).
///
/// ```
/// use ringbus_messaging::{MessageBuilder, REPLY_TO};
///
/// let message = MessageBuilder::with_payload("hello")
///     .header("priority", 3)
///     .reply_to("replies")
///     .build();
///
/// assert_eq!(message.headers().reply_to(), Some("replies"));
/// assert_eq!(message.headers().get("priority").and_then(|v| v.as_int()), Some(3));
/// assert!(message.headers().contains_key(REPLY_TO));
/// ```
pub struct MessageBuilder<P> {
    payload: P,
    entries: BTreeMap<String, HeaderValue>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl<P> MessageBuilder<P> {
    pub fn with_payload(payload: P) -> Self {
        Self {
            payload,
            entries: BTreeMap::new(),
            ids: None,
        }
    }

    /// Starts from a copy of `message`'s payload and non-identity headers.
    pub fn from_message(message: &Message<P>) -> Self
    where
        P: Clone,
    {
        Self::with_payload(message.payload.clone()).copy_headers(message.headers.iter())
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Copies every header, overwriting existing keys. `id` and `timestamp`
    /// are skipped; they are regenerated on build.
    pub fn copy_headers<'a, I>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a HeaderValue)>,
    {
        for (key, value) in headers {
            if key != ID && key != TIMESTAMP {
                self.entries.insert(key.to_string(), value.clone());
            }
        }
        self
    }

    /// Like [`copy_headers`](Self::copy_headers) but keeps existing keys.
    pub fn copy_headers_if_absent<'a, I>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a HeaderValue)>,
    {
        for (key, value) in headers {
            if key != ID && key != TIMESTAMP && !self.entries.contains_key(key) {
                self.entries.insert(key.to_string(), value.clone());
            }
        }
        self
    }

    pub fn remove_header(mut self, key: &str) -> Self {
        self.entries.remove(key);
        self
    }

    pub fn reply_to(self, channel: impl Into<String>) -> Self {
        self.header(REPLY_TO, channel.into())
    }

    pub fn error_channel(self, channel: impl Into<String>) -> Self {
        self.header(ERROR_CHANNEL, channel.into())
    }

    pub fn correlation_id(self, id: impl Into<HeaderValue>) -> Self {
        self.header(CORRELATION_ID, id)
    }

    pub fn sequence(self, number: i64, size: i64) -> Self {
        self.header(SEQUENCE_NUMBER, number).header(SEQUENCE_SIZE, size)
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> Message<P> {
        let headers = match &self.ids {
            Some(ids) => MessageHeaders::with_generator(self.entries, ids.as_ref()),
            None => MessageHeaders::new(self.entries),
        };
        Message::with_headers(self.payload, headers)
    }
}

// ---------------------------------------------------------------------------
// Error messages
// ---------------------------------------------------------------------------

/// Payload of an [`ErrorMessage`]: what went wrong and, when known, the
/// headers of the message that failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorPayload {
    pub description: String,
    pub failed_headers: Option<MessageHeaders>,
}

/// Message published to an error channel when handling fails.
pub type ErrorMessage = Message<ErrorPayload>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_values_keep_their_variant_through_serde() {
        let id = Uuid::new_v4();
        let headers = MessageBuilder::with_payload(())
            .header("as_string", id.to_string())
            .header("as_uuid", id)
            .header("count", 3)
            .header("ratio", 0.5)
            .header("flag", true)
            .build()
            .headers()
            .clone();

        let json = serde_json::to_string(&headers).unwrap();
        let decoded: MessageHeaders = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded, headers);
        assert_eq!(
            decoded.get("as_string").and_then(HeaderValue::as_str),
            Some(id.to_string().as_str())
        );
        assert_eq!(decoded.get("as_uuid").and_then(HeaderValue::as_uuid), Some(id));
    }

    #[test]
    fn test_identity_headers_assigned() {
        let a = Message::new(1u8);
        let b = Message::new(1u8);
        assert_ne!(a.headers().id(), b.headers().id());
        assert!(a.headers().timestamp() > 0);
        assert_eq!(a.headers().len(), 2);
    }

    #[test]
    fn test_copy_headers_skips_identity() {
        let original = MessageBuilder::with_payload("x")
            .header("a", 1)
            .sequence(2, 5)
            .build();
        let copy = MessageBuilder::from_message(&original).header("b", true).build();

        assert_ne!(copy.headers().id(), original.headers().id());
        assert_eq!(copy.headers().get("a"), Some(&HeaderValue::Int(1)));
        assert_eq!(copy.headers().sequence_number(), Some(2));
        assert_eq!(copy.headers().sequence_size(), Some(5));
        assert_eq!(copy.headers().get("b"), Some(&HeaderValue::Bool(true)));
    }

    #[test]
    fn test_copy_if_absent_keeps_existing() {
        let source = MessageBuilder::with_payload(())
            .header("k", "from-source")
            .header("j", 1)
            .build();
        let message = MessageBuilder::with_payload(())
            .header("k", "mine")
            .copy_headers_if_absent(source.headers().iter())
            .build();
        assert_eq!(message.headers().get("k").and_then(HeaderValue::as_str), Some("mine"));
        assert_eq!(message.headers().get("j"), Some(&HeaderValue::Int(1)));
    }

    #[test]
    fn test_incrementing_ids() {
        let ids: Arc<dyn IdGenerator> = Arc::new(IncrementingIdGenerator::new());
        let first = MessageBuilder::with_payload(0).id_generator(Arc::clone(&ids)).build();
        let second = MessageBuilder::with_payload(0).id_generator(ids).build();
        assert_eq!(first.headers().id(), Uuid::from_u128(1));
        assert_eq!(second.headers().id(), Uuid::from_u128(2));
    }

    #[test]
    fn test_header_value_display() {
        assert_eq!(HeaderValue::from("s").to_string(), "s");
        assert_eq!(HeaderValue::from(7).to_string(), "7");
        assert_eq!(HeaderValue::from(false).to_string(), "false");
    }
}
