use crate::error::{FeedError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

/// Well-known payload keys read and written by the pipeline.
pub mod keys {
    pub const COUNT: &str = "count";
    pub const EARNED: &str = "earned";
    pub const TOTAL_EARNED: &str = "totalEarned";
    pub const LATEST_EARNED: &str = "latestEarned";
    pub const AGGREGATED: &str = "aggregated";
    pub const ORACLE_RESPONSE: &str = "oracleResponse";
    pub const URGENCY: &str = "urgency";
}

/// A normalized event flowing through the feed pipeline.
///
/// Events are produced once at the source boundary (see
/// [`RawRecord::normalize`]) and from then on carry a canonical string
/// `id`. The `payload` is an open JSON object. The pipeline only reads the
/// keys listed in [`keys`], everything else is passed through untouched.
///
/// # Examples
///
/// ```
/// use livefeed::Event;
/// use serde_json::json;
///
/// let event = Event::new("evt-1", "tap_activity", json!({"earned": 5}))
///     .with_actor("0xabc")
///     .with_session("sess-1");
/// assert_eq!(event.event_type, "tap_activity");
/// assert_eq!(event.earned(), 5.0);
/// assert_eq!(event.count(), 1);
/// assert!(!event.is_aggregated());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Unique per raw ingestion. Numeric source ids are stringified once
    /// during normalization and never re-derived.
    pub id: String,

    /// When the event happened at the source.
    pub created_at: DateTime<Utc>,

    /// When the event was recorded. Display order and the aggregation
    /// window both use this timestamp.
    pub timestamp_utc: DateTime<Utc>,

    /// Player session, part of the aggregation key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Event type tag (e.g. `"tap_activity"`, `"oracle_prophecy"`).
    pub event_type: String,

    #[serde(default)]
    pub payload: Map<String, Value>,

    /// Originating player. `None` for system events such as prophecies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_address: Option<String>,
}

impl Event {
    /// Create an event stamped with the current time.
    ///
    /// An object `payload` is used as-is, `null` becomes an empty payload
    /// and any other value is stored under the `"value"` key.
    pub fn new(id: impl Into<String>, event_type: &str, payload: Value) -> Self {
        let now = Utc::now();
        Event {
            id: id.into(),
            created_at: now,
            timestamp_utc: now,
            session_id: None,
            event_type: event_type.to_string(),
            payload: into_payload(payload),
            actor_address: None,
        }
    }

    /// Set the originating player.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor_address = Some(actor.into());
        self
    }

    /// Set the player session.
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session_id = Some(session.into());
        self
    }

    /// Set both `created_at` and `timestamp_utc`.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use livefeed::Event;
    /// use serde_json::json;
    ///
    /// let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    /// let event = Event::new("1", "mega_slap", json!({"earned": 1})).at(t);
    /// assert_eq!(event.timestamp_utc, t);
    /// assert_eq!(event.created_at, t);
    /// ```
    pub fn at(mut self, ts: DateTime<Utc>) -> Self {
        self.created_at = ts;
        self.timestamp_utc = ts;
        self
    }

    /// Set only the ingestion timestamp.
    pub fn with_timestamp_utc(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp_utc = ts;
        self
    }

    /// Number of raw events folded into this entry (at least 1).
    ///
    /// Whole-number floats such as `3.0` count as integers.
    pub fn count(&self) -> u64 {
        let count = self.payload.get(keys::COUNT).and_then(|v| {
            v.as_u64().or_else(|| {
                v.as_f64()
                    .filter(|c| c.fract() == 0.0 && *c >= 1.0 && *c <= u64::MAX as f64)
                    .map(|c| c as u64)
            })
        });
        count.filter(|c| *c >= 1).unwrap_or(1)
    }

    /// The amount earned by this single event, 0 when absent.
    pub fn earned(&self) -> f64 {
        self.number(keys::EARNED).unwrap_or(0.0)
    }

    /// Running sum over all merged contributions.
    ///
    /// Falls back to [`earned`](Self::earned) for entries that were never
    /// merged.
    pub fn total_earned(&self) -> f64 {
        self.number(keys::TOTAL_EARNED)
            .unwrap_or_else(|| self.earned())
    }

    /// Amount of the most recent contribution, set by a merge.
    pub fn latest_earned(&self) -> Option<f64> {
        self.number(keys::LATEST_EARNED)
    }

    pub fn is_aggregated(&self) -> bool {
        self.payload
            .get(keys::AGGREGATED)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn oracle_response(&self) -> Option<&str> {
        self.payload.get(keys::ORACLE_RESPONSE).and_then(Value::as_str)
    }

    pub fn urgency(&self) -> Option<&str> {
        self.payload.get(keys::URGENCY).and_then(Value::as_str)
    }

    /// Convert back into the raw shape a source stores.
    pub fn to_record(&self) -> RawRecord {
        RawRecord {
            id: Some(RawId::Text(self.id.clone())),
            created_at: Some(self.created_at.to_rfc3339()),
            timestamp_utc: Some(self.timestamp_utc.to_rfc3339()),
            session_id: self.session_id.clone(),
            event_type: Some(self.event_type.clone()),
            payload: Some(Value::Object(self.payload.clone())),
            actor_address: self.actor_address.clone(),
        }
    }

    fn number(&self, key: &str) -> Option<f64> {
        self.payload.get(key).and_then(Value::as_f64)
    }
}

fn into_payload(payload: Value) -> Map<String, Value> {
    match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Identifier as delivered by a source: either a string or a number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(Number),
}

impl fmt::Display for RawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawId::Text(s) => f.write_str(s),
            RawId::Number(n) => write!(f, "{n}"),
        }
    }
}

/// A row as delivered by an [`EventSource`](crate::EventSource).
///
/// Every field is optional on the wire; [`normalize`](Self::normalize)
/// decides what is required. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RawId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_utc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_address: Option<String>,
}

impl RawRecord {
    /// Turn the raw row into a canonical [`Event`].
    ///
    /// - a missing or blank `event_type` is a [`FeedError::MalformedRecord`];
    /// - a missing `id` is derived from the xxh64 hash of the serialized row;
    /// - `timestamp_utc` falls back to `created_at`, and both fall back to
    ///   `now`;
    /// - a non-object `payload` is malformed, `null` means empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use livefeed::RawRecord;
    /// use serde_json::json;
    ///
    /// let raw: RawRecord = serde_json::from_value(json!({
    ///     "id": 42,
    ///     "event_type": "tap_activity",
    ///     "timestamp_utc": "2024-05-01T12:00:00Z",
    ///     "payload": {"earned": 3}
    /// })).unwrap();
    /// let event = raw.normalize(chrono::Utc::now()).unwrap();
    /// assert_eq!(event.id, "42");
    /// assert_eq!(event.created_at, event.timestamp_utc);
    /// ```
    pub fn normalize(self, now: DateTime<Utc>) -> Result<Event> {
        let event_type = match self.event_type.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => return Err(FeedError::MalformedRecord("missing event_type".into())),
        };

        let payload = match &self.payload {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(FeedError::MalformedRecord(format!(
                    "payload of {event_type} is not an object"
                )));
            }
        };

        let id = match &self.id {
            Some(id) => id.to_string(),
            None => crate::source::line_hash(&serde_json::to_vec(&self)?),
        };

        let created_at = self.created_at.as_deref().map(parse_ts).transpose()?;
        let timestamp_utc = self.timestamp_utc.as_deref().map(parse_ts).transpose()?;
        let timestamp_utc = timestamp_utc.or(created_at).unwrap_or(now);
        let created_at = created_at.unwrap_or(timestamp_utc);

        Ok(Event {
            id,
            created_at,
            timestamp_utc,
            session_id: self.session_id,
            event_type,
            payload,
            actor_address: self.actor_address,
        })
    }
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|source| FeedError::Timestamp {
            value: value.to_string(),
            source,
        })
}
