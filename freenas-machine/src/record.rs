//! Entity records and the values read out of them.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// One record as returned by the appliance, before decoding.
pub type RawRecord = Map<String, Value>;

/// Name of the identity field every raw record carries.
pub const ID_FIELD: &str = "id";

/// Identifier assigned by the appliance.
///
/// Pools and VMs use integers, other collections use strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    Int(i64),
    Text(String),
}

impl EntityId {
    /// Parse the id from a raw JSON value. Only integers and non-empty strings are ids.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(EntityId::Int),
            Value::String(s) if !s.is_empty() => Some(EntityId::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(n) => write!(f, "{}", n),
            EntityId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId::Int(id)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        EntityId::Text(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        EntityId::Text(id)
    }
}

/// The current state of one entity in a store.
///
/// Records are never mutated. A refresh builds a new record and swaps it in,
/// so a reader holding an `Arc<EntityRecord<E>>` always sees a whole pass.
#[derive(Debug)]
pub struct EntityRecord<E> {
    pub id: EntityId,
    /// Decoded fields from the last pass the entity was present in.
    pub fields: Arc<E>,
    /// Whether the entity was present in the latest pass.
    pub available: bool,
    /// When the entity was last present.
    pub last_seen: DateTime<Utc>,
}

impl<E> EntityRecord<E> {
    pub(crate) fn present(id: EntityId, fields: E, now: DateTime<Utc>) -> Self {
        Self {
            id,
            fields: Arc::new(fields),
            available: true,
            last_seen: now,
        }
    }

    /// Same fields, marked unavailable.
    pub(crate) fn vanished(&self) -> Self {
        Self {
            id: self.id.clone(),
            fields: Arc::clone(&self.fields),
            available: false,
            last_seen: self.last_seen,
        }
    }
}

/// A single field read through [`Handle::get`](crate::handle::Handle::get).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// An enumerated status, as the appliance spells it.
    Enum(&'static str),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&String> for FieldValue {
    fn from(v: &String) -> Self {
        FieldValue::Text(v.clone())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(v)
    }
}

impl<T> From<Option<T>> for FieldValue
where
    T: Into<FieldValue>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, Into::into)
    }
}

/// Serde helpers for appliance timestamps.
///
/// The middleware encodes datetimes as `{"$date": <millis since epoch>}`;
/// RFC 3339 strings are accepted as well.
pub(crate) mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Millis {
            #[serde(rename = "$date")]
            date: i64,
        },
        Text(String),
    }

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Wire>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Wire::Millis { date }) => DateTime::from_timestamp_millis(date)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {}", date))),
            Some(Wire::Text(s)) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(D::Error::custom),
        }
    }
}
