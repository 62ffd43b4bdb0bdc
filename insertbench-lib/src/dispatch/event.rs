use std::{collections::BTreeMap, time::SystemTime};

use rama::error::BoxError;
use serde::{Serialize, Serializer};

/// A single synthetic record, as inserted into the API under test.
///
/// Serialized as `{"User": .., "Data": {..}, "Timestamp": ..}`,
/// with the timestamp in RFC 3339 format (UTC, nanosecond precision).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Event {
    user: String,
    data: BTreeMap<String, String>,
    #[serde(serialize_with = "serialize_rfc3339_nanos")]
    timestamp: SystemTime,
}

impl Event {
    /// Create a new event, failing for an empty user name.
    pub fn try_new(
        user: impl Into<String>,
        data: BTreeMap<String, String>,
        timestamp: SystemTime,
    ) -> Result<Self, BoxError> {
        let user = user.into();
        if user.is_empty() {
            return Err(BoxError::from("event user cannot be empty"));
        }
        Ok(Self::new(user, data, timestamp))
    }

    /// Infallible constructor for callers that already validated the user.
    pub(crate) fn new(user: String, data: BTreeMap<String, String>, timestamp: SystemTime) -> Self {
        debug_assert!(!user.is_empty());
        Self {
            user,
            data,
            timestamp,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }
}

fn serialize_rfc3339_nanos<S: Serializer>(ts: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&humantime::format_rfc3339_nanos(*ts))
}

/// Non-empty, ordered group of events of a single user,
/// submitted together as one request per target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    events: Vec<Event>,
}

impl Batch {
    /// Returns `None` for an empty list of events.
    pub fn try_new(events: Vec<Event>) -> Option<Self> {
        (!events.is_empty()).then_some(Self { events })
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Number of events, always at least one.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether this batch is sent as a single object rather than a list.
    pub fn is_single(&self) -> bool {
        self.events.len() == 1
    }

    /// Encode as JSON: a single event as object, anything larger as array.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self.events.as_slice() {
            [event] => serde_json::to_vec(event),
            events => serde_json::to_vec(events),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn event(user: &str, secs: u64) -> Event {
        Event::try_new(
            user,
            BTreeMap::from([("k".to_owned(), "some value".to_owned())]),
            UNIX_EPOCH + Duration::new(secs, 42),
        )
        .unwrap()
    }

    #[test]
    fn test_event_rejects_empty_user() {
        assert!(Event::try_new("", BTreeMap::new(), SystemTime::now()).is_err());
    }

    #[test]
    fn test_event_json_shape() {
        let value = serde_json::to_value(event("alice", 1_518_568_087)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "User": "alice",
                "Data": { "k": "some value" },
                "Timestamp": "2018-02-14T00:28:07.000000042Z",
            })
        );
    }

    #[test]
    fn test_batch_encoding_single_vs_list() {
        assert!(Batch::try_new(Vec::new()).is_none());

        let single = Batch::try_new(vec![event("bob", 0)]).unwrap();
        assert!(single.is_single());
        assert_eq!(single.len(), 1);
        let value: serde_json::Value = serde_json::from_slice(&single.encode().unwrap()).unwrap();
        assert!(value.is_object());
        assert_eq!(value["User"], "bob");

        let list = Batch::try_new(vec![event("bob", 0), event("bob", 1)]).unwrap();
        assert!(!list.is_single());
        assert_eq!(list.len(), 2);
        let value: serde_json::Value = serde_json::from_slice(&list.encode().unwrap()).unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["Timestamp"], "1970-01-01T00:00:01.000000042Z");
    }
}
