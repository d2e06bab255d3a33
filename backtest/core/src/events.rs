//! Stream Events
//!
//! Classification of named server-push events into typed [`StreamEvent`]s.
//!
//! The service emits four event names on a job's stream:
//!
//! | Name       | Payload                                  |
//! |------------|------------------------------------------|
//! | `trade`    | one trade record or an array of records  |
//! | `progress` | opaque progress indicator                |
//! | `result`   | partial or full result object            |
//! | `done`     | opaque completion marker (may be empty)  |
//!
//! A payload that fails to parse yields [`EventParseError`] for that event
//! only; the caller drops it and keeps consuming the stream. A `result`
//! object is never rejected for one bad field: see [`ResultPatch`]. Unknown
//! event names classify to `None`.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::result::{ResultPatch, Trade};
use crate::streaming::SseFrame;

/// Category of a stream event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// One or more trades appended
    Trade,
    /// Progress update
    Progress,
    /// Partial or full result
    Result,
    /// Terminal event
    Done,
}

impl EventKind {
    /// Map a wire event name to its category
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "trade" => Some(Self::Trade),
            "progress" => Some(Self::Progress),
            "result" => Some(Self::Result),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    /// Wire name of this category
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::Progress => "progress",
            Self::Result => "result",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified stream event with its parsed payload
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Trades to append, in arrival order
    Trade(Vec<Trade>),
    /// Opaque progress value
    Progress(Value),
    /// Fields to overwrite
    Result(ResultPatch),
    /// Completion marker; the body is informational only
    Done(Option<Value>),
}

/// A payload that could not be parsed for its event category
#[derive(Debug, Error)]
#[error("malformed {kind} payload: {source}")]
pub struct EventParseError {
    /// Category the payload was sent under
    pub kind: EventKind,
    /// Underlying JSON error
    #[source]
    pub source: serde_json::Error,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<Trade>),
    One(Box<Trade>),
}

impl StreamEvent {
    /// Category of this event
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Trade(_) => EventKind::Trade,
            Self::Progress(_) => EventKind::Progress,
            Self::Result(_) => EventKind::Result,
            Self::Done(_) => EventKind::Done,
        }
    }

    /// Whether this event ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// Classify a named event and parse its body
    ///
    /// Returns `Ok(None)` for event names the core does not consume.
    ///
    /// # Errors
    ///
    /// Returns [`EventParseError`] when a `trade`, `progress` or `result`
    /// body is not valid JSON of the expected shape. A `done` event never
    /// fails: an unparseable body is simply discarded.
    pub fn classify(name: &str, data: &str) -> Result<Option<Self>, EventParseError> {
        let Some(kind) = EventKind::from_name(name) else {
            return Ok(None);
        };
        let malformed = |source| EventParseError { kind, source };

        let event = match kind {
            EventKind::Trade => {
                let trades = match serde_json::from_str::<OneOrMany>(data).map_err(malformed)? {
                    OneOrMany::Many(trades) => trades,
                    OneOrMany::One(trade) => vec![*trade],
                };
                Self::Trade(trades)
            }
            EventKind::Progress => Self::Progress(serde_json::from_str(data).map_err(malformed)?),
            EventKind::Result => Self::Result(serde_json::from_str(data).map_err(malformed)?),
            EventKind::Done => Self::Done(serde_json::from_str(data).ok()),
        };
        Ok(Some(event))
    }

    /// Classify a decoded server-sent event frame
    ///
    /// # Errors
    ///
    /// See [`StreamEvent::classify`].
    pub fn from_frame(frame: &SseFrame) -> Result<Option<Self>, EventParseError> {
        Self::classify(&frame.event, &frame.data)
    }
}
