//! Raw CI lifecycle events as carried by the transport.
//!
//! A message is textual: `<topic> <json-payload>`, for example
//! `onStarted {"name":"release","build":{"number":5}}`.

use crate::build::BuildRef;
use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static ENVELOPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(on\w+) (\{.*\})").expect("envelope pattern is valid")
});

/// Lifecycle stage reported by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    Completed,
    Finalized,
}

impl EventKind {
    /// Resolve a transport topic (`onStarted`, ...) to a kind.
    pub fn from_topic(topic: &str) -> Option<Self> {
        match topic {
            "onStarted" => Some(EventKind::Started),
            "onCompleted" => Some(EventKind::Completed),
            "onFinalized" => Some(EventKind::Finalized),
            _ => None,
        }
    }

    pub fn topic(&self) -> &'static str {
        match self {
            EventKind::Started => "onStarted",
            EventKind::Completed => "onCompleted",
            EventKind::Finalized => "onFinalized",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic())
    }
}

/// The `<topic> <payload>` split of a transport message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub topic: &'a str,
    pub payload: &'a str,
}

impl<'a> Envelope<'a> {
    pub fn parse(message: &'a str) -> Result<Self> {
        let caps = ENVELOPE.captures(message).ok_or_else(|| {
            Error::MalformedEnvelope(truncate(message, 120).to_string())
        })?;
        match (caps.get(1), caps.get(2)) {
            (Some(topic), Some(payload)) => Ok(Self {
                topic: topic.as_str(),
                payload: payload.as_str(),
            }),
            _ => Err(Error::MalformedEnvelope(truncate(message, 120).to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Payload {
    name: String,
    build: BuildRef,
}

/// A decoded lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: EventKind,
    pub name: String,
    pub build: BuildRef,
}

impl RawEvent {
    pub fn new(kind: EventKind, name: impl Into<String>, build: BuildRef) -> Self {
        Self {
            kind,
            name: name.into(),
            build,
        }
    }

    /// Decode the JSON payload of an event whose kind is already known.
    pub fn from_payload(kind: EventKind, payload: &str) -> Result<Self> {
        let payload: Payload = serde_json::from_str(payload)
            .map_err(|e| Error::MalformedPayload(e.to_string()))?;
        Ok(Self {
            kind,
            name: payload.name,
            build: payload.build,
        })
    }

    /// Encode back into the transport's textual form.
    pub fn to_message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RawEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = serde_json::json!({ "name": self.name, "build": self.build });
        write!(f, "{} {}", self.kind.topic(), payload)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
