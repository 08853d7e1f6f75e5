//! Outcome model: what a subscriber returns and what the engine records.
//!
//! This module only defines the "shape" of results. Classifying a reply into
//! success or failure lives in `queue::classify`.

use std::panic::Location;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form details attached to a result.
pub type Details = Map<String, Value>;

/// Result code recorded for a successful delivery.
pub const CODE_OK: &str = "OK";
/// Generic failure code (empty reply, or an error outcome without a code).
pub const CODE_ERROR: &str = "ERROR";
/// A raised error while decoding or dispatching.
pub const CODE_EXCEPTION: &str = "EXCEPTION";
/// No subscriber registered for the queue.
pub const CODE_NO_SUBSCRIBER: &str = "NO_SUBSCRIBER";

/// A unified classification of a recorded result.
///
/// Serialized as SCREAMING_SNAKE_CASE: OK / ERROR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Ok,
    Error,
}

/// The result a subscriber reports for one delivery.
///
/// Wire shape: `{"outcome": "OK", "details": {..}}` or
/// `{"outcome": "ERROR", "code": "..", "message": "..", "details": {..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Ok {
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        details: Details,
    },
    Error {
        #[serde(default = "default_error_code")]
        code: String,
        #[serde(default)]
        message: String,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        details: Details,
    },
}

fn default_error_code() -> String {
    CODE_ERROR.to_string()
}

impl Outcome {
    pub fn ok() -> Self {
        Outcome::Ok {
            details: Details::new(),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Outcome::Error {
            code: code.into(),
            message: message.into(),
            details: Details::new(),
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Ok { .. } => OutcomeKind::Ok,
            Outcome::Error { .. } => OutcomeKind::Error,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.kind() == OutcomeKind::Ok
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        match &mut self {
            Outcome::Ok { details } | Outcome::Error { details, .. } => {
                details.insert(key.into(), value);
            }
        }
        self
    }
}

/// Everything a dispatcher can hand back.
///
/// `Raw` covers subscribers that return some value that is not an [`Outcome`];
/// the engine treats it as success and keeps the value as details.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Nothing came back.
    Empty,
    Outcome(Outcome),
    Raw(Value),
}

impl Reply {
    /// Interpret an arbitrary JSON value returned by a subscriber.
    ///
    /// `null` is empty, an object with a valid `outcome` tag is an [`Outcome`],
    /// anything else is raw.
    pub fn from_value(value: Value) -> Self {
        if value.is_null() {
            return Reply::Empty;
        }
        let tagged = value
            .as_object()
            .is_some_and(|object| object.contains_key("outcome"));
        if tagged && let Ok(outcome) = serde_json::from_value::<Outcome>(value.clone()) {
            return Reply::Outcome(outcome);
        }
        Reply::Raw(value)
    }
}

impl From<Outcome> for Reply {
    fn from(outcome: Outcome) -> Self {
        Reply::Outcome(outcome)
    }
}

impl From<Option<Outcome>> for Reply {
    fn from(outcome: Option<Outcome>) -> Self {
        outcome.map_or(Reply::Empty, Reply::Outcome)
    }
}

/// Source location used for provenance (publish call sites, raised errors).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub file: String,
    pub line: u32,
    pub column: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

impl CallSite {
    /// Location of the caller. Functions marked `#[track_caller]` forward
    /// their own caller.
    #[track_caller]
    pub fn here() -> Self {
        Self::from_location(Location::caller())
    }

    pub fn from_location(location: &Location<'_>) -> Self {
        Self {
            file: location.file().to_string(),
            line: location.line(),
            column: location.column(),
            function: None,
        }
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }
}

/// What the engine stores after each attempt (overwritten every time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastResult {
    pub outcome: OutcomeKind,
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Details,
    /// Where the error was raised, when the failure was an exception.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<CallSite>,
}

impl LastResult {
    pub fn success(details: Details) -> Self {
        Self {
            outcome: OutcomeKind::Ok,
            code: CODE_OK.to_string(),
            message: String::new(),
            details,
            exception: None,
        }
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            outcome: OutcomeKind::Error,
            code: code.into(),
            message: message.into(),
            details: Details::new(),
            exception: None,
        }
    }

    /// Placeholder used when a stored result is missing or unreadable.
    pub fn empty() -> Self {
        Self {
            outcome: OutcomeKind::Error,
            code: String::new(),
            message: String::new(),
            details: Details::new(),
            exception: None,
        }
    }

    pub fn with_details(mut self, details: Details) -> Self {
        self.details = details;
        self
    }

    pub fn with_exception(mut self, call_site: Option<CallSite>) -> Self {
        self.exception = call_site;
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == OutcomeKind::Ok
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty() && self.message.is_empty() && self.details.is_empty()
    }
}
