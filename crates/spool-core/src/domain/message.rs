//! Message record: the sole persistent entity, plus its state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::MessageId;

/// Message status.
///
/// State transitions:
/// - Pending -> Complete | Retry | Failed
/// - Retry -> Complete | Retry | Failed
///
/// Complete and Failed are terminal for the processor; only the purge sweeper
/// may delete them afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    /// Published, never attempted.
    Pending,

    /// At least one failed attempt, waiting for its backoff to elapse.
    Retry,

    /// Delivered successfully.
    Complete,

    /// Delivery attempts exhausted.
    Failed,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Pending => "PENDING",
            MessageStatus::Retry => "RETRY",
            MessageStatus::Complete => "COMPLETE",
            MessageStatus::Failed => "FAILED",
        }
    }

    /// Is this a terminal state (no further processor transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Complete | MessageStatus::Failed)
    }

    /// Is a message in this state eligible for selection (time permitting)?
    pub fn is_deliverable(self) -> bool {
        matches!(self, MessageStatus::Pending | MessageStatus::Retry)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(MessageStatus::Pending),
            "RETRY" => Ok(MessageStatus::Retry),
            "COMPLETE" => Ok(MessageStatus::Complete),
            "FAILED" => Ok(MessageStatus::Failed),
            other => Err(format!("unknown message status '{other}'")),
        }
    }
}

/// Delivery priority. Lower value is served first.
///
/// Serialized as its numeric value (`0`, `1`, `2`) so publish options written
/// as JSON can say `"priority": 2`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Priority {
    High = 0,
    #[default]
    Normal = 1,
    Low = 2,
}

impl Priority {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.as_u8()
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Priority::High),
            1 => Ok(Priority::Normal),
            2 => Ok(Priority::Low),
            other => Err(format!("priority must be 0, 1 or 2 (got {other})")),
        }
    }
}

/// Governs what happens to a message once it reaches a terminal state.
///
/// - `Never`: removed as soon as it completes or fails.
/// - `OnFailure`: completed messages are removed, failed ones kept until `retain_till`.
/// - `Always`: kept until `retain_till` either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Retention {
    #[serde(rename = "NEVER")]
    Never,
    #[default]
    #[serde(rename = "ONFAILURE")]
    OnFailure,
    #[serde(rename = "ALWAYS")]
    Always,
}

impl Retention {
    pub fn as_str(self) -> &'static str {
        match self {
            Retention::Never => "NEVER",
            Retention::OnFailure => "ONFAILURE",
            Retention::Always => "ALWAYS",
        }
    }
}

impl fmt::Display for Retention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Retention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEVER" => Ok(Retention::Never),
            "ONFAILURE" => Ok(Retention::OnFailure),
            "ALWAYS" => Ok(Retention::Always),
            other => Err(format!("unknown retention '{other}'")),
        }
    }
}

/// Processing partition a message is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardId(pub u32);

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The persisted message.
///
/// Design:
/// - This is the "single source of truth" for message state.
/// - `payload`, `last_result` and `call_site` are stored as JSON text; the
///   engine decodes them on demand.
/// - All processor transitions go through the methods below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub queue_name: String,
    pub payload: String,
    pub status: MessageStatus,
    pub priority: Priority,
    pub remaining_delivery_attempts: u32,
    pub error_count: u32,
    pub visibility_time: DateTime<Utc>,
    pub retention: Retention,
    pub retain_till: DateTime<Utc>,
    pub shard: ShardId,
    pub last_result: Option<String>,
    pub call_site: Option<String>,
    pub creation_time: DateTime<Utc>,
}

impl MessageRecord {
    /// Can the processor for `shard` pick this message up at `now`?
    pub fn is_eligible(&self, shard: ShardId, now: DateTime<Utc>) -> bool {
        self.status.is_deliverable() && self.visibility_time <= now && self.shard == shard
    }

    /// Has a terminal message outlived its retention deadline?
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status.is_terminal() && self.retain_till < now
    }

    /// Bookkeeping common to every attempt: store the outcome and spend one
    /// delivery attempt. Success spends one too.
    pub fn record_attempt(&mut self, last_result: String) {
        self.last_result = Some(last_result);
        self.remaining_delivery_attempts = self.remaining_delivery_attempts.saturating_sub(1);
    }

    pub fn mark_complete(&mut self) {
        self.status = MessageStatus::Complete;
    }

    /// Count a failed attempt. Returns true when the message has no attempts left.
    pub fn register_failure(&mut self) -> bool {
        self.error_count = self.error_count.saturating_add(1);
        self.remaining_delivery_attempts == 0
    }

    pub fn mark_failed(&mut self) {
        self.status = MessageStatus::Failed;
    }

    pub fn schedule_retry(&mut self, visible_at: DateTime<Utc>) {
        self.status = MessageStatus::Retry;
        self.visibility_time = visible_at;
    }
}
