//! Errors - エラー型と分類
//!
//! - `SpoolError`: public API (publish / status / batch misuse)
//! - `StoreError`: record store adapters
//! - `DispatchError`: raised by subscribers
//! - `DeliveryError`: processing-time failures, always absorbed into the
//!   message's last result and never returned to the scheduler

use thiserror::Error;

use super::ids::MessageId;
use super::outcome::{CODE_ERROR, CODE_EXCEPTION, CODE_NO_SUBSCRIBER, CallSite, LastResult};

#[derive(Debug, Error)]
pub enum SpoolError {
    #[error("cannot serialize message for queue '{queue}'; must be JSON serializable")]
    Serialization {
        queue: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid publish option: {0}")]
    InvalidOption(String),

    #[error("message {0} not found")]
    NotFound(MessageId),

    #[error("no batch in progress; call begin_batch first")]
    NoActiveBatch,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {0} already exists")]
    Conflict(MessageId),

    #[error("record {0} does not exist")]
    NotFound(MessageId),

    #[error("stored record {id} is unreadable: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("record store backend failure")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(e))
    }

    pub fn corrupt(id: impl Into<String>, reason: impl ToString) -> Self {
        Self::Corrupt {
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}

/// An error raised by a subscriber while handling a message.
///
/// Construction records where it happened, so the stored result can point
/// back at the failing handler.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DispatchError {
    message: String,
    call_site: Option<CallSite>,
}

impl DispatchError {
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            call_site: Some(CallSite::here()),
        }
    }

    /// Error without provenance (e.g. reported by a foreign runtime).
    pub fn opaque(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            call_site: None,
        }
    }

    #[track_caller]
    pub fn from_error(e: impl std::error::Error) -> Self {
        Self::new(e.to_string())
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn call_site(&self) -> Option<&CallSite> {
        self.call_site.as_ref()
    }
}

/// Why a delivery attempt failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("subscriber for queue '{queue}' not found")]
    NoSubscriber { queue: String },

    #[error("cannot decode payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("{0}")]
    Dispatch(#[from] DispatchError),

    #[error("Empty result from subscriber")]
    EmptyResult,
}

impl DeliveryError {
    pub fn code(&self) -> &'static str {
        match self {
            DeliveryError::NoSubscriber { .. } => CODE_NO_SUBSCRIBER,
            DeliveryError::Payload(_) | DeliveryError::Dispatch(_) => CODE_EXCEPTION,
            DeliveryError::EmptyResult => CODE_ERROR,
        }
    }

    pub fn into_last_result(self) -> LastResult {
        let exception = match &self {
            DeliveryError::Dispatch(e) => e.call_site().cloned(),
            _ => None,
        };
        LastResult::failure(self.code(), self.to_string()).with_exception(exception)
    }
}
