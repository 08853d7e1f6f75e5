//! Dead-letter routing for messages that exhausted their delivery attempts.
//!
//! Order: `deadletter.<queue>` first; if it is missing, returns an error
//! outcome or nothing at all, or raises, fall back to the generic `deadletter`.
//! Nothing here ever fails the caller; problems are logged.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::domain::{Outcome, Reply};
use crate::ports::{DEAD_LETTER, DispatcherRegistry, dead_letter_name, invoke_isolated};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterOutcome {
    /// The queue-specific handler explicitly acknowledged the message;
    /// the record can be removed.
    Acknowledged,
    /// Some dead-letter handler received the message.
    Delivered,
    /// No dead-letter handler took it.
    Unhandled,
}

#[derive(Clone)]
pub struct DeadLetterRouter {
    registry: Arc<dyn DispatcherRegistry>,
}

impl DeadLetterRouter {
    pub fn new(registry: Arc<dyn DispatcherRegistry>) -> Self {
        Self { registry }
    }

    pub async fn route(&self, queue_name: &str, payload: &Value) -> DeadLetterOutcome {
        let specific = dead_letter_name(queue_name);
        if let Some(dispatcher) = self.registry.get(&specific) {
            match invoke_isolated(dispatcher, queue_name, payload.clone()).await {
                Ok(Reply::Outcome(Outcome::Ok { .. })) => {
                    info!(queue = %queue_name, handler = %specific, "dead letter acknowledged");
                    return DeadLetterOutcome::Acknowledged;
                }
                Ok(Reply::Outcome(Outcome::Error { code, message, .. })) => {
                    warn!(
                        queue = %queue_name,
                        handler = %specific,
                        %code,
                        %message,
                        "dead-letter handler reported an error; falling back"
                    );
                }
                Ok(Reply::Empty) => {
                    warn!(
                        queue = %queue_name,
                        handler = %specific,
                        "empty result from dead-letter handler; falling back"
                    );
                }
                Ok(Reply::Raw(value)) => {
                    warn!(
                        queue = %queue_name,
                        handler = %specific,
                        %value,
                        "non-conforming dead-letter result; treating it as received"
                    );
                    return DeadLetterOutcome::Delivered;
                }
                Err(e) => {
                    error!(
                        queue = %queue_name,
                        handler = %specific,
                        error = %e,
                        "dead-letter handler failed; falling back"
                    );
                }
            }
        }

        let Some(dispatcher) = self.registry.get(DEAD_LETTER) else {
            warn!(queue = %queue_name, "no dead-letter handler registered");
            return DeadLetterOutcome::Unhandled;
        };
        match invoke_isolated(dispatcher, queue_name, payload.clone()).await {
            Ok(Reply::Outcome(Outcome::Error { code, message, .. })) => {
                warn!(queue = %queue_name, %code, %message, "generic dead-letter handler reported an error");
            }
            Ok(_) => {}
            Err(e) => {
                error!(queue = %queue_name, error = %e, "generic dead-letter handler failed");
            }
        }
        DeadLetterOutcome::Delivered
    }
}
