//! DefaultDeadLetterSubscriber - 最後の受け皿
//!
//! Register it under `deadletter` when nothing else should happen to failed
//! messages beyond an error log line.

use async_trait::async_trait;
use serde_json::Value;
use tracing::error;

use crate::domain::{DispatchError, Outcome, Reply};
use crate::ports::Dispatcher;

/// Logs the dead letter at error level and acknowledges it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDeadLetterSubscriber;

#[async_trait]
impl Dispatcher for DefaultDeadLetterSubscriber {
    async fn receive(&self, queue_name: &str, payload: &Value) -> Result<Reply, DispatchError> {
        error!(
            target: "spool::deadletter",
            queue = queue_name,
            %payload,
            "dead letter received for {queue_name}"
        );
        Ok(Outcome::ok().into())
    }
}
