//! Dispatch port - queue name から subscriber へのディスパッチ
//!
//! - `Dispatcher`: one subscriber (object-safe, stored as `Arc<dyn Dispatcher>`)
//! - `DispatcherRegistry`: name -> dispatcher lookup, populated at startup
//!
//! Names are queue names for normal delivery, and `deadletter.<queue>` /
//! `deadletter` for dead-letter notification.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinError;

use crate::domain::{DispatchError, Reply};

/// Name of the catch-all dead-letter dispatcher.
pub const DEAD_LETTER: &str = "deadletter";

/// Name of the dead-letter dispatcher dedicated to `queue_name`.
pub fn dead_letter_name(queue_name: &str) -> String {
    format!("{DEAD_LETTER}.{queue_name}")
}

/// A subscriber.
///
/// `queue_name` is the queue the message was published to, also for
/// dead-letter dispatchers.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn receive(&self, queue_name: &str, payload: &Value) -> Result<Reply, DispatchError>;
}

pub trait DispatcherRegistry: Send + Sync {
    fn get(&self, name: &str) -> Option<Arc<dyn Dispatcher>>;

    fn has_handler(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Run a dispatcher on its own task.
///
/// The subscriber's work is isolated from the caller: a panic inside it comes
/// back as a `DispatchError` instead of unwinding through the engine.
pub async fn invoke_isolated(
    dispatcher: Arc<dyn Dispatcher>,
    queue_name: &str,
    payload: Value,
) -> Result<Reply, DispatchError> {
    let queue_name = queue_name.to_string();
    let join = tokio::spawn(async move { dispatcher.receive(&queue_name, &payload).await });
    match join.await {
        Ok(result) => result,
        Err(e) => Err(join_error(e)),
    }
}

fn join_error(e: JoinError) -> DispatchError {
    if e.is_panic() {
        let panic = e.into_panic();
        DispatchError::opaque(format!("subscriber panicked: {}", panic_message(&*panic)))
    } else {
        DispatchError::opaque("subscriber task was cancelled")
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
