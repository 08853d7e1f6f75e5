//! Classify what came back from a delivery attempt into success or failure.

use serde_json::Value;
use tracing::{error, warn};

use crate::domain::{Details, DeliveryError, LastResult, Outcome, Reply};

/// Key used when a non-object raw reply is wrapped into details.
pub const RAW_RESULT_KEY: &str = "result";

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Success(LastResult),
    Failure(LastResult),
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success(_))
    }

    pub fn last_result(&self) -> &LastResult {
        match self {
            Verdict::Success(r) | Verdict::Failure(r) => r,
        }
    }
}

/// Policy:
/// - empty reply: failure, `ERROR`
/// - error outcome: failure, code/message/details carried over
/// - ok outcome: success, details carried over
/// - anything else: warn, success, raw value kept as details
/// - delivery error: failure with the error's code and provenance
pub fn classify(queue_name: &str, result: Result<Reply, DeliveryError>) -> Verdict {
    match result {
        Ok(Reply::Empty) => Verdict::Failure(DeliveryError::EmptyResult.into_last_result()),
        Ok(Reply::Outcome(Outcome::Ok { details })) => Verdict::Success(LastResult::success(details)),
        Ok(Reply::Outcome(Outcome::Error {
            code,
            message,
            details,
        })) => Verdict::Failure(LastResult::failure(code, message).with_details(details)),
        Ok(Reply::Raw(value)) => {
            warn!(
                queue = %queue_name,
                "subscriber returned a non-conforming result; treating it as success"
            );
            Verdict::Success(LastResult::success(wrap_raw(value)))
        }
        Err(e) => {
            error!(queue = %queue_name, code = e.code(), error = %e, "delivery failed");
            Verdict::Failure(e.into_last_result())
        }
    }
}

fn wrap_raw(value: Value) -> Details {
    match value {
        Value::Object(map) => map,
        other => {
            let mut details = Details::new();
            details.insert(RAW_RESULT_KEY.to_string(), other);
            details
        }
    }
}
