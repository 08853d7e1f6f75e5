//! End-to-end flows through the `Spool` facade with a fixed clock.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeDelta, TimeZone, Utc};
use serde_json::{Value, json};

use spool_core::domain::{CODE_NO_SUBSCRIBER, MessageRecord};
use spool_core::ports::{Clock, DEAD_LETTER, Dispatcher, FixedClock};
use spool_core::{
    DispatchError, MessageId, MessageStatus, Outcome, Priority, PublishOptions, Reply, Retention,
    Spool, SpoolConfig, SpoolError,
};

/// Records every call and answers with a fixed reply.
struct Recorder {
    reply: Result<Reply, DispatchError>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl Recorder {
    fn ok() -> Arc<Self> {
        Self::replying(Ok(Outcome::ok().into()))
    }

    fn replying(reply: Result<Reply, DispatchError>) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dispatcher for Recorder {
    async fn receive(&self, queue_name: &str, payload: &Value) -> Result<Reply, DispatchError> {
        self.calls
            .lock()
            .unwrap()
            .push((queue_name.to_string(), payload.clone()));
        self.reply.clone()
    }
}

/// Fails the first call, then succeeds; keeps every payload in call order.
#[derive(Default)]
struct FailsOnce {
    payloads: Mutex<Vec<Value>>,
}

#[async_trait]
impl Dispatcher for FailsOnce {
    async fn receive(&self, _queue_name: &str, payload: &Value) -> Result<Reply, DispatchError> {
        let mut payloads = self.payloads.lock().unwrap();
        payloads.push(payload.clone());
        if payloads.len() == 1 {
            Err(DispatchError::new("first try"))
        } else {
            Ok(Outcome::ok().into())
        }
    }
}

struct Fixture {
    spool: Spool,
    clock: Arc<FixedClock>,
}

impl Fixture {
    fn new(shard_count: u32, dispatchers: Vec<(&str, Arc<Recorder>)>) -> Self {
        Self::with(
            shard_count,
            dispatchers
                .into_iter()
                .map(|(name, d)| (name, d as Arc<dyn Dispatcher>))
                .collect(),
        )
    }

    fn with(shard_count: u32, dispatchers: Vec<(&str, Arc<dyn Dispatcher>)>) -> Self {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ));
        let mut builder = Spool::builder()
            .config(SpoolConfig {
                shard_count,
                ..SpoolConfig::default()
            })
            .clock(clock.clone());
        for (name, dispatcher) in dispatchers {
            builder = builder.register(name, dispatcher).unwrap();
        }
        Self {
            spool: builder.build().unwrap(),
            clock,
        }
    }

    /// One processing cycle over every shard.
    async fn cycle(&self) {
        for shard in self.spool.shards() {
            self.spool.process_shard(shard).await.unwrap();
        }
    }

    /// Moves past any backoff, then runs a cycle.
    async fn cycle_later(&self) {
        self.clock.advance(TimeDelta::hours(1));
        self.cycle().await;
    }

    async fn record(&self, id: &MessageId) -> MessageRecord {
        self.spool.get_status(id).await.unwrap().record
    }
}

#[tokio::test]
async fn test_success_removes_message_with_default_retention() {
    let handler = Recorder::ok();
    let fx = Fixture::new(4, vec![("test.queue", handler.clone())]);

    let id = fx
        .spool
        .publish("test.queue", &json!({"a": 1}), PublishOptions::new())
        .await
        .unwrap();
    assert_eq!(fx.spool.get_status(&id).await.unwrap().status, MessageStatus::Pending);

    fx.cycle().await;

    assert_eq!(handler.calls(), vec![("test.queue".to_string(), json!({"a": 1}))]);
    assert!(matches!(fx.spool.get_status(&id).await, Err(SpoolError::NotFound(_))));
}

#[tokio::test]
async fn test_failing_handler_exhausts_attempts_then_sweeper_removes() {
    let handler = Recorder::replying(Err(DispatchError::new("boom")));
    let fx = Fixture::new(4, vec![("test.queue", handler.clone())]);

    let id = fx
        .spool
        .publish(
            "test.queue",
            &json!({"a": 1}),
            PublishOptions::new()
                .retention(Retention::Always)
                .delivery_attempts(3),
        )
        .await
        .unwrap();

    fx.cycle().await;
    assert_eq!(fx.record(&id).await.status, MessageStatus::Retry);
    fx.cycle_later().await;
    assert_eq!(fx.record(&id).await.status, MessageStatus::Retry);
    fx.cycle_later().await;

    let info = fx.spool.get_status(&id).await.unwrap();
    assert_eq!(info.status, MessageStatus::Failed);
    assert_eq!(info.last_result.code, "EXCEPTION");
    assert_eq!(info.last_result.message, "boom");
    assert!(info.last_result.exception.is_some());
    assert_eq!(info.record.error_count, 3);
    assert_eq!(handler.calls().len(), 3);

    // kept until retain_till
    assert_eq!(fx.spool.purge().await.unwrap().removed, 0);
    fx.clock.advance(TimeDelta::days(7));
    assert_eq!(fx.spool.purge().await.unwrap().removed, 1);
    assert!(matches!(fx.spool.get_status(&id).await, Err(SpoolError::NotFound(_))));
}

#[tokio::test]
async fn test_fifo_messages_share_a_shard() {
    let fx = Fixture::new(16, vec![]);
    let options = || PublishOptions::new().fifo(true);

    let m1 = fx.spool.publish("orders", &json!({"n": 1}), options()).await.unwrap();
    let m2 = fx.spool.publish("orders", &json!({"n": 2}), options()).await.unwrap();

    assert_eq!(fx.record(&m1).await.shard, fx.record(&m2).await.shard);
}

#[tokio::test]
async fn test_orphan_message_reaches_generic_dead_letter_once() {
    let dead_letters = Recorder::replying(Ok(Reply::Empty));
    let fx = Fixture::new(4, vec![(DEAD_LETTER, dead_letters.clone())]);
    let payload = json!({"lost": "cause"});

    let id = fx
        .spool
        .publish(
            "orphan.queue",
            &payload,
            PublishOptions::new()
                .retention(Retention::Always)
                .delivery_attempts(3),
        )
        .await
        .unwrap();

    fx.cycle().await;
    fx.cycle_later().await;
    assert!(dead_letters.calls().is_empty());
    fx.cycle_later().await;

    let info = fx.spool.get_status(&id).await.unwrap();
    assert_eq!(info.status, MessageStatus::Failed);
    assert_eq!(info.last_result.code, CODE_NO_SUBSCRIBER);
    assert_eq!(dead_letters.calls(), vec![("orphan.queue".to_string(), payload)]);

    // nothing more happens to a FAILED message
    fx.cycle_later().await;
    assert_eq!(dead_letters.calls().len(), 1);
}

#[tokio::test]
async fn test_published_ids_are_unique_and_pending() {
    let fx = Fixture::new(4, vec![]);
    let mut seen = HashSet::new();

    for n in 0..50 {
        let id = fx
            .spool
            .publish("test.queue", &json!({"n": n}), PublishOptions::new())
            .await
            .unwrap();
        assert!(seen.insert(id));
        assert_eq!(fx.spool.get_status(&id).await.unwrap().status, MessageStatus::Pending);
    }
}

#[tokio::test]
async fn test_payload_round_trips_to_handler() {
    let handler = Recorder::ok();
    let fx = Fixture::new(1, vec![("test.queue", handler.clone())]);
    let payload = json!({
        "text": "ünïcødé",
        "nested": {"list": [1, 2.5, null, true], "empty": {}},
        "big": 9007199254740991u64,
    });

    fx.spool
        .publish("test.queue", &payload, PublishOptions::new())
        .await
        .unwrap();
    fx.cycle().await;

    assert_eq!(handler.calls(), vec![("test.queue".to_string(), payload)]);
}

#[tokio::test]
async fn test_always_retention_keeps_completed_until_retain_till() {
    let fx = Fixture::new(1, vec![("test.queue", Recorder::ok())]);
    let id = fx
        .spool
        .publish(
            "test.queue",
            &json!(1),
            PublishOptions::new()
                .retention(Retention::Always)
                .retention_duration(std::time::Duration::from_secs(300)),
        )
        .await
        .unwrap();

    fx.cycle().await;
    assert_eq!(fx.record(&id).await.status, MessageStatus::Complete);

    fx.clock.advance(TimeDelta::seconds(300));
    // retain_till is exclusive
    assert_eq!(fx.spool.purge().await.unwrap().removed, 0);
    fx.clock.advance(TimeDelta::seconds(1));
    assert_eq!(fx.spool.purge().await.unwrap().removed, 1);
}

#[tokio::test]
async fn test_fails_after_exactly_the_configured_attempts() {
    let handler = Recorder::replying(Ok(Outcome::error("NOPE", "not today").into()));
    let fx = Fixture::new(1, vec![("test.queue", handler.clone())]);
    let id = fx
        .spool
        .publish(
            "test.queue",
            &json!({}),
            PublishOptions::new()
                .retention(Retention::Always)
                .delivery_attempts(5),
        )
        .await
        .unwrap();

    let mut last_visibility = None;
    for attempt in 1..=5u32 {
        fx.cycle_later().await;
        let record = fx.record(&id).await;
        assert_eq!(record.error_count, attempt);
        assert_eq!(record.remaining_delivery_attempts, 5 - attempt);
        if attempt < 5 {
            assert_eq!(record.status, MessageStatus::Retry);
            let delay = record.visibility_time - fx.clock.now();
            assert_eq!(delay, TimeDelta::minutes(1 << attempt));
            if let Some(previous) = last_visibility {
                assert!(delay >= previous);
            }
            last_visibility = Some(delay);
        } else {
            assert_eq!(record.status, MessageStatus::Failed);
        }
    }
    assert!(fx.record(&id).await.last_result.is_some());
    assert_eq!(handler.calls().len(), 5);
}

#[tokio::test]
async fn test_high_priority_is_delivered_first() {
    let handler = Recorder::ok();
    let fx = Fixture::new(1, vec![("test.queue", handler.clone())]);

    fx.spool
        .publish(
            "test.queue",
            &json!("low"),
            PublishOptions::new().priority(Priority::Low),
        )
        .await
        .unwrap();
    fx.spool
        .publish(
            "test.queue",
            &json!("high"),
            PublishOptions::new().priority(Priority::High),
        )
        .await
        .unwrap();
    fx.cycle().await;

    let order: Vec<Value> = handler.calls().into_iter().map(|(_, p)| p).collect();
    assert_eq!(order, vec![json!("high"), json!("low")]);
}

#[tokio::test]
async fn test_delay_defers_first_delivery() {
    let handler = Recorder::ok();
    let fx = Fixture::new(1, vec![("test.queue", handler.clone())]);

    fx.spool
        .publish(
            "test.queue",
            &json!(1),
            PublishOptions::new().delay(std::time::Duration::from_secs(30)),
        )
        .await
        .unwrap();

    fx.cycle().await;
    assert!(handler.calls().is_empty());

    fx.clock.advance(TimeDelta::seconds(30));
    fx.cycle().await;
    assert_eq!(handler.calls().len(), 1);
}

#[tokio::test]
async fn test_retried_normal_goes_before_later_low() {
    let handler = Arc::new(FailsOnce::default());
    let fx = Fixture::with(1, vec![("test.queue", handler.clone() as Arc<dyn Dispatcher>)]);

    let normal = fx
        .spool
        .publish("test.queue", &json!("normal"), PublishOptions::new())
        .await
        .unwrap();
    fx.cycle().await;
    assert_eq!(fx.record(&normal).await.status, MessageStatus::Retry);

    fx.clock.advance(TimeDelta::minutes(1));
    fx.spool
        .publish(
            "test.queue",
            &json!("low"),
            PublishOptions::new().priority(Priority::Low),
        )
        .await
        .unwrap();
    // past the 2 minute backoff
    fx.clock.advance(TimeDelta::minutes(2));
    fx.cycle().await;

    let order = handler.payloads.lock().unwrap().clone();
    assert_eq!(order, vec![json!("normal"), json!("normal"), json!("low")]);
}
