//! Handler trait - Topic を処理する Handler の定義
//!
//! # 学習ポイント
//! - ジェネリック trait (Handler<T>)
//! - Type erasure パターン (TypedDispatcher<T, H> → dyn Dispatcher)

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::topic::Topic;
use crate::domain::{DispatchError, Outcome, Reply};
use crate::ports::Dispatcher;

/// Handler は Topic を処理して Outcome を返す
///
/// # 使用例
/// ```ignore
/// struct OrderPlacedHandler;
///
/// #[async_trait]
/// impl Handler<OrderPlaced> for OrderPlacedHandler {
///     async fn handle(&self, message: OrderPlaced) -> Result<Outcome, DispatchError> {
///         println!("Processing: {}", message.order_no);
///         Ok(Outcome::ok())
///     }
/// }
/// ```
///
/// # ジェネリクスによる型安全性
/// - `Handler<OrderPlaced>` は `OrderPlaced` しか受け取れない
/// - コンパイル時に Topic と Handler の対応が保証される
#[async_trait]
pub trait Handler<T: Topic>: Send + Sync {
    async fn handle(&self, message: T) -> Result<Outcome, DispatchError>;
}

/// Handler<T> を object-safe な Dispatcher に変換するアダプタ
///
/// HashMap<String, Arc<dyn Dispatcher>> に格納可能にします。
pub struct TypedDispatcher<T: Topic, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Topic, H: Handler<T>> TypedDispatcher<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Topic, H: Handler<T>> Dispatcher for TypedDispatcher<T, H> {
    async fn receive(&self, _queue_name: &str, payload: &Value) -> Result<Reply, DispatchError> {
        let message = T::deserialize(payload).map_err(DispatchError::from_error)?;
        self.handler.handle(message).await.map(Reply::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct Greeting {
        name: String,
    }

    impl Topic for Greeting {
        const QUEUE: &'static str = "test.greeting";
    }

    struct GreetingHandler;

    #[async_trait]
    impl Handler<Greeting> for GreetingHandler {
        async fn handle(&self, message: Greeting) -> Result<Outcome, DispatchError> {
            if message.name.is_empty() {
                return Ok(Outcome::error("NO_NAME", "name is empty"));
            }
            Ok(Outcome::ok().with_detail("greeted", json!(message.name)))
        }
    }

    #[tokio::test]
    async fn typed_dispatcher_decodes_and_delegates() {
        let dispatcher = TypedDispatcher::<Greeting, _>::new(GreetingHandler);

        let reply = dispatcher
            .receive(Greeting::QUEUE, &json!({ "name": "spool" }))
            .await
            .unwrap();
        assert_eq!(
            reply,
            Reply::Outcome(Outcome::ok().with_detail("greeted", json!("spool")))
        );
    }

    #[tokio::test]
    async fn handler_errors_come_back_as_outcomes() {
        let dispatcher = TypedDispatcher::<Greeting, _>::new(GreetingHandler);

        let reply = dispatcher
            .receive(Greeting::QUEUE, &json!({ "name": "" }))
            .await
            .unwrap();
        assert!(matches!(reply, Reply::Outcome(o) if !o.is_ok()));
    }

    #[tokio::test]
    async fn undecodable_payload_is_a_dispatch_error() {
        let dispatcher = TypedDispatcher::<Greeting, _>::new(GreetingHandler);

        let err = dispatcher
            .receive(Greeting::QUEUE, &json!({ "nom": 1 }))
            .await
            .unwrap_err();
        assert!(err.message().contains("missing field `name`"));
        assert!(err.call_site().is_some());
    }
}
