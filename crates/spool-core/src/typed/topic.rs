//! Topic trait - 型付きメッセージの定義
//!
//! # 学習ポイント
//! - Associated Constants (`const QUEUE`)
//! - Trait bounds の組み合わせ (Serialize + DeserializeOwned + Send + Sync + 'static)

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Topic は queue name と payload の型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct OrderPlaced {
///     order_no: String,
/// }
///
/// impl Topic for OrderPlaced {
///     const QUEUE: &'static str = "orders.placed";
/// }
/// ```
///
/// # Trait Bounds
/// - `Serialize`: publish 時に JSON にするため
/// - `DeserializeOwned`: 配送時に payload から復元するため
/// - `Send + Sync + 'static`: Arc<dyn Dispatcher> に格納できるため
pub trait Topic: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// 配送先の queue name
    const QUEUE: &'static str;
}
