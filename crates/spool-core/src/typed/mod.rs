//! Typed - 型付き Topic API
//!
//! このモジュールは queue name の typo を型で排除し、
//! Handler との対応付けを静的に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `Topic` trait, `Handler<T>` trait - 型安全
//! - **内部（Dyn）**: `Dispatcher` trait - object-safe, type erasure

pub mod handler;
pub mod topic;

pub use self::handler::{Handler, TypedDispatcher};
pub use self::topic::Topic;
