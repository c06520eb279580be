//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてセッション単位のアプリケーションを構築します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **BoardConfig**: 起動時設定

pub mod builder;
pub mod config;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::config::{BoardConfig, ConfigError};
