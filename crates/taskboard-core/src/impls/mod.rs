//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryRemote**: 開発用・テスト用のリモートサービス
//!
//! # 本番用実装
//! ホスト型データベースへのアダプタは別クレートに配置します。

pub mod inmem_remote;

// 主要な型を再エクスポート
pub use self::inmem_remote::{InMemoryRemote, RemoteOp};
