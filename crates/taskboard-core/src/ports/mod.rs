//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! リモートの永続化サービス、時刻、ID・招待コードの生成を trait として
//! 切り出し、実装の詳細を隠蔽します。

pub mod clock;
pub mod code_generator;
pub mod id_generator;
pub mod remote;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::code_generator::{CodeGenerator, RandomCodeGenerator};
pub use self::id_generator::{IdGenerator, IdGeneratorExt, UlidGenerator};
pub use self::remote::{AssignmentRow, RemoteService, TaskRow};
