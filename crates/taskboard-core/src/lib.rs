//! taskboard-core
//!
//! Core of a collaborative task board: an in-memory pipeline store kept in
//! sync with a remote persistent service, plus space invitations.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, stage, task, space, invite, notification, activity, errors）
//! - **ports**: 抽象化レイヤー（RemoteService, Clock, IdGenerator, CodeGenerator）
//! - **store**: TaskStore（スペースごとのパイプライン）と変更通知
//! - **activity**: 直近の操作履歴（メモリ上のみ）
//! - **sync**: AssignmentResolver, SyncGateway, Inbox
//! - **invite**: InviteStateMachine と招待リンク
//! - **app**: 設定と AppBuilder
//! - **impls**: 実装（InMemoryRemote など開発用）

pub mod activity;
pub mod app;
pub mod domain;
pub mod impls;
pub mod invite;
pub mod ports;
pub mod store;
pub mod sync;

pub use self::activity::{time_ago, ActivityRecorder};
pub use self::app::{App, AppBuilder, BoardConfig};
pub use self::domain::BoardError;
pub use self::invite::InviteStateMachine;
pub use self::store::{StoreEvent, StoreListener, TaskStore};
pub use self::sync::{AssignmentResolver, SyncGateway};
