//! Sync - ローカルストアとリモートサービスの橋渡し
//!
//! - **AssignmentResolver**: 担当者の表示情報をメンバー ID に解決
//! - **SyncGateway**: ローカル変更をリモートへミラー
//! - **Inbox**: セッションユーザーの通知

pub mod gateway;
pub mod inbox;
pub mod resolver;

pub use self::gateway::{RemoteFailurePolicy, RemoteSync, SyncFailure, SyncGateway, TaskCreation};
pub use self::inbox::Inbox;
pub use self::resolver::{AssignmentResolver, Resolution};
