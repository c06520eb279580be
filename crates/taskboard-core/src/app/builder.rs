//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - ストアなどの共有状態は明示的に構築して Arc で配る

use std::sync::Arc;

use crate::activity::ActivityRecorder;
use crate::domain::{validate_email, UserProfile};
use crate::invite::InviteStateMachine;
use crate::ports::{
    Clock, CodeGenerator, IdGenerator, RandomCodeGenerator, RemoteService, SystemClock,
    UlidGenerator,
};
use crate::store::TaskStore;
use crate::sync::{AssignmentResolver, Inbox, SyncGateway};

use super::config::{BoardConfig, ConfigError};

/// AppBuilder はセッションユーザー一人分のアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(remote, profile)
///     .config(BoardConfig::from_json_str(&raw)?)
///     .build()?;
/// ```
pub struct AppBuilder {
    remote: Arc<dyn RemoteService>,
    actor: UserProfile,
    config: BoardConfig,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    codes: Option<Arc<dyn CodeGenerator>>,
    store: Option<Arc<TaskStore>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("session user {0:?} has no usable email address")]
    InvalidActor(String),
}

impl AppBuilder {
    pub fn new(remote: Arc<dyn RemoteService>, actor: UserProfile) -> Self {
        Self {
            remote,
            actor,
            config: BoardConfig::default(),
            clock: None,
            ids: None,
            codes: None,
            store: None,
        }
    }

    pub fn config(mut self, config: BoardConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn code_generator(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = Some(codes);
        self
    }

    /// Reuse an existing store. Its id allocation strategy is kept; the
    /// configured one applies only to stores built here.
    pub fn store(mut self, store: Arc<TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// # 検証
    /// - 設定値（origin, activity_capacity, invite_code_len）
    /// - セッションユーザーのメールアドレス
    pub fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;
        let mut actor = self.actor;
        actor.email =
            validate_email(&actor.email).map_err(|_| BuildError::InvalidActor(actor.name.clone()))?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));
        let codes = self.codes.unwrap_or_else(|| Arc::new(RandomCodeGenerator));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(TaskStore::new(self.config.id_allocation, clock.clone())));

        let activity = Arc::new(ActivityRecorder::new(
            self.config.activity_capacity,
            actor.name.clone(),
            clock.clone(),
        ));
        store.subscribe(activity.clone());

        let resolver = Arc::new(AssignmentResolver::new(self.remote.clone()));
        let gateway = SyncGateway::new(
            store.clone(),
            self.remote.clone(),
            resolver.clone(),
            ids.clone(),
            clock.clone(),
            actor.clone(),
            self.config.remote_failure,
        );
        let invites = InviteStateMachine::new(
            self.remote.clone(),
            resolver.clone(),
            ids,
            codes,
            clock,
            actor.clone(),
            self.config.origin.clone(),
            self.config.invite_code_len,
        );
        let inbox = Inbox::new(self.remote, actor.id);

        Ok(App {
            config: self.config,
            actor,
            store,
            activity,
            resolver,
            gateway,
            invites,
            inbox,
        })
    }
}

/// App はセッションユーザー一人分の構成済みコンポーネント
pub struct App {
    pub config: BoardConfig,
    pub actor: UserProfile,
    pub store: Arc<TaskStore>,
    pub activity: Arc<ActivityRecorder>,
    pub resolver: Arc<AssignmentResolver>,
    pub gateway: SyncGateway,
    pub invites: InviteStateMachine,
    pub inbox: Inbox,
}
