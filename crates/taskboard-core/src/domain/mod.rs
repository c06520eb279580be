//! Domain model (IDs, stages, tasks, spaces, invites, notifications, activity).

pub mod activity;
pub mod email;
pub mod errors;
pub mod ids;
pub mod invite;
pub mod notification;
pub mod space;
pub mod stage;
pub mod task;

pub use self::activity::{Activity, ActivityKind};
pub use self::email::{normalize_email, validate_email};
pub use self::errors::{BoardError, Duplicate, RemoteError};
pub use self::ids::{
    CorrelationId, InviteId, NotificationId, RemoteTaskId, SpaceId, TaskId, UserId,
};
pub use self::invite::{Invite, InviteCode, InviteStatus, InviteTarget};
pub use self::notification::{Notification, NotificationKind};
pub use self::space::{Member, Membership, Role, Space, UserProfile};
pub use self::stage::PipelineStage;
pub use self::task::{Assignee, Due, Task, TaskDraft, TaskPatch};
