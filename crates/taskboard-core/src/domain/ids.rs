//! Domain identifiers (strongly-typed IDs).
//!
//! Remote-issued and client-generated identities are ULIDs wrapped in
//! `Id<T>`, where `T` is a zero-sized marker. Local task ids are plain
//! counters allocated by the store (`TaskId`), because they are scoped to a
//! pipeline and only have to be unique there.
//!
//! ## Phantom Type パターン
//! `Id<T>` は共通実装を一つにまとめつつ、`SpaceId` と `UserId` のような
//! 異なる ID をコンパイル時に混同できないようにします。

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"space-", "user-" など）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// Serialized as the bare ULID string so rows exchanged with the remote
/// service stay readable.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

impl<T: IdMarker> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.ulid.serialize(serializer)
    }
}

impl<'de, T: IdMarker> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ulid::deserialize(deserializer).map(Self::from_ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

macro_rules! id_marker {
    ($marker:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $marker {}

        impl IdMarker for $marker {
            fn prefix() -> &'static str {
                $prefix
            }
        }
    };
}

id_marker!(Space, "space-");
id_marker!(User, "user-");
id_marker!(Invite, "invite-");
id_marker!(Notification, "notif-");
id_marker!(Correlation, "corr-");
id_marker!(RemoteTask, "rtask-");

/// Identifier of a Space (one board, one roster).
pub type SpaceId = Id<Space>;

/// Durable identity of a user as issued by the remote service.
pub type UserId = Id<User>;

pub type InviteId = Id<Invite>;

pub type NotificationId = Id<Notification>;

/// Client-side id threading an optimistic insert through its remote write.
pub type CorrelationId = Id<Correlation>;

/// Id the remote service issued for a task row.
pub type RemoteTaskId = Id<RemoteTask>;

/// Local task id, unique within its space's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let space = SpaceId::from_ulid(Ulid::new());
        let user = UserId::from_ulid(Ulid::new());

        assert!(space.to_string().starts_with("space-"));
        assert!(user.to_string().starts_with("user-"));
        // let _: SpaceId = user; // <- does not compile
    }

    #[test]
    fn ids_serialize_as_bare_ulid() {
        let ulid = Ulid::new();
        let invite = InviteId::from_ulid(ulid);

        let serialized = serde_json::to_string(&invite).unwrap();
        assert_eq!(serialized, format!("\"{ulid}\""));

        let back: InviteId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(back, invite);
    }

    #[test]
    fn task_id_next_is_strictly_greater() {
        let id = TaskId::new(41);
        assert_eq!(id.next(), TaskId::new(42));
        assert!(id.next() > id);
        assert_eq!(id.to_string(), "task-41");
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<SpaceId>(), size_of::<Ulid>());
        assert_eq!(size_of::<CorrelationId>(), 16);
    }
}
