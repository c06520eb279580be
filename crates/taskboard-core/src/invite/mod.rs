//! Invite - スペースへの招待とメンバー管理
//!
//! - **InviteStateMachine**: 招待の送信・応答とメンバーの削除
//! - **link**: `<origin>/invite/<CODE>` 形式の招待リンク

pub mod link;
pub mod machine;

pub use self::link::{code_from_link, invite_link};
pub use self::machine::{InviteStateMachine, DEFAULT_CODE_LEN};

#[cfg(test)]
mod tests;
