//! Shareable invite links: `<origin>/invite/<CODE>`.

use crate::domain::{BoardError, InviteCode};

const INVITE_PATH: &str = "/invite/";

pub fn invite_link(origin: &str, code: &InviteCode) -> String {
    format!("{}{INVITE_PATH}{code}", origin.trim_end_matches('/'))
}

/// Extract the code from a full link, a bare path, or a bare code.
pub fn code_from_link(link: &str) -> Result<InviteCode, BoardError> {
    let link = link.trim();
    let raw = match link.rfind(INVITE_PATH) {
        Some(pos) => &link[pos + INVITE_PATH.len()..],
        None => link,
    };
    let raw = raw
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');
    InviteCode::parse(raw)
}
