//! CodeGenerator port - 招待コード生成の抽象化

use rand::Rng;

use crate::domain::InviteCode;

/// Alphabet of invite codes. Upper-case only so that codes survive being
/// retyped in any case.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub trait CodeGenerator: Send + Sync {
    fn generate_code(&self, len: usize) -> InviteCode;
}

/// Draws each character uniformly from [`CODE_ALPHABET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate_code(&self, len: usize) -> InviteCode {
        let mut rng = rand::thread_rng();
        let raw: String = (0..len)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        InviteCode::from_canonical(raw)
    }
}
