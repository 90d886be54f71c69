//! Referral token derivation
//!
//! Tokens are short, shareable and stable: the first four bytes of a keyed
//! SHA-256 digest, hex-encoded uppercase. Eight characters keeps them easy
//! to paste into a chat message while the secret keeps them unguessable.
//! The salted variant exists for the rare collision on insert.

use rand::Rng;
use sha2::{Digest, Sha256};

pub const TOKEN_LEN: usize = 8;

/// Deterministic token for a user. Same secret and user id always yield the
/// same eight uppercase hex characters.
pub fn referral_token(secret: &str, user_id: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.to_le_bytes());
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..TOKEN_LEN / 2]).to_uppercase()
}

/// Token with a random salt mixed in. Used when the deterministic token is
/// already taken by another account.
pub fn salted_referral_token(secret: &str, user_id: i64) -> String {
    let salt: u64 = rand::thread_rng().gen();
    let mut hasher = Sha256::new();
    hasher.update(user_id.to_le_bytes());
    hasher.update(salt.to_le_bytes());
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..TOKEN_LEN / 2]).to_uppercase()
}
