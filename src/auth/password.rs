//! Password hashing and password-reset tokens.
//!
//! bcrypt work runs on the blocking pool so request tasks are not stalled.

use rand::RngCore;
use sha2::{Digest, Sha256};

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("Password hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub async fn hash_password(password: &str, cost: u32) -> Result<String, PasswordError> {
    let password = password.to_string();
    let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
    Ok(hashed)
}

/// Compare a candidate password against a stored bcrypt hash
pub async fn verify_password(candidate: &str, hashed: &str) -> Result<bool, PasswordError> {
    let candidate = candidate.to_string();
    let hashed = hashed.to_string();
    let matches = tokio::task::spawn_blocking(move || bcrypt::verify(candidate, &hashed)).await??;
    Ok(matches)
}

/// A freshly generated reset token: `token` goes to the user, `token_hash` to the database
#[derive(Debug, Clone)]
pub struct ResetToken {
    pub token: String,
    pub token_hash: String,
}

impl ResetToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        let token_hash = hash_reset_token(&token);
        Self { token, token_hash }
    }
}

pub fn hash_reset_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashed_password_verifies() {
        let hashed = hash_password("pass1234", 4).await.unwrap();
        assert_ne!(hashed, "pass1234");
        assert!(verify_password("pass1234", &hashed).await.unwrap());
        assert!(!verify_password("wrong-password", &hashed).await.unwrap());
    }

    #[test]
    fn reset_token_hash_matches_stored_hash() {
        let reset = ResetToken::generate();
        assert_eq!(reset.token.len(), 64);
        assert_eq!(hash_reset_token(&reset.token), reset.token_hash);
        assert_ne!(reset.token, reset.token_hash);
    }

    #[test]
    fn reset_tokens_are_unique() {
        assert_ne!(ResetToken::generate().token, ResetToken::generate().token);
    }

    #[test]
    fn sha256_hex_of_known_input() {
        assert_eq!(
            hash_reset_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
