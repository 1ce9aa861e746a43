pub mod password;
pub mod session;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config;

/// Session token claims. `id` is the user the token was issued to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub id: Uuid,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: Uuid) -> Self {
        Self::issued_at(user_id, Utc::now(), config::config().security.jwt_expiry_hours)
    }

    pub fn issued_at(user_id: Uuid, now: DateTime<Utc>, expiry_hours: u64) -> Self {
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            id: user_id,
            exp,
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),
    #[error("Invalid JWT secret")]
    InvalidSecret,
    #[error("JWT has expired")]
    Expired,
    #[error("Invalid JWT: {0}")]
    Invalid(String),
}

/// Sign a session token for the given user with the configured secret
pub fn generate_jwt(user_id: Uuid) -> Result<String, JwtError> {
    encode_jwt(&Claims::new(user_id), &config::config().security.jwt_secret)
}

/// Verify signature and expiry of a session token with the configured secret
pub fn validate_jwt(token: &str) -> Result<Claims, JwtError> {
    decode_jwt(token, &config::config().security.jwt_secret)
}

pub fn encode_jwt(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    let header = Header::default();

    encode(&header, claims, &encoding_key).map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::default();

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            _ => JwtError::Invalid(e.to_string()),
        })
}
