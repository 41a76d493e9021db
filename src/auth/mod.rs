use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SecurityConfig;

/// Session token claims.
///
/// `impersonator_id` is set when an admin is acting as `sub`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impersonator_id: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    /// Claims valid for `security.jwt_expiry_hours` from now.
    pub fn new(user_id: impl Into<String>, role: impl Into<String>, security: &SecurityConfig) -> Self {
        let now = Utc::now();
        let expiry_hours = i64::try_from(security.jwt_expiry_hours).unwrap_or(i64::MAX / 3_600);
        let exp = (now + Duration::hours(expiry_hours)).timestamp();

        Self {
            sub: user_id.into(),
            email: None,
            role: role.into(),
            org_id: None,
            org_slug: None,
            org_role: None,
            impersonator_id: None,
            exp,
            iat: now.timestamp(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_org(mut self, id: impl Into<String>, slug: impl Into<String>, role: impl Into<String>) -> Self {
        self.org_id = Some(id.into());
        self.org_slug = Some(slug.into());
        self.org_role = Some(role.into());
        self
    }

    pub fn impersonated_by(mut self, admin_id: impl Into<String>) -> Self {
        self.impersonator_id = Some(admin_id.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("Invalid JWT token: {0}")]
    InvalidToken(String),

    #[error("JWT secret not configured")]
    InvalidSecret,
}

pub fn generate_jwt(claims: &Claims, security: &SecurityConfig) -> Result<String, JwtError> {
    let secret = &security.jwt_secret;

    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    let header = Header::default();

    encode(&header, claims, &encoding_key)
        .map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

pub fn validate_jwt(token: &str, security: &SecurityConfig) -> Result<Claims, JwtError> {
    let secret = &security.jwt_secret;

    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::default();

    let token_data = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| JwtError::InvalidToken(e.to_string()))?;

    Ok(token_data.claims)
}
