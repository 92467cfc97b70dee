//! Key/token header authentication.

use axum::http::HeaderMap;
use thiserror::Error;
use uuid::Uuid;

use crate::config::AuthConfig;

pub const API_KEY_HEADER: &str = "X-API-KEY";
pub const API_TOKEN_HEADER: &str = "X-API-TOKEN";

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub key_id: Uuid,
    pub write: bool,
}

impl Principal {
    pub fn require_write(&self) -> Result<(), AuthError> {
        if self.write {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),

    #[error("unknown API key")]
    UnknownKey,

    #[error("token does not match key")]
    InvalidToken,

    #[error("API key has expired")]
    KeyExpired,

    #[error("API key lacks write permission")]
    Forbidden,
}

impl AuthError {
    /// Forbidden is the only failure where the caller is known.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden)
    }
}

/// Authenticate a request from its headers at the current time.
pub fn authenticate(headers: &HeaderMap, config: &AuthConfig) -> Result<Principal, AuthError> {
    let key = header(headers, API_KEY_HEADER)?;
    let token = header(headers, API_TOKEN_HEADER)?;
    authenticate_at(key, token, config, chrono::Utc::now().timestamp_millis())
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, AuthError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingHeader(name))
}

pub fn authenticate_at(
    key: &str,
    token: &str,
    config: &AuthConfig,
    now_ms: i64,
) -> Result<Principal, AuthError> {
    let key_id = Uuid::parse_str(key).map_err(|_| AuthError::UnknownKey)?;
    let entry = config
        .keys
        .iter()
        .find(|k| k.key == key_id)
        .ok_or(AuthError::UnknownKey)?;

    if entry.token != token {
        return Err(AuthError::InvalidToken);
    }
    if entry.expires_unix != -1 && entry.expires_unix < now_ms {
        return Err(AuthError::KeyExpired);
    }

    Ok(Principal {
        key_id,
        write: entry.write,
    })
}
