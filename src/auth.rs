use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_cookies::Cookies;

use crate::web::AppState;

/// Cookie the identity provider stores its session token in.
pub const SESSION_COOKIE: &str = "__session";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// A verified caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        let display_name = match claims.first_name.as_deref() {
            Some(first) if !first.is_empty() => {
                format!("{} {}", first, claims.last_name.as_deref().unwrap_or(""))
                    .trim()
                    .to_string()
            }
            _ => "Anonymous".to_string(),
        };

        Self {
            user_id: claims.sub,
            display_name,
        }
    }
}

/// Verifies session tokens issued by the identity provider (HS256).
#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn verify(&self, token: &str) -> crate::Result<Identity> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                tracing::debug!("Rejected session token: {}", e);
                crate::Error::Unauthorized
            })?;

        if data.claims.sub.is_empty() {
            return Err(crate::Error::Unauthorized);
        }

        Ok(data.claims.into())
    }

    pub fn issue_token(
        &self,
        user_id: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
        ttl: Duration,
    ) -> crate::Result<String> {
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (Utc::now() + ttl).timestamp(),
            first_name: first_name.map(String::from),
            last_name: last_name.map(String::from),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| crate::Error::Internal(format!("Failed to sign token: {}", e)))
    }
}

/// Extractor for routes that require a signed-in caller.
pub struct CurrentUser(pub Identity);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = crate::Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let bearer = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|s| s.trim().to_string());

        let token = match bearer {
            Some(token) => Some(token),
            None => Cookies::from_request_parts(parts, state)
                .await
                .ok()
                .and_then(|cookies| cookies.get(SESSION_COOKIE).map(|c| c.value().to_string())),
        };

        let token = token.ok_or(crate::Error::Unauthorized)?;
        state.auth.verify(&token).map(CurrentUser)
    }
}
