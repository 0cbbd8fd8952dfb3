use std::time::Duration;

use axum::http::HeaderMap;
use fieldledger_core::Actor;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub session_id: Option<String>,
}

impl AuthenticatedUser {
    /// Identity stamped into audit fields
    pub fn actor(&self) -> Actor {
        Actor::new(&self.user_id)
    }
}

/// Verifies HS256 bearer tokens signed with the shared secret
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    clock_skew: Duration,
}

impl JwtVerifier {
    pub fn new(secret: &str, clock_skew: Duration) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            clock_skew,
        }
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Lifetime claims are checked below with the configured skew.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let decoded = decode::<Claims>(token, &self.key, &validation).map_err(|error| {
            AppError::unauthorized(format!("Token validation failed: {}", sanitize(&error)))
        })?;
        validate_temporal_claims(&decoded.claims, self.clock_skew)?;

        let claims = decoded.claims;
        let user_id = claims
            .sub
            .or(claims.unique_name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::unauthorized("Token subject is missing"))?;

        Ok(AuthenticatedUser {
            user_id,
            session_id: claims.jti,
        })
    }
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized("Authorization scheme must be `Bearer`"));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("Bearer token is empty"));
    }

    Ok(token)
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Option<String>,
    unique_name: Option<String>,
    exp: Option<i64>,
    iat: Option<i64>,
    nbf: Option<i64>,
    jti: Option<String>,
}

fn validate_temporal_claims(claims: &Claims, clock_skew: Duration) -> Result<(), AppError> {
    let now = chrono::Utc::now().timestamp();
    let skew = i64::try_from(clock_skew.as_secs()).unwrap_or(0);

    let exp = claims
        .exp
        .ok_or_else(|| AppError::unauthorized("Token missing `exp` claim"))?;
    if exp <= now.saturating_sub(skew) {
        return Err(AppError::unauthorized("Token is expired"));
    }

    if let Some(iat) = claims.iat {
        if iat > now.saturating_add(skew) {
            return Err(AppError::unauthorized("Token `iat` is in the future"));
        }
    }

    if let Some(nbf) = claims.nbf {
        if nbf > now.saturating_add(skew) {
            return Err(AppError::unauthorized("Token is not yet valid"));
        }
    }

    Ok(())
}

fn sanitize(error: &impl std::fmt::Display) -> String {
    error.to_string().replace('\n', " ").trim().to_string()
}
