//! Identity collaborator: resolves a bearer credential to a user id.
//!
//! The identity provider signs HS256 JWTs whose `sub` claim is the user id.
//! This module only checks signature and expiry; everything else about the
//! user lives with the provider.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::AppError;
use crate::AppState;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer credential")]
    MissingCredential,

    #[error("credential rejected")]
    InvalidCredential,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer token to the user id it was issued for.
    async fn resolve(&self, bearer: &str) -> Result<String, AuthError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    iat: i64,
}

pub struct JwtIdentity {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl JwtIdentity {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Issue a token for `user_id`. Used by the `token` CLI command and tests.
    pub fn mint(&self, user_id: &str, ttl: chrono::Duration) -> anyhow::Result<String> {
        let now = Utc::now();
        let expires = now
            .checked_add_signed(ttl)
            .context("token lifetime overflows the expiry timestamp")?;
        let claims = Claims {
            sub: user_id.to_string(),
            exp: expires.timestamp(),
            iat: now.timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }
}

/// Token lifetime from a minute count, rejecting values chrono cannot represent.
pub fn ttl_from_minutes(minutes: i64) -> anyhow::Result<chrono::Duration> {
    chrono::Duration::try_minutes(minutes)
        .with_context(|| format!("ttl of {} minutes is out of range", minutes))
}

#[async_trait]
impl IdentityProvider for JwtIdentity {
    async fn resolve(&self, bearer: &str) -> Result<String, AuthError> {
        let data = decode::<Claims>(bearer, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "bearer rejected");
            AuthError::InvalidCredential
        })?;
        if data.claims.sub.is_empty() {
            return Err(AuthError::InvalidCredential);
        }
        Ok(data.claims.sub)
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub String);

#[derive(Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let bearer = bearer_from_parts(parts).ok_or(AuthError::MissingCredential)?;
        let user_id = state.identity.resolve(&bearer).await?;
        Ok(AuthenticatedUser(user_id))
    }
}

/// `Authorization: Bearer <t>`, falling back to `?access_token=<t>` since
/// browser `EventSource` cannot set headers.
fn bearer_from_parts(parts: &Parts) -> Option<String> {
    let header = parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    header.or_else(|| {
        Query::<TokenQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|q| q.0.access_token)
            .filter(|t| !t.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_minted_token_resolves_to_subject() {
        let identity = JwtIdentity::new("test-secret");
        let token = identity.mint("tech-42", chrono::Duration::minutes(5)).unwrap();
        assert_eq!(identity.resolve(&token).await.unwrap(), "tech-42");
    }

    #[tokio::test]
    async fn test_wrong_secret_is_rejected() {
        let issuer = JwtIdentity::new("issuer-secret");
        let token = issuer.mint("u1", chrono::Duration::minutes(5)).unwrap();
        let verifier = JwtIdentity::new("other-secret");
        assert_eq!(
            verifier.resolve(&token).await.unwrap_err(),
            AuthError::InvalidCredential
        );
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let identity = JwtIdentity::new("test-secret");
        let token = identity.mint("u1", chrono::Duration::minutes(-10)).unwrap();
        assert!(identity.resolve(&token).await.is_err());
    }

    #[test]
    fn test_out_of_range_ttl_is_an_error() {
        assert_eq!(ttl_from_minutes(60).unwrap(), chrono::Duration::minutes(60));
        assert!(ttl_from_minutes(i64::MAX).is_err());
        assert!(ttl_from_minutes(i64::MIN).is_err());

        let identity = JwtIdentity::new("test-secret");
        let far_future = chrono::Duration::try_days(200_000_000).unwrap();
        assert!(identity.mint("u1", far_future).is_err());
    }

    #[test]
    fn test_bearer_from_header_or_query() {
        let req = axum::http::Request::builder()
            .uri("/api/v1/notifications/stream")
            .header("authorization", "Bearer abc")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert_eq!(bearer_from_parts(&parts).as_deref(), Some("abc"));

        let req = axum::http::Request::builder()
            .uri("/api/v1/notifications/stream?access_token=xyz")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert_eq!(bearer_from_parts(&parts).as_deref(), Some("xyz"));

        let req = axum::http::Request::builder()
            .uri("/api/v1/notifications/stream")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert!(bearer_from_parts(&parts).is_none());
    }
}
