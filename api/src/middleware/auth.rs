//! Authentication middleware
//!
//! The auth provider is an external collaborator: this layer only verifies
//! the bearer token and hands a `(user id, role)` identity to the handlers,
//! which enforce ownership.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::ApiError;
use crate::ApiState;

/// Caller role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Campaign owner
    Advertiser,
    /// Back-office operator
    Admin,
    /// Ad-serving machine account (tracking only)
    Service,
}

/// Verified caller identity, inserted into request extensions
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

impl Identity {
    /// Owner-or-admin check for campaign and balance mutation
    pub fn authorize_owner(&self, owner: Uuid) -> Result<(), ApiError> {
        if self.role == Role::Admin || self.user_id == owner {
            Ok(())
        } else {
            Err(ApiError::Forbidden("not the owner of this resource"))
        }
    }

    /// Admin-only check
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(ApiError::Forbidden("admin role required"))
        }
    }
}

/// JWT claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: usize,
}

/// Verify the bearer token and stash the identity for handlers
pub async fn require_auth(
    State(state): State<Arc<ApiState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized("missing bearer token"))?;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized("invalid bearer token"))?
    .claims;

    req.extensions_mut().insert(Identity {
        user_id: claims.sub,
        role: claims.role,
    });
    Ok(next.run(req).await)
}

/// Mint a token. Used by the token endpoint of the identity service in
/// production deployments; handy for tests here.
pub fn issue_token(secret: &str, user_id: Uuid, role: Role, ttl_secs: i64) -> String {
    let claims = Claims {
        sub: user_id,
        role,
        exp: (chrono::Utc::now().timestamp() + ttl_secs) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap_or_default()
}
