//! Authentication context extraction
//!
//! Authentication itself happens upstream; the gateway injects the verified
//! identity as headers on every request. This extractor turns those headers
//! into the engine's `UserContext` and rejects requests missing them.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use audit_engine::UserContext;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ORGANIZATION_ID_HEADER: &str = "x-organization-id";

/// The authenticated caller, as asserted by the upstream gateway.
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub organization_id: Uuid,
}

impl AuthContext {
    pub fn new(user_id: Uuid, organization_id: Uuid) -> Self {
        Self {
            user_id,
            organization_id,
        }
    }

    pub fn user_context(&self) -> UserContext {
        UserContext::new(self.user_id, self.organization_id)
    }
}

fn header_uuid(parts: &Parts, name: &str) -> Result<Uuid, ApiError> {
    let value = parts
        .headers
        .get(name)
        .ok_or_else(|| ApiError::authentication(format!("missing {name} header")))?;
    let value = value
        .to_str()
        .map_err(|_| ApiError::authentication(format!("unreadable {name} header")))?;
    Uuid::parse_str(value)
        .map_err(|_| ApiError::authentication(format!("malformed {name} header")))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_uuid(parts, USER_ID_HEADER)?;
        let organization_id = header_uuid(parts, ORGANIZATION_ID_HEADER)?;
        Ok(Self {
            user_id,
            organization_id,
        })
    }
}
