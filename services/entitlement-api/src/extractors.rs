//! Axum extractors for caller identity

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use scribe_core::QuotaError;
use scribe_types::UserId;

use crate::error::ApiError;

/// Header carrying the authenticated user's id, set by the upstream gateway
pub const USER_ID_HEADER: &str = "x-user-id";

/// User on whose behalf the request is made
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserId);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or(ApiError::MissingUserId)?;
        let raw = value
            .to_str()
            .map_err(|_| ApiError::BadRequest("x-user-id is not valid text".into()))?;
        let user_id = UserId::parse(raw).map_err(QuotaError::from)?;

        Ok(Self(user_id))
    }
}
