//! HTTP route handlers.

pub mod health;
pub mod metrics;
pub mod purchase;
pub mod store;

use axum::http::HeaderMap;
use common::UserId;

use crate::error::ApiError;

/// Header carrying the caller's user id, standing in for authentication.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Reads the caller's user id from [`USER_ID_HEADER`].
pub(crate) fn user_id_from(headers: &HeaderMap) -> Result<UserId, ApiError> {
    let value = headers
        .get(USER_ID_HEADER)
        .ok_or_else(|| ApiError::Unauthorized(format!("Missing {USER_ID_HEADER} header")))?;
    value
        .to_str()
        .ok()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid {USER_ID_HEADER} header")))
}
