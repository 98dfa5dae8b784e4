//! Caller identity extracted from request headers.
//!
//! The gateway in front of this service authenticates the caller and
//! forwards the numeric ids as `X-User-ID` / `X-Admin-ID`.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const ADMIN_ID_HEADER: &str = "X-Admin-ID";

/// The end user making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: i64,
}

/// An operator allowed to use `/admin` routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminContext {
    pub admin_id: i64,
}

fn header_id(parts: &Parts, header: &str) -> Result<i64, AppError> {
    let value = parts
        .headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing {} header", header)))?;

    match value.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(AppError::Unauthorized(anyhow::anyhow!(
            "Invalid {} header",
            header
        ))),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_id(parts, USER_ID_HEADER)?;
        tracing::Span::current().record("user_id", user_id);
        Ok(UserContext { user_id })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let admin_id = header_id(parts, ADMIN_ID_HEADER)?;
        tracing::Span::current().record("admin_id", admin_id);
        Ok(AdminContext { admin_id })
    }
}
