//! Authentication middleware and ownership checks
//!
//! Protected routes require `Authorization: Bearer <token>`. The token is
//! resolved through the configured [`IdentityProvider`](crate::identity::IdentityProvider)
//! and the resulting [`AuthenticatedUser`] is placed in request extensions.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use folio_common::db::Manuscript;
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::identity::{AuthenticatedUser, IdentityError};
use crate::AppState;

/// Authentication middleware
///
/// Returns 401 when the header is missing or malformed, or when the
/// identity provider rejects the token.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = bearer_token(&request)?;

    let user = state.identity.authenticate(&token).await.map_err(|e| {
        if matches!(e, IdentityError::Rejected) {
            warn!(path = %request.uri().path(), "Rejected bearer token");
        }
        ApiError::from(e)
    })?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

fn bearer_token(request: &Request) -> ApiResult<String> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

    let value = header
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Malformed Authorization header".to_string()))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim().to_string())
        }
        _ => Err(ApiError::Unauthorized(
            "Authorization header must be 'Bearer <token>'".to_string(),
        )),
    }
}

/// Fail with 403 unless `user` owns the manuscript
pub fn ensure_owner(manuscript: &Manuscript, user: &AuthenticatedUser) -> ApiResult<()> {
    if manuscript.author_id == user.id {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "Manuscript {} belongs to another author",
            manuscript.guid
        )))
    }
}
