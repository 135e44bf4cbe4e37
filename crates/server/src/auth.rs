//! Authentication middleware.
//!
//! Bearer tokens are issued by the coordinator, so every protected request
//! asks the coordinator who the token belongs to before the handler runs.

use crate::coordinator::{CoordinatorError, PERM_LEVEL_USER, User};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;

const AUTH_CHECK_FAILED: &str = "authentication check failed";

/// Extract bearer token from Authorization header.
/// Per RFC 6750, the "Bearer" scheme is case-insensitive.
fn extract_bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(v[7..].trim())
            } else {
                None
            }
        })
        .filter(|token| !token.is_empty())
}

/// Resolve the caller through the coordinator and require at least
/// [`PERM_LEVEL_USER`].
///
/// On success the [`User`] is added to the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(&req)
        .ok_or_else(|| ApiError::InvalidAuth("missing bearer token".to_string()))?;

    let user = state
        .coordinator
        .viewer(token)
        .await
        .map_err(viewer_error)?;
    require_perms(&user, PERM_LEVEL_USER)?;

    let span = tracing::info_span!("request", user_id = user.id);
    req.extensions_mut().insert(user);
    Ok(next.run(req).instrument(span).await)
}

/// Only the coordinator's own rejection message reaches the caller.
fn viewer_error(e: CoordinatorError) -> ApiError {
    match e {
        CoordinatorError::Rejected { message, .. } => {
            tracing::debug!(%message, "coordinator rejected token");
            ApiError::InvalidAuth(message)
        }
        other => {
            tracing::warn!(error = %other, "viewer lookup failed");
            ApiError::InvalidAuth(AUTH_CHECK_FAILED.to_string())
        }
    }
}

/// Require a minimum permission level.
pub fn require_perms(user: &User, level: i32) -> ApiResult<()> {
    if user.perms < level {
        return Err(ApiError::NotAuthorized(format!(
            "user {} lacks permission level {level}",
            user.username
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::PERM_LEVEL_ADMIN;
    use axum::body::Body;

    fn request(header: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/content/add");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn user(perms: i32) -> User {
        User {
            id: 1,
            username: "alice".to_string(),
            perms,
            auth_token: "EST-token".to_string(),
            storage_disabled: false,
        }
    }

    #[test]
    fn test_bearer_scheme_is_case_insensitive() {
        assert_eq!(
            extract_bearer_token(&request(Some("Bearer EST-abc"))),
            Some("EST-abc")
        );
        assert_eq!(
            extract_bearer_token(&request(Some("bEaReR EST-abc"))),
            Some("EST-abc")
        );
        assert_eq!(extract_bearer_token(&request(Some("Basic abc"))), None);
        assert_eq!(extract_bearer_token(&request(Some("Bearer "))), None);
        assert_eq!(extract_bearer_token(&request(None)), None);
    }

    #[test]
    fn test_require_perms() {
        assert!(require_perms(&user(PERM_LEVEL_USER), PERM_LEVEL_USER).is_ok());
        assert!(require_perms(&user(PERM_LEVEL_ADMIN), PERM_LEVEL_USER).is_ok());

        let err = require_perms(&user(1), PERM_LEVEL_USER).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
        assert_eq!(err.code(), crate::error::ERR_NOT_AUTHORIZED);
    }

    #[test]
    fn test_viewer_error_hides_transport_detail() {
        let err = viewer_error(CoordinatorError::Decode(
            "expected value at line 1 column 1".to_string(),
        ));
        assert_eq!(err.code(), crate::error::ERR_INVALID_AUTH);
        assert!(matches!(err, ApiError::InvalidAuth(detail) if detail == AUTH_CHECK_FAILED));

        let err = viewer_error(CoordinatorError::Rejected {
            code: 401,
            message: "ERR_INVALID_TOKEN".to_string(),
        });
        assert!(matches!(err, ApiError::InvalidAuth(detail) if detail == "ERR_INVALID_TOKEN"));
    }
}
