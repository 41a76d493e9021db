use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::app::AppState;
use crate::auth::{validate_jwt, Claims, JwtError};
use crate::error::ApiError;
use crate::observability::{self, UserIdentity};

/// Authenticated user context extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
    pub role: String,
    pub org_id: Option<String>,
    pub org_slug: Option<String>,
    pub org_role: Option<String>,
    pub impersonator_id: Option<String>,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
            org_id: claims.org_id,
            org_slug: claims.org_slug,
            org_role: claims.org_role,
            impersonator_id: claims.impersonator_id,
        }
    }
}

impl AuthUser {
    pub fn is_impersonated(&self) -> bool {
        self.impersonator_id.is_some()
    }
}

/// JWT authentication middleware that validates tokens, extracts user context
/// and attaches the identity to the request log
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // Extract JWT from Authorization header
    let token = extract_jwt_from_headers(&headers).map_err(ApiError::unauthorized)?;

    // Validate and decode JWT
    let claims = validate_jwt(&token, &state.security).map_err(|e| match e {
        JwtError::InvalidSecret => {
            tracing::error!("JWT secret not configured; rejecting authenticated request");
            ApiError::internal_server_error("Authentication is not configured")
        }
        other => ApiError::unauthorized(other.to_string()),
    })?;

    let auth_user = AuthUser::from(claims);

    observability::add_user_context(&UserIdentity {
        id: auth_user.user_id.clone(),
        email: auth_user.email.clone(),
        role: Some(auth_user.role.clone()),
    });
    if let Some(admin_id) = &auth_user.impersonator_id {
        observability::set_impersonation(admin_id);
        observability::log::info(format!("impersonation by {admin_id}"));
    }

    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

/// Extract JWT token from Authorization header
pub fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<String, String> {
    let auth_header = headers
        .get("authorization")
        .ok_or_else(|| "Missing Authorization header".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err("Empty JWT token".to_string());
        }
        Ok(token.to_string())
    } else {
        Err("Authorization header must use Bearer token format".to_string())
    }
}
