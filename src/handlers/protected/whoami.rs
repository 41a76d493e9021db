// handlers/protected/whoami.rs - GET /api/auth/whoami handler

use axum::{extract::Extension, response::Json};
use serde_json::{json, Value};

use crate::middleware::AuthUser;
use crate::observability;

/// GET /api/auth/whoami - identity of the token holder
pub async fn whoami_get(Extension(user): Extension<AuthUser>) -> Json<Value> {
    observability::log::debug("whoami resolved from token claims");

    Json(json!({
        "success": true,
        "data": {
            "id": user.user_id,
            "email": user.email,
            "role": user.role,
            "organization": user.org_slug.as_ref().map(|slug| json!({
                "id": user.org_id,
                "slug": slug,
                "role": user.org_role,
            })),
            "impersonated": user.is_impersonated(),
            "impersonator_id": user.impersonator_id,
        }
    }))
}
