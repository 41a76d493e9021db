// handlers/public/session.rs - GET /api/_auth/session handler
//
// Session check polled by the frontend. Never fails: an absent or invalid
// token is reported as `authenticated: false`.

use axum::{extract::State, http::HeaderMap, response::Json};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::auth::validate_jwt;
use crate::middleware::auth::extract_jwt_from_headers;

pub async fn session_get(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let claims = extract_jwt_from_headers(&headers)
        .ok()
        .and_then(|token| validate_jwt(&token, &state.security).ok());

    match claims {
        Some(claims) => Json(json!({
            "success": true,
            "data": {
                "authenticated": true,
                "user_id": claims.sub,
                "org_slug": claims.org_slug,
                "impersonated": claims.impersonator_id.is_some(),
            }
        })),
        None => Json(json!({
            "success": true,
            "data": { "authenticated": false }
        })),
    }
}
