//! Enrichment API for collaborators (auth, repositories, handlers).
//!
//! Every function is a silent no-op when no request context is active.

use super::context::{ErrorDetails, OrgIdentity, TraceLevel, UserIdentity};
use super::store::with_request_context;

pub fn add_user_context(user: &UserIdentity) {
    with_request_context(|ctx| ctx.record_user(user));
}

pub fn add_org_context(org: &OrgIdentity, role: Option<&str>) {
    with_request_context(|ctx| ctx.record_org(org, role));
}

/// Mark the request as performed by an admin acting as another user.
pub fn set_impersonation(impersonator_id: &str) {
    with_request_context(|ctx| ctx.record_impersonation(impersonator_id));
}

pub fn increment_db_queries(count: u32) {
    with_request_context(|ctx| ctx.add_db_queries(count));
}

/// Append a breadcrumb with its offset from request start.
pub fn trace(level: TraceLevel, message: impl Into<String>) {
    let message = message.into();
    with_request_context(|ctx| ctx.push_trace(level, message));
}

/// Attach error details and the resulting status to the active request.
///
/// The first recorded error wins; later ones from outer layers are ignored.
pub fn record_error(status_code: u16, details: ErrorDetails) {
    with_request_context(|ctx| {
        if ctx.error.is_none() {
            ctx.error = Some(details);
            ctx.status_code = Some(status_code);
        }
    });
}
