use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use futures::FutureExt;
use tracing::Instrument;
use uuid::Uuid;

use crate::observability::{
    run_with_context, ErrorDetails, LogContext, Observability, RequestHandle, RequestOutcome, SamplingReason,
    Severity,
};

/// Per-request logging: builds the log context, scopes the handler inside it,
/// and decides at completion whether the record is emitted.
///
/// Observation never alters the response; handler panics are logged and then
/// resumed unchanged.
pub async fn request_log_middleware(
    State(obs): State<Arc<Observability>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let url = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    if !obs.should_track(&path) {
        return run_untracked(&obs, url, request, next).await;
    }

    let mut context = LogContext::new(Uuid::new_v4().to_string(), request.method().as_str(), url);
    context.ip = client_ip(&request);
    context.user_agent = header_value(request.headers(), header::USER_AGENT.as_str());

    let span = tracing::debug_span!("request", request_id = %context.request_id);
    let handle = RequestHandle::new(context);
    let mut lifecycle = RequestLifecycle::new(handle.clone(), Arc::clone(&obs));

    let outcome = run_with_context(handle, AssertUnwindSafe(next.run(request)).catch_unwind())
        .instrument(span)
        .await;

    match outcome {
        Ok(response) => {
            let status = response.status().as_u16();
            let surfaced = response.extensions().get::<ErrorDetails>().cloned();
            if surfaced.is_some() || lifecycle.error_recorded() {
                lifecycle.complete_with_error(status, surfaced);
            }
            lifecycle.complete(status);
            response
        }
        Err(panic) => {
            let details = ErrorDetails::new(panic_message(panic.as_ref())).with_code("PANIC");
            lifecycle.complete_with_error(StatusCode::INTERNAL_SERVER_ERROR.as_u16(), Some(details));
            std::panic::resume_unwind(panic)
        }
    }
}

/// Requests without a context still surface server failures as a minimal record.
async fn run_untracked(obs: &Observability, url: String, request: Request, next: Next) -> Response {
    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => {
            let status = response.status();
            if status.is_server_error() {
                let message = response
                    .extensions()
                    .get::<ErrorDetails>()
                    .map(|d| d.message.clone())
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("server error").to_string());
                obs.emitter.emit_minimal(status.as_u16(), url, message);
            }
            response
        }
        Err(panic) => {
            obs.emitter.emit_minimal(500, url, panic_message(panic.as_ref()));
            std::panic::resume_unwind(panic)
        }
    }
}

/// Completion state machine for one tracked request.
///
/// The error path takes priority: once it has run, or once an error is on the
/// context, the normal path does nothing. Dropping an unfinished lifecycle means
/// the handler future was cancelled, which is reported through the error path.
pub struct RequestLifecycle {
    handle: RequestHandle,
    obs: Arc<Observability>,
    finalized: bool,
}

impl RequestLifecycle {
    pub fn new(handle: RequestHandle, obs: Arc<Observability>) -> Self {
        Self {
            handle,
            obs,
            finalized: false,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn error_recorded(&self) -> bool {
        self.handle.update(|ctx| ctx.error.is_some())
    }

    /// Log immediately, bypassing the sampling policy.
    pub fn complete_with_error(&mut self, status_code: u16, details: Option<ErrorDetails>) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        let context = self.handle.update(|ctx| {
            if ctx.error.is_none() {
                ctx.error = Some(
                    details.unwrap_or_else(|| ErrorDetails::new(format!("request failed with status {status_code}"))),
                );
            }
            ctx.finish(status_code);
            ctx.mark_sampled(true, SamplingReason::Error);
            ctx.clone()
        });

        self.obs
            .emitter
            .emit_context(Severity::for_status(status_code), context);
    }

    /// Normal completion: stamp timing, consult the policy, emit if kept.
    pub fn complete(&mut self, status_code: u16) {
        if self.finalized {
            return;
        }
        if self.error_recorded() {
            // Owned by the error path.
            self.finalized = true;
            return;
        }
        self.finalized = true;

        let duration_ms = self.handle.update(|ctx| ctx.finish(status_code));
        let decision = self.obs.policy.decide(RequestOutcome {
            status_code,
            duration_ms,
        });
        let context = self.handle.update(|ctx| {
            ctx.mark_sampled(decision.should_log, decision.reason);
            decision.should_log.then(|| ctx.clone())
        });

        if let Some(context) = context {
            self.obs
                .emitter
                .emit_context(Severity::for_status(status_code), context);
        }
    }
}

impl Drop for RequestLifecycle {
    fn drop(&mut self) {
        if !self.finalized {
            let details = ErrorDetails::new("request cancelled before completion").with_code("CANCELLED");
            self.complete_with_error(StatusCode::INTERNAL_SERVER_ERROR.as_u16(), Some(details));
        }
    }
}

/// First hop of `x-forwarded-for`, then `x-real-ip`, then the socket peer.
fn client_ip(request: &Request) -> Option<String> {
    let headers = request.headers();
    header_value(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
        .filter(|v| !v.is_empty())
        .or_else(|| header_value(headers, "x-real-ip"))
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
