use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sampling::SamplingReason;

/// Accumulated structured record for one in-flight request.
///
/// Created by the request log middleware, enriched by collaborators through the
/// store functions, and serialized once at completion if the request is kept.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogContext {
    pub request_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_role: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_impersonated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impersonator_id: Option<String>,
    pub db_queries_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
    pub trace: Vec<TraceEntry>,
    pub sampled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling_reason: Option<SamplingReason>,
    #[serde(skip)]
    started: Instant,
}

impl Default for LogContext {
    fn default() -> Self {
        Self {
            request_id: String::new(),
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            method: String::new(),
            url: String::new(),
            status_code: None,
            ip: None,
            user_agent: None,
            user_id: None,
            user_role: None,
            org_id: None,
            org_slug: None,
            org_role: None,
            is_impersonated: false,
            impersonator_id: None,
            db_queries_count: 0,
            error: None,
            trace: Vec::new(),
            sampled: false,
            sampling_reason: None,
            started: Instant::now(),
        }
    }
}

impl LogContext {
    /// Start a context for a request that begins now.
    pub fn new(request_id: impl Into<String>, method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            method: method.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// Milliseconds elapsed since the request started, on the monotonic clock.
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Shallow-merge the populated fields of `patch`.
    ///
    /// `request_id` is only taken while the context has none yet.
    pub fn apply(&mut self, patch: ContextPatch) {
        if let Some(request_id) = patch.request_id {
            if self.request_id.is_empty() {
                self.request_id = request_id;
            }
        }
        if let Some(method) = patch.method {
            self.method = method;
        }
        if let Some(url) = patch.url {
            self.url = url;
        }
        if patch.status_code.is_some() {
            self.status_code = patch.status_code;
        }
        if patch.ip.is_some() {
            self.ip = patch.ip;
        }
        if patch.user_agent.is_some() {
            self.user_agent = patch.user_agent;
        }
        if patch.user_id.is_some() {
            self.user_id = patch.user_id;
        }
        if patch.user_role.is_some() {
            self.user_role = patch.user_role;
        }
        if patch.org_id.is_some() {
            self.org_id = patch.org_id;
        }
        if patch.org_slug.is_some() {
            self.org_slug = patch.org_slug;
        }
        if patch.org_role.is_some() {
            self.org_role = patch.org_role;
        }
        if let Some(is_impersonated) = patch.is_impersonated {
            self.is_impersonated = is_impersonated;
        }
        if patch.impersonator_id.is_some() {
            self.impersonator_id = patch.impersonator_id;
        }
        if let Some(count) = patch.db_queries_count {
            self.db_queries_count = count;
        }
        if patch.error.is_some() {
            self.error = patch.error;
        }
    }

    pub fn record_user(&mut self, user: &UserIdentity) {
        self.user_id = Some(user.id.clone());
        if user.role.is_some() {
            self.user_role = user.role.clone();
        }
    }

    pub fn record_org(&mut self, org: &OrgIdentity, role: Option<&str>) {
        self.org_id = Some(org.id.clone());
        if org.slug.is_some() {
            self.org_slug = org.slug.clone();
        }
        if let Some(role) = role {
            self.org_role = Some(role.to_string());
        }
    }

    pub fn record_impersonation(&mut self, impersonator_id: impl Into<String>) {
        self.is_impersonated = true;
        self.impersonator_id = Some(impersonator_id.into());
    }

    pub fn add_db_queries(&mut self, count: u32) {
        self.db_queries_count = self.db_queries_count.saturating_add(count);
    }

    pub fn push_trace(&mut self, level: TraceLevel, message: impl Into<String>) {
        let offset_ms = self.elapsed_ms();
        self.trace.push(TraceEntry {
            level,
            message: message.into(),
            offset_ms,
        });
    }

    /// Stamp end time, duration and status. Returns the duration in milliseconds.
    pub fn finish(&mut self, status_code: u16) -> u64 {
        let elapsed = self.started.elapsed();
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let end = chrono::Duration::from_std(elapsed)
            .ok()
            .and_then(|d| self.start_time.checked_add_signed(d))
            .unwrap_or(self.start_time);

        self.end_time = Some(end);
        self.duration_ms = Some(duration_ms);
        self.status_code = Some(status_code);
        duration_ms
    }

    /// Record the sampling outcome. Only the first call has any effect.
    pub fn mark_sampled(&mut self, sampled: bool, reason: SamplingReason) {
        if self.sampling_reason.is_none() {
            self.sampled = sampled;
            self.sampling_reason = Some(reason);
        }
    }

    /// `"<METHOD> <URL> <STATUS> <DURATION>ms"`, with the error message appended when present.
    pub fn summary(&self) -> String {
        let status = self
            .status_code
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let mut line = format!(
            "{} {} {} {}ms",
            self.method,
            self.url,
            status,
            self.duration_ms.unwrap_or(0)
        );
        if let Some(error) = &self.error {
            line.push_str(" ERROR: ");
            line.push_str(&error.message);
        }
        line
    }
}

/// Partial update for [`LogContext::apply`].
#[derive(Debug, Clone, Default)]
pub struct ContextPatch {
    pub request_id: Option<String>,
    pub method: Option<String>,
    pub url: Option<String>,
    pub status_code: Option<u16>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub user_id: Option<String>,
    pub user_role: Option<String>,
    pub org_id: Option<String>,
    pub org_slug: Option<String>,
    pub org_role: Option<String>,
    pub is_impersonated: Option<bool>,
    pub impersonator_id: Option<String>,
    pub db_queries_count: Option<u32>,
    pub error: Option<ErrorDetails>,
}

impl ContextPatch {
    pub fn request_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    Debug,
    Info,
    Warn,
}

/// Breadcrumb left during request handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    pub level: TraceLevel,
    pub message: String,
    pub offset_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorDetails {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Build details from an error, using its `source()` chain as the stack.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {cause}"));
            source = cause.source();
        }

        let details = Self::new(err.to_string());
        if chain.is_empty() {
            details
        } else {
            details.with_stack(chain.join("\n"))
        }
    }
}

/// Identity attached once authentication resolves.
#[derive(Debug, Clone, Default)]
pub struct UserIdentity {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

/// Organization attached once the tenant for the request resolves.
#[derive(Debug, Clone, Default)]
pub struct OrgIdentity {
    pub id: String,
    pub slug: Option<String>,
}
