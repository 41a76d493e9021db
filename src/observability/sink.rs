use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

use super::context::LogContext;
use super::sampling::Severity;

/// `tracing` target for emitted request records.
pub const REQUEST_LOG_TARGET: &str = "reqtail::request";

#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("failed to serialize request record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write request record: {0}")]
    Io(#[from] std::io::Error),

    #[error("log sink unavailable: {0}")]
    SinkUnavailable(String),
}

/// One line handed to a sink.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RequestRecord {
    Full(LogContext),
    /// Error from a request that never had a context.
    Minimal {
        status: u16,
        url: String,
        error: String,
    },
}

impl RequestRecord {
    pub fn context(&self) -> Option<&LogContext> {
        match self {
            RequestRecord::Full(ctx) => Some(ctx),
            RequestRecord::Minimal { .. } => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RequestRecord::Full(ctx) => ctx.status_code,
            RequestRecord::Minimal { status, .. } => Some(*status),
        }
    }
}

/// Destination for kept request records.
pub trait LogSink: Send + Sync {
    fn emit(
        &self,
        severity: Severity,
        summary: Option<&str>,
        record: &RequestRecord,
    ) -> Result<(), ObservabilityError>;
}

/// Scalar view of a record, one tracing field per record field.
struct EventFields<'a> {
    request_id: Option<&'a str>,
    method: Option<&'a str>,
    url: &'a str,
    status: Option<u16>,
    duration_ms: Option<u64>,
    ip: Option<&'a str>,
    user_agent: Option<&'a str>,
    user_id: Option<&'a str>,
    user_role: Option<&'a str>,
    org_id: Option<&'a str>,
    org_slug: Option<&'a str>,
    org_role: Option<&'a str>,
    impersonator_id: Option<&'a str>,
    db_queries_count: Option<u32>,
    trace_entries: Option<u64>,
    sampled: Option<bool>,
    sampling_reason: Option<&'static str>,
    error: Option<&'a str>,
    error_code: Option<&'a str>,
}

impl<'a> EventFields<'a> {
    fn of(record: &'a RequestRecord) -> Self {
        match record {
            RequestRecord::Full(ctx) => Self {
                request_id: Some(ctx.request_id.as_str()),
                method: Some(ctx.method.as_str()),
                url: ctx.url.as_str(),
                status: ctx.status_code,
                duration_ms: ctx.duration_ms,
                ip: ctx.ip.as_deref(),
                user_agent: ctx.user_agent.as_deref(),
                user_id: ctx.user_id.as_deref(),
                user_role: ctx.user_role.as_deref(),
                org_id: ctx.org_id.as_deref(),
                org_slug: ctx.org_slug.as_deref(),
                org_role: ctx.org_role.as_deref(),
                impersonator_id: ctx.impersonator_id.as_deref(),
                db_queries_count: Some(ctx.db_queries_count),
                trace_entries: Some(ctx.trace.len() as u64),
                sampled: Some(ctx.sampled),
                sampling_reason: ctx.sampling_reason.map(|r| r.as_str()),
                error: ctx.error.as_ref().map(|e| e.message.as_str()),
                error_code: ctx.error.as_ref().and_then(|e| e.code.as_deref()),
            },
            RequestRecord::Minimal { status, url, error } => Self {
                request_id: None,
                method: None,
                url: url.as_str(),
                status: Some(*status),
                duration_ms: None,
                ip: None,
                user_agent: None,
                user_id: None,
                user_role: None,
                org_id: None,
                org_slug: None,
                org_role: None,
                impersonator_id: None,
                db_queries_count: None,
                trace_entries: None,
                sampled: None,
                sampling_reason: None,
                error: Some(error.as_str()),
                error_code: None,
            },
        }
    }
}

macro_rules! request_event {
    ($level:expr, $fields:expr, $message:expr) => {{
        let f = $fields;
        tracing::event!(
            target: REQUEST_LOG_TARGET,
            $level,
            request_id = f.request_id,
            method = f.method,
            url = f.url,
            status = f.status,
            duration_ms = f.duration_ms,
            ip = f.ip,
            user_agent = f.user_agent,
            user_id = f.user_id,
            user_role = f.user_role,
            org_id = f.org_id,
            org_slug = f.org_slug,
            org_role = f.org_role,
            impersonator_id = f.impersonator_id,
            db_queries_count = f.db_queries_count,
            trace_entries = f.trace_entries,
            sampled = f.sampled,
            sampling_reason = f.sampling_reason,
            error = f.error,
            error_code = f.error_code,
            "{}",
            $message
        )
    }};
}

/// Writes records as `tracing` events under [`REQUEST_LOG_TARGET`], each record
/// field flattened into its own event field.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(
        &self,
        severity: Severity,
        summary: Option<&str>,
        record: &RequestRecord,
    ) -> Result<(), ObservabilityError> {
        let message = summary.unwrap_or("request completed");
        let fields = EventFields::of(record);

        match severity {
            Severity::Error => request_event!(Level::ERROR, fields, message),
            Severity::Warn => request_event!(Level::WARN, fields, message),
            Severity::Info => request_event!(Level::INFO, fields, message),
            Severity::Debug => request_event!(Level::DEBUG, fields, message),
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    timestamp: DateTime<Utc>,
    level: Severity,
    target: &'static str,
    message: &'a str,
    record: &'a RequestRecord,
}

/// Writes each kept record as one JSON object per line, with the full record
/// nested under `record`. Records below `min_level` are skipped.
pub struct JsonLinesSink<W> {
    make_writer: W,
    min_level: Severity,
}

impl<W> JsonLinesSink<W> {
    pub fn new(make_writer: W, min_level: Severity) -> Self {
        Self { make_writer, min_level }
    }
}

impl<W> LogSink for JsonLinesSink<W>
where
    W: for<'w> MakeWriter<'w> + Send + Sync,
{
    fn emit(
        &self,
        severity: Severity,
        summary: Option<&str>,
        record: &RequestRecord,
    ) -> Result<(), ObservabilityError> {
        if severity < self.min_level {
            return Ok(());
        }

        let mut line = serde_json::to_vec(&JsonLine {
            timestamp: Utc::now(),
            level: severity,
            target: REQUEST_LOG_TARGET,
            message: summary.unwrap_or("request completed"),
            record,
        })?;
        line.push(b'\n');

        let mut writer = self.make_writer.make_writer();
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct EmittedRecord {
    pub severity: Severity,
    pub summary: Option<String>,
    pub record: RequestRecord,
}

/// Keeps records in memory. Used by tests and local tooling.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<EmittedRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<EmittedRecord> {
        self.records.lock().clone()
    }

    /// Records for a given URL path prefix, in emission order.
    pub fn records_for(&self, url_prefix: &str) -> Vec<EmittedRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| match &r.record {
                RequestRecord::Full(ctx) => ctx.url.starts_with(url_prefix),
                RequestRecord::Minimal { url, .. } => url.starts_with(url_prefix),
            })
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn emit(
        &self,
        severity: Severity,
        summary: Option<&str>,
        record: &RequestRecord,
    ) -> Result<(), ObservabilityError> {
        self.records.lock().push(EmittedRecord {
            severity,
            summary: summary.map(str::to_string),
            record: record.clone(),
        });
        Ok(())
    }
}

/// Boundary between the request path and the sink.
///
/// Sink errors and sink panics end here; they are reported on stderr and never
/// reach the request.
#[derive(Clone)]
pub struct Emitter {
    sink: Arc<dyn LogSink>,
    development: bool,
}

impl Emitter {
    pub fn new(sink: Arc<dyn LogSink>, development: bool) -> Self {
        Self { sink, development }
    }

    pub fn is_development(&self) -> bool {
        self.development
    }

    pub fn emit_context(&self, severity: Severity, mut context: LogContext) {
        if !self.development {
            if let Some(error) = context.error.as_mut() {
                error.stack = None;
            }
        }
        let summary = self.development.then(|| context.summary());
        self.emit(severity, summary.as_deref(), &RequestRecord::Full(context));
    }

    pub fn emit_minimal(&self, status: u16, url: impl Into<String>, error: impl Into<String>) {
        let (url, error) = (url.into(), error.into());
        let summary = self
            .development
            .then(|| format!("{url} {status} ERROR: {error}"));
        let record = RequestRecord::Minimal { status, url, error };
        self.emit(Severity::for_status(status), summary.as_deref(), &record);
    }

    fn emit(&self, severity: Severity, summary: Option<&str>, record: &RequestRecord) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.sink.emit(severity, summary, record)));
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => eprintln!("reqtail: dropped request log record: {err}"),
            Err(_) => eprintln!("reqtail: request log sink panicked; record dropped"),
        }
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("development", &self.development)
            .finish_non_exhaustive()
    }
}
