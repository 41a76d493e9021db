//! Breadcrumb helpers: `log::debug("...")` and friends append to the active
//! request's trace instead of writing a line of their own.

use super::context::TraceLevel;
use super::enrich::trace;

pub fn debug(message: impl Into<String>) {
    trace(TraceLevel::Debug, message);
}

pub fn info(message: impl Into<String>) {
    trace(TraceLevel::Info, message);
}

pub fn warn(message: impl Into<String>) {
    trace(TraceLevel::Warn, message);
}
