//! `LogSink`: fire-and-forget structured event emission (Section 6 and
//! Section 4.7 of the design — a sink failure MUST NOT affect the
//! connection it's reporting on).

use std::collections::BTreeMap;

#[derive(Clone, Debug)]
pub struct LogEvent {
    pub timestamp: u64,
    pub level: &'static str,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

impl LogEvent {
    pub fn new(level: &'static str, message: impl Into<String>) -> Self {
        Self {
            timestamp: now_unix(),
            level,
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.insert(key.into(), value.to_string());
        self
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub trait LogSink: Send + Sync {
    fn emit(&self, event: LogEvent);
}

/// Emits every event as a structured `tracing` event — the ambient
/// observability layer (no metrics/dashboard collaborator, Section 1 keeps
/// that out of scope).
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn emit(&self, event: LogEvent) {
        match event.level {
            "error" => tracing::error!(fields = ?event.fields, "{}", event.message),
            "warn" => tracing::warn!(fields = ?event.fields, "{}", event.message),
            "debug" => tracing::debug!(fields = ?event.fields, "{}", event.message),
            _ => tracing::info!(fields = ?event.fields, "{}", event.message),
        }
    }
}
