//! Per-request API log records and the sinks that emit them.
//!
//! Exactly one [`LogRecord`] is emitted per API request. Emission is
//! synchronous so that it can run from a drop guard when the request is
//! cancelled.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use apigate_core::{ContextKey, RequestContext};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};

/// Log severity derived from the response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

impl Severity {
    /// `Error` for 5xx, `Info` otherwise.
    #[must_use]
    pub fn for_status(status: u16) -> Self {
        if status >= 500 {
            Self::Error
        } else {
            Self::Info
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Error => "ERROR",
        }
    }
}

/// One structured record describing a completed (or abandoned) request.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub severity: Severity,
    pub time: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_s: f64,
    pub context: RequestContext,
    /// Message of the fault that produced a 5xx, if any.
    pub fault: Option<String>,
}

impl LogRecord {
    /// Shortcut for `context.attribute(name)`, accepting `meta.` names.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match name {
            "correlation_id" => Some(self.context.correlation_id()),
            "route" => Some(self.context.route()),
            _ => self.context.attribute(name),
        }
    }

    /// Flattens the record into its stable keys. Absent context keys are
    /// omitted rather than written as null.
    #[must_use]
    pub fn to_json(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("severity".into(), self.severity.as_str().into());
        fields.insert(
            "time".into(),
            self.time.to_rfc3339_opts(SecondsFormat::Millis, true).into(),
        );
        fields.insert("method".into(), self.method.clone().into());
        fields.insert("path".into(), self.path.clone().into());
        fields.insert("status".into(), self.status.into());
        fields.insert("duration_s".into(), self.duration_s.into());
        for (key, value) in self.context.log_fields() {
            fields.insert(key.to_string(), value.into());
        }
        if let Some(fault) = &self.fault {
            fields.insert("exception.message".into(), fault.clone().into());
        }
        fields
    }
}

/// Destination for per-request log records.
///
/// Used as `Arc<dyn LogSink>`.
pub trait LogSink: Send + Sync {
    fn emit(&self, record: &LogRecord);
}

/// Emits each record as one `tracing` event on target `apigate::api`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

macro_rules! api_event {
    ($level:expr, $record:expr) => {{
        let record = $record;
        let ctx = &record.context;
        tracing::event!(
            target: "apigate::api",
            $level,
            correlation_id = ctx.correlation_id(),
            route = ctx.route(),
            method = record.method.as_str(),
            path = record.path.as_str(),
            status = record.status,
            duration_s = record.duration_s,
            meta.caller_id = ctx.get(ContextKey::CallerId),
            meta.remote_ip = ctx.get(ContextKey::RemoteIp),
            meta.client_id = ctx.get(ContextKey::ClientId),
            meta.feature_category = ctx.get(ContextKey::FeatureCategory),
            meta.user = ctx.get(ContextKey::User),
            meta.project = ctx.get(ContextKey::Project),
            meta.root_namespace = ctx.get(ContextKey::RootNamespace),
            exception.message = record.fault.as_deref(),
            "api request"
        );
    }};
}

impl LogSink for TracingLogSink {
    fn emit(&self, record: &LogRecord) {
        match record.severity {
            Severity::Info => api_event!(tracing::Level::INFO, record),
            Severity::Error => api_event!(tracing::Level::ERROR, record),
        }
    }
}

/// Writes one JSON object per line to the wrapped writer.
pub struct JsonLinesSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesSink {
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Appends to the file at `path`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened for appending.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(Box::new(file)))
    }
}

impl std::fmt::Debug for JsonLinesSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSink").finish_non_exhaustive()
    }
}

impl LogSink for JsonLinesSink {
    fn emit(&self, record: &LogRecord) {
        let line = Value::Object(record.to_json()).to_string();
        let mut writer = self.writer.lock();
        let result = writeln!(writer, "{line}").and_then(|()| writer.flush());
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to write api log line");
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct RecordingLogSink {
    records: Mutex<Vec<LogRecord>>,
}

impl RecordingLogSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<LogRecord> {
        self.records.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl LogSink for RecordingLogSink {
    fn emit(&self, record: &LogRecord) {
        self.records.lock().push(record.clone());
    }
}

/// Forwards every record to each of its sinks in order.
#[derive(Default)]
pub struct FanoutLogSink {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl FanoutLogSink {
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn LogSink>>) -> Self {
        Self { sinks }
    }

    pub fn add(&mut self, sink: Arc<dyn LogSink>) {
        self.sinks.push(sink);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl LogSink for FanoutLogSink {
    fn emit(&self, record: &LogRecord) {
        for sink in &self.sinks {
            sink.emit(record);
        }
    }
}
