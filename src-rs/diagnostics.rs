//! Recent log lines and failed HTTP requests, kept for bug reports.
//!
//! Log calls reach the store through [`DiagnosticsLayer`], stacked on the
//! same tracing registry that prints them, so printing is unaffected.
//! Requests reach it through [`NetworkRecorder`], a `ureq` middleware.
//! Readers only ever get a copy via [`DiagnosticsStore::snapshot`].

use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

pub const MAX_CONSOLE_ENTRIES: usize = 50;
pub const MAX_NETWORK_ENTRIES: usize = 20;
pub const MAX_MESSAGE_CHARS: usize = 500;
pub const MAX_URL_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
}

impl From<&Level> for ConsoleLevel {
    fn from(level: &Level) -> Self {
        if *level == Level::ERROR {
            Self::Error
        } else if *level == Level::WARN {
            Self::Warn
        } else if *level == Level::INFO {
            Self::Info
        } else {
            Self::Log
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub level: ConsoleLevel,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEntry {
    pub method: String,
    pub url: String,
    /// 0 when the request never produced a response.
    pub status: u16,
    pub status_text: String,
    /// Milliseconds.
    pub duration: u64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub console_logs: Vec<ConsoleEntry>,
    pub network_errors: Vec<NetworkEntry>,
}

#[derive(Debug, Default)]
pub struct DiagnosticsStore {
    console: Mutex<VecDeque<ConsoleEntry>>,
    network: Mutex<VecDeque<NetworkEntry>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, entry: T, cap: usize) {
    buffer.push_back(entry);
    while buffer.len() > cap {
        buffer.pop_front();
    }
}

pub fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl DiagnosticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_console(&self, level: ConsoleLevel, message: &str) {
        let entry = ConsoleEntry {
            level,
            message: truncate_chars(message, MAX_MESSAGE_CHARS),
            timestamp: timestamp_now(),
        };
        push_bounded(&mut lock(&self.console), entry, MAX_CONSOLE_ENTRIES);
    }

    /// Keeps only failures: `Ok` outcomes outside 2xx, and every `Err`
    /// (recorded as status 0 with the error text).
    pub fn record_request(
        &self,
        method: &str,
        url: &str,
        outcome: Result<(u16, &str), &str>,
        duration_ms: u64,
    ) {
        let (status, status_text) = match outcome {
            Ok((status, _)) if (200..300).contains(&status) => return,
            Ok((status, text)) => (status, text.to_string()),
            Err(message) => (0, message.to_string()),
        };
        let entry = NetworkEntry {
            method: method.to_ascii_uppercase(),
            url: truncate_chars(url, MAX_URL_CHARS),
            status,
            status_text,
            duration: duration_ms,
            timestamp: timestamp_now(),
        };
        push_bounded(&mut lock(&self.network), entry, MAX_NETWORK_ENTRIES);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            console_logs: lock(&self.console).iter().cloned().collect(),
            network_errors: lock(&self.network).iter().cloned().collect(),
        }
    }

    pub fn clear(&self) {
        lock(&self.console).clear();
        lock(&self.network).clear();
    }
}

static GLOBAL: OnceLock<Arc<DiagnosticsStore>> = OnceLock::new();
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Process-wide store shared by the logging layer and HTTP agents.
pub fn global() -> Arc<DiagnosticsStore> {
    Arc::clone(GLOBAL.get_or_init(|| Arc::new(DiagnosticsStore::new())))
}

/// Marks the collector as installed. Returns false if it already was, in
/// which case the caller must not install it again.
pub fn mark_initialized() -> bool {
    !INITIALIZED.swap(true, Ordering::SeqCst)
}

pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::SeqCst)
}

pub fn get_diagnostics() -> DiagnosticsSnapshot {
    global().snapshot()
}

pub fn clear_diagnostics() {
    global().clear();
}

/// Tracing layer that copies every event into a [`DiagnosticsStore`].
#[derive(Debug, Clone)]
pub struct DiagnosticsLayer {
    store: Arc<DiagnosticsStore>,
}

impl DiagnosticsLayer {
    pub fn new(store: Arc<DiagnosticsStore>) -> Self {
        Self { store }
    }
}

impl<S: Subscriber> Layer<S> for DiagnosticsLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.store
            .record_console(ConsoleLevel::from(event.metadata().level()), &visitor.finish());
    }
}

/// Flattens an event into `message key=value ...`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }

    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}

/// `ureq` middleware timing each request and recording failures.
#[derive(Debug, Clone)]
pub struct NetworkRecorder {
    store: Arc<DiagnosticsStore>,
}

impl NetworkRecorder {
    pub fn new(store: Arc<DiagnosticsStore>) -> Self {
        Self { store }
    }
}

impl ureq::Middleware for NetworkRecorder {
    fn handle(
        &self,
        request: ureq::Request,
        next: ureq::MiddlewareNext,
    ) -> Result<ureq::Response, ureq::Error> {
        let method = request.method().to_string();
        let url = request.url().to_string();
        let started = Instant::now();
        let result = next.handle(request);
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => self.store.record_request(
                &method,
                &url,
                Ok((response.status(), response.status_text())),
                duration_ms,
            ),
            Err(ureq::Error::Status(status, response)) => self.store.record_request(
                &method,
                &url,
                Ok((*status, response.status_text())),
                duration_ms,
            ),
            Err(ureq::Error::Transport(transport)) => {
                let message = transport.to_string();
                self.store
                    .record_request(&method, &url, Err(message.as_str()), duration_ms)
            }
        }
        result
    }
}
