//! Operation-context propagation and structured event emission
//!
//! Fallible operations run under an optional [`OperationContext`] carried in
//! a thread-local slot. A scoped binder swaps the slot on construction and
//! restores it on drop, so deeply nested calls emit events tagged with the
//! ancestor's trace id. Records are single-line JSON handed to `tracing`.

use super::error::DbError;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Trace id plus operation name attached to emitted events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    /// Correlates every event of one logical operation tree
    pub trace_id: String,
    /// Name of the current operation
    pub operation: String,
}

impl OperationContext {
    /// Root context with a freshly generated trace id
    pub fn new(operation: impl Into<String>) -> Self {
        OperationContext {
            trace_id: new_trace_id(),
            operation: operation.into(),
        }
    }

    /// Child context: inherits the trace id, overrides the operation name
    pub fn child(&self, operation: impl Into<String>) -> Self {
        OperationContext {
            trace_id: self.trace_id.clone(),
            operation: operation.into(),
        }
    }
}

/// Generate a process-unique trace id:
/// `<microseconds-since-epoch>-<process-monotonic-counter>`
pub fn new_trace_id() -> String {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros())
        .unwrap_or(0);
    let n = SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", micros, n)
}

thread_local! {
    static CURRENT_CONTEXT: RefCell<Option<OperationContext>> = const { RefCell::new(None) };
}

/// The context currently bound on this thread, if any
pub fn current_operation_context() -> Option<OperationContext> {
    CURRENT_CONTEXT.with(|slot| slot.borrow().clone())
}

/// RAII binder for the thread-local context slot.
///
/// Construction swaps the given context in; drop restores whatever was bound
/// before, so nested scopes unwind correctly.
pub struct OperationScope {
    previous: Option<OperationContext>,
}

impl OperationScope {
    /// Bind `ctx` as the current context until this scope drops
    pub fn enter(ctx: OperationContext) -> Self {
        let previous = CURRENT_CONTEXT.with(|slot| slot.borrow_mut().replace(ctx));
        OperationScope { previous }
    }
}

impl Drop for OperationScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_CONTEXT.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// Run `f` with `ctx` bound as the current operation context
pub fn with_operation_context<T>(ctx: OperationContext, f: impl FnOnce() -> T) -> T {
    let _scope = OperationScope::enter(ctx);
    f()
}

/// Escape a string for embedding in a structured record: backslash, double
/// quote, newline, carriage return and tab are backslash-escaped.
pub fn escape_json(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

/// Severity of an emitted structured record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Informational event
    Info,
    /// Recoverable or caller-surfaced failure
    Warn,
    /// Unrecoverable failure
    Error,
}

/// Render the structured record for a failed operation
pub fn error_record(event: &str, err: &DbError, ctx: Option<&OperationContext>) -> String {
    let mut json = String::from("{");
    json.push_str(&format!("\"event\":\"{}\"", escape_json(event)));
    if let Some(ctx) = ctx {
        json.push_str(&format!(",\"trace_id\":\"{}\"", escape_json(&ctx.trace_id)));
        json.push_str(&format!(",\"operation\":\"{}\"", escape_json(&ctx.operation)));
    }
    json.push_str(&format!(",\"kind\":\"{}\"", err.kind.as_str()));
    json.push_str(&format!(
        ",\"retryable\":{}",
        if err.retryable { "true" } else { "false" }
    ));
    json.push_str(&format!(",\"code\":{}", err.code));
    json.push_str(&format!(",\"message\":\"{}\"", escape_json(&err.message)));
    json.push('}');
    json
}

/// Render the structured record for a plain operation event
pub fn event_record(event: &str, message: &str, ctx: Option<&OperationContext>) -> String {
    let mut json = String::from("{");
    json.push_str(&format!("\"event\":\"{}\"", escape_json(event)));
    if let Some(ctx) = ctx {
        json.push_str(&format!(",\"trace_id\":\"{}\"", escape_json(&ctx.trace_id)));
        json.push_str(&format!(",\"operation\":\"{}\"", escape_json(&ctx.operation)));
    }
    json.push_str(&format!(",\"message\":\"{}\"", escape_json(message)));
    json.push('}');
    json
}

fn emit(level: LogLevel, record: &str) {
    match level {
        LogLevel::Info => tracing::info!(target: "smartdb", "{}", record),
        LogLevel::Warn => tracing::warn!(target: "smartdb", "{}", record),
        LogLevel::Error => tracing::error!(target: "smartdb", "{}", record),
    }
}

/// Emit a structured error record, tagged with the current context if bound
pub fn log_db_error(level: LogLevel, event: &str, err: &DbError) {
    let ctx = current_operation_context();
    emit(level, &error_record(event, err, ctx.as_ref()));
}

/// Emit a structured operation event, tagged with the current context if bound
pub fn log_operation_event(level: LogLevel, event: &str, message: &str) {
    let ctx = current_operation_context();
    emit(level, &event_record(event, message, ctx.as_ref()));
}
