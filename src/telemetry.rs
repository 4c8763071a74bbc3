//! Tracing setup and request correlation ids.
//!
//! Every request runs inside a [`TraceContext`] held in task-local storage;
//! the error surface reads the id back when rendering a problem response so
//! a client-reported id can be matched against the logs.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::task_local;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::Layer,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

use crate::config::AppConfig;

/// Correlation metadata carried through one request.
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
}

impl TraceContext {
    /// A fresh context with a request-scoped `req-` id.
    pub fn new() -> Self {
        Self {
            trace_id: new_trace_id("req"),
        }
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A short correlation id: the prefix plus eight hex characters. Long
/// enough to grep for, short enough to read back over the phone.
pub fn new_trace_id(prefix: &str) -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &raw[..8])
}

task_local! {
    static ACTIVE_TRACE_CONTEXT: TraceContext;
}

#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

static TELEMETRY_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Install the process-wide subscriber. Idempotent: the second and later
/// calls are no-ops, so tests can initialize freely.
///
/// sea-orm and sqlx emit through the `log` facade; a [`LogTracer`] bridge
/// routes those records into tracing before the subscriber goes up. The
/// level filter comes from `RUST_LOG` when set, otherwise from the
/// configured `log_level`; output is JSON unless `log_format` is `pretty`.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    if TELEMETRY_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(());
    }

    // Another component may already own the `log` facade; records then
    // bypass tracing but the service still runs.
    if LogTracer::builder()
        .with_max_level(log::LevelFilter::Trace)
        .init()
        .is_err()
    {
        tracing::debug!("log facade already claimed, skipping bridge install");
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = if config.log_format == "pretty" {
        fmt::layer().pretty().boxed()
    } else {
        fmt::layer().json().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .inspect_err(|_| TELEMETRY_INITIALIZED.store(false, Ordering::SeqCst))?;

    Ok(())
}

/// Run `future` with `context` as the task-local trace context.
pub async fn with_trace_context<Fut, R>(context: TraceContext, future: Fut) -> R
where
    Fut: std::future::Future<Output = R>,
{
    ACTIVE_TRACE_CONTEXT.scope(context, future).await
}

/// The trace id of the enclosing request, if the task is inside one.
pub fn current_trace_id() -> Option<String> {
    ACTIVE_TRACE_CONTEXT
        .try_with(|ctx| ctx.trace_id.clone())
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_id_shape() {
        let id = new_trace_id("req");
        assert!(id.starts_with("req-"));
        assert_eq!(id.len(), 12);
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_trace_context_is_task_scoped() {
        assert!(current_trace_id().is_none());

        let context = TraceContext::new();
        let expected = context.trace_id.clone();
        let observed = with_trace_context(context, async { current_trace_id() }).await;

        assert_eq!(observed, Some(expected));
        assert!(current_trace_id().is_none());
    }
}
