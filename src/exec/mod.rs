//! Instrumented execution of backend calls.
//!
//! # Responsibilities
//! - Open exactly one span per backend call, as a child of the caller's
//!   current span (or a root span when there is none)
//! - Measure latency in microseconds and attach it to span and log record
//! - Emit one structured log event per call: error-level with the full
//!   statement on failure, info-level gated by the verbose flag on success
//! - Keep all emitted fields on a derived call scope so the caller's context
//!   is untouched afterwards
//!
//! The cache executor and the raw search path both run their calls through
//! this type; neither reimplements the discipline.

use tracing::Span;

use crate::context::{CallScope, RequestContext};

/// Span/log bookkeeping for one backend call.
///
/// `begin` before the call, `finish` with the result; `finish` consumes the
/// value so the span and log line cannot be emitted twice.
pub struct Instrumented {
    scope: CallScope,
    span: Span,
    statement: String,
    verbose: bool,
}

impl Instrumented {
    /// Open the span and derive the call scope.
    pub fn begin(
        ctx: &RequestContext,
        module: &str,
        operation: &'static str,
        backend: &'static str,
        statement: String,
        verbose: bool,
    ) -> Self {
        let scope = ctx.scoped(module);
        let span = tracing::info_span!(
            "databus_call",
            operation,
            db.backend = backend,
            db.statement = %statement,
            error = tracing::field::Empty,
            latency_us = tracing::field::Empty,
        );
        Self {
            scope,
            span,
            statement,
            verbose,
        }
    }

    /// Span to run the backend operation under (clone it into
    /// `Future::instrument`).
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Record the outcome, emit the log event, close out the call.
    /// Returns the measured latency in microseconds.
    pub fn finish<T, E: std::fmt::Display>(self, result: &Result<T, E>) -> u64 {
        let latency_us = self.scope.elapsed_us();
        self.span.record("latency_us", latency_us);
        self.span.record("error", result.is_err());

        let ctx = self.scope.context();
        match result {
            Err(error) => {
                tracing::error!(
                    request_id = %ctx.request_id,
                    module = %ctx.module,
                    hop = %ctx.hop,
                    latency_us,
                    statement = %self.statement,
                    error = %error,
                    "backend call failed"
                );
            }
            Ok(_) if self.verbose => {
                tracing::info!(
                    request_id = %ctx.request_id,
                    module = %ctx.module,
                    hop = %ctx.hop,
                    latency_us,
                    statement = %self.statement,
                    elapsed_ms = self.scope.elapsed_ms(),
                    "backend call ok"
                );
            }
            Ok(_) => {}
        }
        latency_us
    }
}

/// Render a command and its arguments as one statement string for span tags
/// and log records.
pub fn statement(command: &str, args: &[&str]) -> String {
    if args.is_empty() {
        command.to_string()
    } else {
        format!("{} {}", command, args.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MODULE_CACHE;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts span creations and events; enough to assert "one span and one
    /// log line per call, never merged".
    #[derive(Default)]
    struct Counting {
        spans: AtomicUsize,
        events: AtomicUsize,
    }

    impl tracing::Subscriber for Counting {
        fn enabled(&self, _: &tracing::Metadata<'_>) -> bool {
            true
        }
        fn new_span(&self, _: &tracing::span::Attributes<'_>) -> tracing::span::Id {
            let n = self.spans.fetch_add(1, Ordering::SeqCst) as u64;
            tracing::span::Id::from_u64(n + 1)
        }
        fn record(&self, _: &tracing::span::Id, _: &tracing::span::Record<'_>) {}
        fn record_follows_from(&self, _: &tracing::span::Id, _: &tracing::span::Id) {}
        fn event(&self, _: &tracing::Event<'_>) {
            self.events.fetch_add(1, Ordering::SeqCst);
        }
        fn enter(&self, _: &tracing::span::Id) {}
        fn exit(&self, _: &tracing::span::Id) {}
    }

    fn ctx() -> RequestContext {
        let mut ctx = RequestContext::background("api");
        ctx.request_id = "abc123".into();
        ctx
    }

    #[test]
    fn test_statement_rendering() {
        assert_eq!(statement("PING", &[]), "PING");
        assert_eq!(statement("SET", &["k", "v"]), "SET k v");
    }

    #[test]
    fn test_two_calls_two_spans() {
        let counting = Arc::new(Counting::default());
        let sub = Arc::clone(&counting);
        tracing::subscriber::with_default(sub, || {
            let ctx = ctx();
            for _ in 0..2 {
                let call = Instrumented::begin(
                    &ctx,
                    MODULE_CACHE,
                    "cache_execute",
                    "cache",
                    statement("GET", &["k"]),
                    true,
                );
                call.finish::<(), String>(&Ok(()));
            }
        });
        assert_eq!(counting.spans.load(Ordering::SeqCst), 2);
        assert_eq!(counting.events.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_quiet_success_emits_no_event() {
        let counting = Arc::new(Counting::default());
        let sub = Arc::clone(&counting);
        tracing::subscriber::with_default(sub, || {
            let ctx = ctx();
            let call =
                Instrumented::begin(&ctx, MODULE_CACHE, "cache_execute", "cache", "GET k".into(), false);
            call.finish::<(), String>(&Ok(()));
        });
        assert_eq!(counting.spans.load(Ordering::SeqCst), 1);
        assert_eq!(counting.events.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failure_always_logged() {
        let counting = Arc::new(Counting::default());
        let sub = Arc::clone(&counting);
        tracing::subscriber::with_default(sub, || {
            let ctx = ctx();
            let call =
                Instrumented::begin(&ctx, MODULE_CACHE, "cache_execute", "cache", "GET k".into(), false);
            call.finish::<(), String>(&Err("boom".into()));
        });
        assert_eq!(counting.events.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_caller_context_untouched() {
        let ctx = ctx();
        let call = Instrumented::begin(&ctx, MODULE_CACHE, "cache_execute", "cache", "GET k".into(), false);
        call.finish::<(), String>(&Ok(()));
        assert_eq!(ctx.module, "api");
    }
}
