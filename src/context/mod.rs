//! Request-scoped trace/log context.
//!
//! # Responsibilities
//! - Bundle the identifiers every log line needs (request id, hop, caller,
//!   method, uri, module label)
//! - Provide scoped mutation for nested backend calls: a nested call gets a
//!   derived child context, the parent is never written to
//! - Measure per-call latency in microseconds
//!
//! One `RequestContext` exists per inbound request, created by the recovery
//! boundary and carried through handlers via request extensions. Contexts are
//! cloned, never shared mutably, so sibling requests cannot observe each
//! other's state.

pub mod hop;

use std::time::Instant;

pub use hop::Hop;

/// Module label for cache-backend calls.
pub const MODULE_CACHE: &str = "databus/cache";
/// Module label for search-backend calls.
pub const MODULE_SEARCH: &str = "databus/search";

/// Identifiers threaded through one request's call chain.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id, propagated or freshly generated.
    pub request_id: String,
    /// Hop counter for this service boundary.
    pub hop: Hop,
    /// Remote caller address.
    pub caller_ip: String,
    /// HTTP method of the inbound request.
    pub method: String,
    /// Request URI (path and query).
    pub uri: String,
    /// Subsystem that emits under this context (e.g. "databus/cache").
    pub module: String,
    /// Product label from configuration.
    pub product: String,
    /// Environment label from configuration.
    pub env: String,
}

impl RequestContext {
    /// Context for code running outside any HTTP request (startup probes,
    /// background tasks).
    pub fn background(module: &str) -> Self {
        Self {
            request_id: String::new(),
            hop: Hop::null(),
            caller_ip: String::new(),
            method: String::new(),
            uri: String::new(),
            module: module.to_string(),
            product: String::new(),
            env: String::new(),
        }
    }

    /// Derive a scope for a nested backend call.
    ///
    /// The scope owns a child copy with the module label swapped and the hop
    /// nulled; `self` is untouched, so sibling calls observe the context
    /// exactly as it was before this call.
    pub fn scoped(&self, module: &str) -> CallScope {
        let mut child = self.clone();
        child.module = module.to_string();
        child.hop = Hop::null();
        CallScope {
            ctx: child,
            started: Instant::now(),
        }
    }
}

/// A derived child context covering one nested backend call.
///
/// Dropping the scope discards the child; no restoration is needed because
/// the parent was never mutated.
#[derive(Debug)]
pub struct CallScope {
    ctx: RequestContext,
    started: Instant,
}

impl CallScope {
    /// The derived context for this call.
    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    /// Microseconds elapsed since the scope was opened.
    pub fn elapsed_us(&self) -> u64 {
        self.started.elapsed().as_micros() as u64
    }

    /// Milliseconds elapsed since the scope was opened.
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_ctx() -> RequestContext {
        RequestContext {
            request_id: "abc123".into(),
            hop: Hop::Count(2),
            caller_ip: "10.1.2.3".into(),
            method: "GET".into(),
            uri: "/v1/items?id=7".into(),
            module: "api".into(),
            product: "demo".into(),
            env: "test".into(),
        }
    }

    #[test]
    fn test_scope_derives_child() {
        let ctx = request_ctx();
        let scope = ctx.scoped(MODULE_CACHE);
        assert_eq!(scope.context().module, MODULE_CACHE);
        assert_eq!(scope.context().hop, Hop::Null);
        assert_eq!(scope.context().request_id, "abc123");
    }

    #[test]
    fn test_parent_unchanged_after_scope() {
        let ctx = request_ctx();
        {
            let _scope = ctx.scoped(MODULE_SEARCH);
        }
        assert_eq!(ctx.module, "api");
        assert_eq!(ctx.hop, Hop::Count(2));
    }

    #[test]
    fn test_sequential_scopes_are_independent() {
        let ctx = request_ctx();
        let first = ctx.scoped(MODULE_CACHE);
        drop(first);
        let second = ctx.scoped(MODULE_SEARCH);
        assert_eq!(second.context().module, MODULE_SEARCH);
        assert_eq!(ctx.module, "api");
    }

    #[test]
    fn test_elapsed_advances() {
        let ctx = request_ctx();
        let scope = ctx.scoped(MODULE_CACHE);
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(scope.elapsed_us() >= 2_000);
    }
}
