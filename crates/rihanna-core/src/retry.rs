//! Retry-time callback contract (§4.7 of the design this crate implements).
//!
//! A job's `payload` names a module; that module may optionally answer
//! "when, if ever, should this job next run?" after a failure. This crate
//! has no dynamic capability lookup the way a module system might, so the
//! lookup is a plain registry keyed by module name, mirroring
//! `CommandRegistry`'s shape for command deserializers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// A job module's custom retry schedule.
///
/// Implementations answer only "when should this next run", never "should
/// it run" - that's the caller's decision, informed by this answer.
pub trait RetryPolicy: Send + Sync {
    /// `reason` is the failure description passed to `mark_failed`;
    /// `args` is the job's stored arguments; `attempts` is the number of
    /// prior attempts (post-increment, i.e. what `mark_retried` would set
    /// `rihanna_internal_meta.attempts` to). Returning `None` is the
    /// `noop` sentinel from §4.7: the caller falls back to its own default
    /// schedule.
    fn retry_at(&self, reason: &str, args: &Value, attempts: i32) -> Option<DateTime<Utc>>;
}

/// The sentinel used for any module that doesn't define a custom retry
/// schedule. Equivalent to "module does not export `retry_at/3`".
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRetryPolicy;

impl RetryPolicy for NoopRetryPolicy {
    fn retry_at(&self, _reason: &str, _args: &Value, _attempts: i32) -> Option<DateTime<Utc>> {
        None
    }
}

/// Maps job module names to their [`RetryPolicy`]. A module with no
/// registered policy resolves to [`NoopRetryPolicy`], never an error -
/// absence of a custom schedule is a normal, expected outcome (§4.7, §8
/// scenario (k)).
#[derive(Default)]
pub struct RetryPolicyRegistry {
    policies: HashMap<String, Box<dyn RetryPolicy>>,
}

impl RetryPolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom retry policy for the given module name.
    pub fn register(&mut self, module: impl Into<String>, policy: impl RetryPolicy + 'static) {
        self.policies.insert(module.into(), Box::new(policy));
    }

    /// Resolve a module's retry schedule. Never fails: an unregistered
    /// module behaves exactly like [`NoopRetryPolicy`].
    pub fn retry_at(
        &self,
        module: &str,
        reason: &str,
        args: &Value,
        attempts: i32,
    ) -> Option<DateTime<Utc>> {
        match self.policies.get(module) {
            Some(policy) => policy.retry_at(reason, args, attempts),
            None => NoopRetryPolicy.retry_at(reason, args, attempts),
        }
    }

    pub fn has(&self, module: &str) -> bool {
        self.policies.contains_key(module)
    }
}

impl std::fmt::Debug for RetryPolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicyRegistry")
            .field("registered_modules", &self.policies.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysTomorrow;
    impl RetryPolicy for AlwaysTomorrow {
        fn retry_at(&self, _reason: &str, _args: &Value, _attempts: i32) -> Option<DateTime<Utc>> {
            Some(Utc::now() + chrono::Duration::days(1))
        }
    }

    #[test]
    fn unregistered_module_is_noop() {
        let registry = RetryPolicyRegistry::new();
        assert_eq!(
            registry.retry_at("some.module", "boom", &Value::Null, 1),
            None
        );
    }

    #[test]
    fn registered_module_is_consulted() {
        let mut registry = RetryPolicyRegistry::new();
        registry.register("some.module", AlwaysTomorrow);
        assert!(registry
            .retry_at("some.module", "boom", &Value::Null, 1)
            .is_some());
        assert!(registry.has("some.module"));
        assert!(!registry.has("other.module"));
    }
}
