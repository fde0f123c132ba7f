//! Read-only access to environment-style configuration.

use std::collections::{BTreeMap, HashMap};

/// A source of named string values, read at call time.
///
/// The process environment is the production source; maps stand in for it in
/// tests and embedded deployments.
pub trait Environment: Send + Sync {
    /// Look up `name`. Unset and non-UTF-8 values are both `None`.
    fn var(&self, name: &str) -> Option<String>;
}

/// The current process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl Environment for BTreeMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl<E: Environment + ?Sized> Environment for &E {
    fn var(&self, name: &str) -> Option<String> {
        (**self).var(name)
    }
}
