//! Runtime value lookup.
//!
//! The injector never reads the process environment directly; it asks a
//! [`BindingSource`]. Production code passes [`ProcessEnv`], tests pass a map.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::Token;

const MASK: &str = "******";

/// Lookup from token name to an optional runtime value.
pub trait BindingSource: Send + Sync {
    fn lookup(&self, name: &str) -> Option<String>;

    /// Resolve a token to a binding. Empty values count as absent.
    fn resolve(&self, token: &Token) -> Option<Binding> {
        self.lookup(token.name())
            .filter(|value| !value.is_empty())
            .map(|value| Binding {
                token: token.name().to_string(),
                value,
                secret: token.secret,
            })
    }
}

/// The current process environment, read by exact variable name.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl BindingSource for ProcessEnv {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl BindingSource for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl BindingSource for BTreeMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Adapter for a closure lookup.
pub struct FromFn<F>(pub F);

impl<F> BindingSource for FromFn<F>
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn lookup(&self, name: &str) -> Option<String> {
        (self.0)(name)
    }
}

/// A runtime value bound to a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub token: String,
    #[serde(skip)]
    pub value: String,
    pub secret: bool,
}

impl Binding {
    /// The value as it may appear in logs and reports.
    pub fn display_value(&self) -> &str {
        if self.secret { MASK } else { self.value.as_str() }
    }
}
