//! Tokens and their literal placeholders.
//!
//! A token named `NEXT_PUBLIC_API_URL` is baked into build output as the
//! placeholder `__NEXT_PUBLIC_API_URL__`. Substitution is literal: neither the
//! placeholder nor the replacement value is interpreted as a pattern.

use derive_more::Display;
use regex::bytes::{NoExpand, Regex};
use serde::Serialize;
use std::borrow::Cow;
use std::sync::LazyLock;

use crate::{Error, Result};

static TOKEN_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// A named build-time placeholder intended for runtime substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Display)]
#[display("{name}")]
pub struct Token {
    name: String,
    /// Unresolved is fatal for this token even outside strict mode.
    pub required: bool,
    /// Mask the value in logs and reports.
    pub secret: bool,
}

impl Token {
    /// Create a token, validating that the name is a plain identifier.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if !TOKEN_NAME_REGEX.is_match(name.as_bytes()) {
            return Err(Error::InvalidToken(name));
        }
        Ok(Self {
            name,
            required: false,
            secret: false,
        })
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn secret(mut self, secret: bool) -> Self {
        self.secret = secret;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The literal marker rendered into artifacts, e.g. `__NAME__`.
    pub fn marker(&self) -> String {
        format!("__{}__", self.name)
    }

    /// Build the matcher for this token's placeholder.
    pub fn placeholder(&self) -> Placeholder {
        Placeholder::new(self.marker())
    }

    /// Find a pair of tokens where the first token's placeholder occurs inside
    /// the second's. Replacing the first would corrupt the second.
    pub fn find_overlap(tokens: &[Token]) -> Option<(&Token, &Token)> {
        for (i, inner) in tokens.iter().enumerate() {
            let marker = inner.marker();
            for (j, outer) in tokens.iter().enumerate() {
                if i != j && outer.marker().contains(&marker) {
                    return Some((inner, outer));
                }
            }
        }
        None
    }
}

/// Result of applying a placeholder to some content.
#[derive(Debug)]
pub struct Substitution<'a> {
    pub content: Cow<'a, [u8]>,
    pub replacements: usize,
}

impl Substitution<'_> {
    pub fn is_changed(&self) -> bool {
        self.replacements > 0
    }
}

/// Literal matcher for one placeholder string.
#[derive(Debug, Clone, Display)]
#[display("{marker}")]
pub struct Placeholder {
    marker: String,
    pattern: Regex,
}

impl Placeholder {
    pub fn new(marker: impl Into<String>) -> Self {
        let marker = marker.into();
        // An escaped literal always compiles.
        let pattern = Regex::new(&regex::escape(&marker)).unwrap();
        Self { marker, pattern }
    }

    pub fn as_str(&self) -> &str {
        &self.marker
    }

    /// Count occurrences in `content` without modifying it.
    pub fn count(&self, content: &[u8]) -> usize {
        self.pattern.find_iter(content).count()
    }

    /// Replace every occurrence in `content` with `value`, verbatim.
    ///
    /// Content without a match is returned borrowed.
    pub fn apply<'a>(&self, content: &'a [u8], value: &str) -> Substitution<'a> {
        let replacements = self.count(content);
        if replacements == 0 {
            return Substitution {
                content: Cow::Borrowed(content),
                replacements,
            };
        }

        Substitution {
            content: self
                .pattern
                .replace_all(content, NoExpand(value.as_bytes())),
            replacements,
        }
    }
}
