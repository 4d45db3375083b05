//! Outcome of an injection pass.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// A file rewritten (or, in a dry run, that would be rewritten) for one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    /// Path relative to the artifact root.
    pub path: PathBuf,
    pub replacements: usize,
}

/// Per-token result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TokenOutcome {
    Replaced {
        /// Resolved value, masked for secret tokens.
        value: String,
        files: Vec<FileChange>,
        replacements: usize,
    },
    /// No binding; placeholders were left untouched.
    Unresolved {
        occurrences: usize,
        files: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenReport {
    pub token: String,
    #[serde(flatten)]
    pub outcome: TokenOutcome,
}

impl TokenReport {
    pub fn is_resolved(&self) -> bool {
        matches!(self.outcome, TokenOutcome::Replaced { .. })
    }
}

/// Record of a completed injection pass.
#[derive(Debug, Clone, Serialize)]
pub struct InjectionReport {
    pub root: PathBuf,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub files_scanned: usize,
    pub tokens: Vec<TokenReport>,
}

impl InjectionReport {
    /// Names of tokens that had no binding.
    pub fn unresolved(&self) -> Vec<&str> {
        self.tokens
            .iter()
            .filter(|t| !t.is_resolved())
            .map(|t| t.token.as_str())
            .collect()
    }

    pub fn resolved_count(&self) -> usize {
        self.tokens.iter().filter(|t| t.is_resolved()).count()
    }

    /// Distinct files changed across all tokens.
    pub fn files_changed(&self) -> usize {
        self.tokens
            .iter()
            .filter_map(|t| match &t.outcome {
                TokenOutcome::Replaced { files, .. } => Some(files),
                TokenOutcome::Unresolved { .. } => None,
            })
            .flatten()
            .map(|f| &f.path)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn total_replacements(&self) -> usize {
        self.tokens
            .iter()
            .map(|t| match &t.outcome {
                TokenOutcome::Replaced { replacements, .. } => *replacements,
                TokenOutcome::Unresolved { .. } => 0,
            })
            .sum()
    }
}
