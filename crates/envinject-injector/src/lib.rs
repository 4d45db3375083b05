//! Placeholder injection for envinject.
//!
//! Discovers the artifact set under a root directory and rewrites every
//! declared token's placeholder with its runtime binding, producing an
//! [`InjectionReport`].

pub mod injector;
pub mod report;
pub mod store;
pub mod walker;

pub use injector::{InjectOptions, Injector};
pub use report::{FileChange, InjectionReport, TokenOutcome, TokenReport};
pub use store::{ArtifactStore, FsArtifactStore};
pub use walker::discover_artifacts;
