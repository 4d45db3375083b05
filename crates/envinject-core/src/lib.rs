//! Core domain types for envinject.
//!
//! This crate contains:
//! - Tokens and their literal placeholders
//! - Binding sources (runtime value lookup)
//! - The artifact extension allow-list
//! - The pure substitution function applied to artifact contents

pub mod artifact;
pub mod binding;
pub mod error;
pub mod token;

pub use artifact::ExtensionFilter;
pub use binding::{Binding, BindingSource, FromFn, ProcessEnv};
pub use error::{Error, Result};
pub use token::{Placeholder, Substitution, Token};
