//! KDL configuration parsing for envinject.
//!
//! This crate handles:
//! - Parsing `envinject.kdl` files
//! - Validating the declared token list
//! - Layering file configuration with command-line overrides

pub mod error;
pub mod injector;

pub use error::{ConfigError, ConfigResult};
pub use injector::{ConfigFile, DEFAULT_ROOT, InjectorConfig, Overrides, load_config, parse_config};
