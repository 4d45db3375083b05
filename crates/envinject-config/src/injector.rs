//! Injector configuration parsing and layering.
//!
//! ```kdl
//! root ".next"
//! extensions "js" "css" "html"
//! strict #false
//! token "NEXT_PUBLIC_REDIRECT_URL"
//! token "NEXT_PUBLIC_API_KEY" secret=#true required=#true
//! ```

use crate::{ConfigError, ConfigResult};
use envinject_core::{ExtensionFilter, Token};
use kdl::{KdlDocument, KdlNode};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default artifact root, relative to the working directory.
pub const DEFAULT_ROOT: &str = ".next";

/// Settings read from a config file. Every field is optional so that
/// command-line values can be layered on top.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub root: Option<PathBuf>,
    pub extensions: Option<ExtensionFilter>,
    pub strict: Option<bool>,
    pub tokens: Vec<Token>,
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub root: Option<PathBuf>,
    pub extensions: Option<ExtensionFilter>,
    pub strict: Option<bool>,
    pub tokens: Vec<String>,
}

/// Fully resolved injector configuration.
#[derive(Debug, Clone)]
pub struct InjectorConfig {
    pub root: PathBuf,
    pub extensions: ExtensionFilter,
    pub strict: bool,
    pub tokens: Vec<Token>,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            extensions: ExtensionFilter::default(),
            strict: false,
            tokens: Vec::new(),
        }
    }
}

impl InjectorConfig {
    /// Layer overrides on top of an optional config file and validate the result.
    ///
    /// Tokens from the command line are appended after file tokens. A name
    /// declared more than once, in either source, is a `Duplicate` error.
    pub fn build(file: Option<ConfigFile>, overrides: Overrides) -> ConfigResult<Self> {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        let mut tokens = file.tokens;
        for name in overrides.tokens {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            tokens.push(Token::new(name)?);
        }

        let config = Self {
            root: overrides.root.or(file.root).unwrap_or(defaults.root),
            extensions: overrides
                .extensions
                .or(file.extensions)
                .unwrap_or(defaults.extensions),
            strict: overrides.strict.or(file.strict).unwrap_or(defaults.strict),
            tokens,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the injection pass relies on.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "extensions".to_string(),
                message: "at least one extension is required".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for token in &self.tokens {
            if !seen.insert(token.name()) {
                return Err(ConfigError::Duplicate(format!("token '{}'", token.name())));
            }
        }

        if let Some((inner, outer)) = Token::find_overlap(&self.tokens) {
            return Err(ConfigError::Overlap {
                inner: inner.name().to_string(),
                outer: outer.name().to_string(),
            });
        }

        Ok(())
    }
}

/// Read and parse a config file from disk.
pub fn load_config(path: &Path) -> ConfigResult<ConfigFile> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Parse an injector configuration from KDL text.
pub fn parse_config(kdl: &str) -> ConfigResult<ConfigFile> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = ConfigFile::default();

    for node in doc.nodes() {
        match node.name().value() {
            "root" => {
                let root = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("root path".to_string()))?;
                config.root = Some(PathBuf::from(root));
            }
            "extensions" => {
                let extensions = get_all_string_args(node);
                if extensions.is_empty() {
                    return Err(ConfigError::MissingField("extensions list".to_string()));
                }
                config.extensions = Some(ExtensionFilter::new(extensions));
            }
            "strict" => {
                config.strict = Some(get_first_bool_arg(node).ok_or_else(|| {
                    ConfigError::InvalidValue {
                        field: "strict".to_string(),
                        message: "expected #true or #false".to_string(),
                    }
                })?);
            }
            "token" => {
                config.tokens.extend(parse_token(node)?);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

fn parse_token(node: &KdlNode) -> ConfigResult<Vec<Token>> {
    let names = get_all_string_args(node);
    if names.is_empty() {
        return Err(ConfigError::MissingField("token name".to_string()));
    }

    let required = get_bool_prop(node, "required").unwrap_or(false);
    let secret = get_bool_prop(node, "secret").unwrap_or(false);

    names
        .into_iter()
        .map(|name| Ok(Token::new(name)?.required(required).secret(secret)))
        .collect()
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_bool_arg(node: &KdlNode) -> Option<bool> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_bool_prop(node: &KdlNode, name: &str) -> Option<bool> {
    node.get(name).and_then(|v| v.as_bool())
}
