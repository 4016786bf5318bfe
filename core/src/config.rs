//! Bootstrap configuration, loadable from TOML.
//!
//! ```toml
//! title = "News"
//! mode = "sync"
//! dependencies = ['<link rel="stylesheet" href="/site.css">']
//!
//! [reduce]
//! attribute = "data-pagelet"
//! root = { named = "bootstrap" }
//! unmatched = "drop"
//! ```

use crate::error::ConfigError;
use crate::join::StructuredLayout;
use crate::reduce::ReduceOptions;
use serde::Deserialize;
use std::path::Path;

/// How a page reaches the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Fragments are streamed out as they complete.
    #[default]
    Async,
    /// Fragments are reduced into one document and written once.
    Sync,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Fragment name of the bootstrap itself.
    pub name: String,
    /// Template reference passed to the template engine.
    pub template: String,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub robots: Vec<String>,
    pub favicon: String,
    pub author: String,
    /// Extra dependency tags, appended after the resolved ones.
    pub dependencies: Vec<String>,
    pub mode: RenderMode,
    /// Default charset when the content type carries none.
    pub charset: String,
    /// Initial content-type header value, if known.
    pub content_type: Option<String>,
    pub reduce: ReduceOptions,
    pub json: StructuredLayout,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            name: "bootstrap".to_string(),
            template: "bootstrap".to_string(),
            title: "Pagelet".to_string(),
            description: "Default description for pagelets".to_string(),
            keywords: vec!["pagelet".to_string(), "bootstrap".to_string()],
            robots: vec!["index".to_string(), "follow".to_string()],
            favicon: "/favicon.ico".to_string(),
            author: "Pagelet".to_string(),
            dependencies: Vec::new(),
            mode: RenderMode::default(),
            charset: "utf-8".to_string(),
            content_type: None,
            reduce: ReduceOptions::default(),
            json: StructuredLayout::default(),
        }
    }
}

impl BootstrapConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn with_mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_reduce(mut self, reduce: ReduceOptions) -> Self {
        self.reduce = reduce;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce::{RootPolicy, UnmatchedPolicy};
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = BootstrapConfig::from_toml_str("").unwrap();
        assert_eq!(config, BootstrapConfig::default());
        assert_eq!(config.reduce.attribute, "data-pagelet");
    }

    #[test]
    fn test_full_config() {
        let config = BootstrapConfig::from_toml_str(
            r#"
            title = "News"
            mode = "sync"
            charset = "iso-8859-1"
            json = "first"
            dependencies = ["<link rel=x>"]

            [reduce]
            attribute = "data-x"
            root = { named = "layout" }
            unmatched = "drop"
            "#,
        )
        .unwrap();

        assert_eq!(config.title, "News");
        assert_eq!(config.mode, RenderMode::Sync);
        assert_eq!(config.json, StructuredLayout::First);
        assert_eq!(config.reduce.attribute, "data-x");
        assert_eq!(config.reduce.root, RootPolicy::Named("layout".into()));
        assert_eq!(config.reduce.unmatched, UnmatchedPolicy::Drop);
        assert_eq!(config.name, "bootstrap");
    }

    #[test]
    fn test_invalid_mode() {
        let err = BootstrapConfig::from_toml_str(r#"mode = "eager""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"author = "Newsroom""#).unwrap();
        writeln!(file, r#"robots = ["noindex"]"#).unwrap();

        let config = BootstrapConfig::load(file.path()).unwrap();
        assert_eq!(config.author, "Newsroom");
        assert_eq!(config.robots, vec!["noindex".to_string()]);

        let err = BootstrapConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
