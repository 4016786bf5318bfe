//! Template engine and dependency resolver collaborators.

use crate::marker::DEFAULT_MARKER_ATTRIBUTE;
use serde::Serialize;

/// The fixed record handed to the template engine when the bootstrap renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateData {
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub robots: Vec<String>,
    pub favicon: String,
    pub author: String,
    pub dependencies: String,
    pub fallback: String,
    pub charset: String,
    /// Name of the component whose content goes into the bootstrap.
    pub child: String,
    /// Outstanding fragment count at render time.
    pub length: i64,
    pub id: String,
    pub name: String,
}

impl TemplateData {
    pub const KEYS: [&'static str; 13] = [
        "title",
        "description",
        "keywords",
        "robots",
        "favicon",
        "author",
        "dependencies",
        "fallback",
        "charset",
        "child",
        "length",
        "id",
        "name",
    ];
}

/// Turns a template reference and data into markup.
pub trait TemplateEngine: Send + Sync {
    fn render(&self, template: &str, data: &TemplateData) -> anyhow::Result<String>;
}

impl<F> TemplateEngine for F
where
    F: Fn(&str, &TemplateData) -> anyhow::Result<String> + Send + Sync,
{
    fn render(&self, template: &str, data: &TemplateData) -> anyhow::Result<String> {
        self(template, data)
    }
}

/// Minimal HEAD plus an opening body carrying the child's marker.
///
/// The body is left open so later fragments can stream after it.
#[derive(Debug, Clone)]
pub struct DefaultTemplate {
    pub attribute: String,
}

impl Default for DefaultTemplate {
    fn default() -> Self {
        Self {
            attribute: DEFAULT_MARKER_ATTRIBUTE.to_string(),
        }
    }
}

impl TemplateEngine for DefaultTemplate {
    fn render(&self, _template: &str, data: &TemplateData) -> anyhow::Result<String> {
        Ok(format!(
            r#"<!doctype html><html><head><meta charset="{charset}"><title>{title}</title><meta name="description" content="{description}"><meta name="keywords" content="{keywords}"><meta name="robots" content="{robots}"><meta name="author" content="{author}"><link rel="icon" href="{favicon}">{dependencies}</head><body {attribute}="{child}" data-pagelet-id="{id}">{fallback}"#,
            charset = data.charset,
            title = data.title,
            description = data.description,
            keywords = data.keywords.join(", "),
            robots = data.robots.join(", "),
            author = data.author,
            favicon = data.favicon,
            dependencies = data.dependencies,
            attribute = self.attribute,
            child = data.child,
            id = data.id,
            fallback = data.fallback,
        ))
    }
}

/// Script and style tags for a page, pre-joined or as a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependencies {
    Joined(String),
    List(Vec<String>),
}

impl Dependencies {
    /// Append extra tags after the resolved ones.
    pub fn extend(self, extra: &[String]) -> Self {
        if extra.is_empty() {
            return self;
        }
        let mut list = match self {
            Dependencies::Joined(markup) if markup.is_empty() => Vec::new(),
            Dependencies::Joined(markup) => vec![markup],
            Dependencies::List(list) => list,
        };
        list.extend(extra.iter().cloned());
        Dependencies::List(list)
    }

    pub fn into_markup(self) -> String {
        match self {
            Dependencies::Joined(markup) => markup,
            Dependencies::List(list) => list.concat(),
        }
    }
}

/// Resolves the dependency tags of a set of components.
pub trait DependencyResolver: Send + Sync {
    fn resolve(&self, components: &[String]) -> Dependencies;
}

/// A resolver that always answers with the same tags.
#[derive(Debug, Clone, Default)]
pub struct StaticDependencies(pub Vec<String>);

impl DependencyResolver for StaticDependencies {
    fn resolve(&self, _components: &[String]) -> Dependencies {
        Dependencies::List(self.0.clone())
    }
}
