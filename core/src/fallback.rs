//! No-script fallback markup.
//!
//! Pages are assembled client side in async mode, so a browser without
//! JavaScript would see nothing. Async pages therefore carry a meta refresh
//! that reloads the page with `no_pagelet_js=1`, forcing the sync mode.
//! Sync pages carry a script that strips the marker again, as a shared URL
//! should not pin a JavaScript-capable browser to sync mode.

use crate::config::RenderMode;

pub const NO_PAGELET_JS: &str = "no_pagelet_js";
pub const DEFAULT_PATH: &str = "http://localhost/";

pub const SYNC_SCRIPT: &str = concat!(
    "<script>",
    "if (~location.search.indexOf(\"no_pagelet_js=1\"))",
    "location.href = location.href.replace(location.search, \"\")",
    "</script>"
);

/// The parts of the incoming request the bootstrap needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    pub path: Option<String>,
    pub query: Vec<(String, String)>,
}

impl RequestInfo {
    pub fn new(path: impl Into<String>, query: Option<&str>) -> Self {
        let query = query
            .filter(|q| !q.is_empty())
            .map(|q| {
                serde_urlencoded::from_str::<Vec<(String, String)>>(q).unwrap_or_else(|error| {
                    tracing::warn!(%error, query = q, "Ignoring malformed query string");
                    Vec::new()
                })
            })
            .unwrap_or_default();

        Self {
            path: Some(path.into()),
            query,
        }
    }

    /// The client asked for a fully server-rendered page.
    pub fn forces_sync(&self) -> bool {
        self.query.iter().any(|(key, value)| key == NO_PAGELET_JS && value == "1")
    }

    /// Split `/path?query` into its parts.
    pub fn from_path_and_query(target: &str) -> Self {
        match target.split_once('?') {
            Some((path, query)) => Self::new(path, Some(query)),
            None => Self::new(target, None),
        }
    }
}

/// Fallback markup for the given mode.
pub fn fallback(mode: RenderMode, request: &RequestInfo) -> String {
    match mode {
        RenderMode::Sync => SYNC_SCRIPT.to_string(),
        RenderMode::Async => {
            let path = request.path.as_deref().filter(|p| !p.is_empty()).unwrap_or(DEFAULT_PATH);
            format!(
                r#"<noscript><meta http-equiv="refresh" content="0; URL={path}?{query}"></noscript>"#,
                query = sync_query(&request.query),
            )
        }
    }
}

/// The request query with `no_pagelet_js=1` merged in front.
fn sync_query(query: &[(String, String)]) -> String {
    let mut merged = vec![(NO_PAGELET_JS.to_string(), "1".to_string())];
    for (key, value) in query {
        if key == NO_PAGELET_JS {
            merged[0].1 = value.clone();
        } else {
            merged.push((key.clone(), value.clone()));
        }
    }

    serde_urlencoded::to_string(&merged).unwrap_or_else(|error| {
        tracing::warn!(%error, "Failed to encode fallback query");
        format!("{NO_PAGELET_JS}=1")
    })
}
