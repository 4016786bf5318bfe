//! pagelet-demo
//!
//! Serves a small dashboard whose panels finish at different times.
//! Pass a TOML config path as the first argument to override the defaults.

use anyhow::Result;
use async_trait::async_trait;
use pagelet_core::fallback::RequestInfo;
use pagelet_core::prelude::*;
use pagelet_http::prelude::*;
use std::sync::Arc;
use std::time::Duration;

struct Dashboard;

#[async_trait]
impl Page for Dashboard {
    fn name(&self) -> &str {
        "dashboard"
    }

    fn expected(&self) -> usize {
        3
    }

    async fn produce(&self, request: Arc<RequestInfo>, fragments: FragmentSender) {
        fragments.send(
            "dashboard",
            Some("bootstrap"),
            r#"<main><section data-pagelet="news"></section><aside data-pagelet="weather"></aside></main>"#,
        );

        for (name, delay, body) in [
            ("weather", 300, "<p>Sunny, 21°C</p>"),
            ("news", 800, "<ul><li>Fragments arrive out of order</li></ul>"),
        ] {
            let fragments = fragments.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                fragments.send(name, Some("dashboard"), body);
            });
        }

        tracing::debug!(path = ?request.path, "Dashboard producers started");
    }
}

struct Health;

#[async_trait]
impl Page for Health {
    fn name(&self) -> &str {
        "health"
    }

    fn expected(&self) -> usize {
        1
    }

    fn mode(&self) -> Option<RenderMode> {
        Some(RenderMode::Sync)
    }

    async fn produce(&self, _request: Arc<RequestInfo>, fragments: FragmentSender) {
        fragments.send("health", None, serde_json::json!({ "status": "ok" }));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_stdout_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => BootstrapConfig::load(path)?,
        None => BootstrapConfig::default(),
    };

    PageletIngress::new()
        .bind(std::env::var("PAGELET_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string()))
        .config(config)
        .template(Arc::new(DefaultTemplate::default()))
        .resolver(Arc::new(StaticDependencies::default()))
        .route("/", Dashboard)
        .route("/health", Health)
        .run()
        .await
        .map_err(|error| anyhow::anyhow!(error))?;

    Ok(())
}
