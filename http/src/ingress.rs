//! # Ingress
//!
//! Flat builder that wires page routes to a Hyper server.
//!
//! ```rust,ignore
//! PageletIngress::new()
//!     .bind("127.0.0.1:3000")
//!     .template(Arc::new(DefaultTemplate::default()))
//!     .resolver(Arc::new(StaticDependencies::default()))
//!     .route("/", Dashboard)
//!     .run()
//!     .await?;
//! ```

use crate::page::Page;
use crate::service::{PageletService, Routes};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use pagelet_core::template::{DependencyResolver, TemplateEngine};
use pagelet_core::{BootstrapConfig, BootstrapError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub const DEFAULT_ADDR: &str = "127.0.0.1:3000";

/// HTTP ingress builder for pages.
pub struct PageletIngress {
    addr: Option<String>,
    routes: Routes,
    config: BootstrapConfig,
    template: Option<Arc<dyn TemplateEngine>>,
    resolver: Option<Arc<dyn DependencyResolver>>,
}

impl PageletIngress {
    pub fn new() -> Self {
        Self {
            addr: None,
            routes: Routes::new(),
            config: BootstrapConfig::default(),
            template: None,
            resolver: None,
        }
    }

    /// Set the bind address for the server.
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.addr = Some(addr.into());
        self
    }

    /// Bootstrap settings shared by every page.
    pub fn config(mut self, config: BootstrapConfig) -> Self {
        self.config = config;
        self
    }

    pub fn template(mut self, engine: Arc<dyn TemplateEngine>) -> Self {
        self.template = Some(engine);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn DependencyResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Register a page under a GET path.
    pub fn route(mut self, path: impl Into<String>, page: impl Page) -> Self {
        let path = path.into();
        if self.routes.insert(path.clone(), Arc::new(page)).is_some() {
            tracing::warn!(%path, "Replacing previously registered page");
        }
        self
    }

    /// Convert into a Hyper service without starting a server.
    pub fn into_service(self) -> Result<PageletService, BootstrapError> {
        let template = self
            .template
            .ok_or(BootstrapError::MissingCollaborator("template engine"))?;
        let resolver = self
            .resolver
            .ok_or(BootstrapError::MissingCollaborator("dependency resolver"))?;

        Ok(PageletService::new(self.routes, self.config, template, resolver))
    }

    /// Run the HTTP server.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr: SocketAddr = self.addr.as_deref().unwrap_or(DEFAULT_ADDR).parse()?;
        let service = self.into_service()?;

        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Pagelet HTTP Ingress listening on http://{}", addr);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let service = service.clone();

            tokio::task::spawn(async move {
                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::error!("Error serving connection: {:?}", err);
                }
            });
        }
    }
}

impl Default for PageletIngress {
    fn default() -> Self {
        Self::new()
    }
}
