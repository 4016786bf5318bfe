//! # Service
//!
//! Per-request handling: route lookup, bootstrap construction and the
//! spawned tasks that stream the page out.

use crate::compose::{drive, fragment_channel};
use crate::page::Page;
use crate::sink::{PageBody, response_channel};
use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::service::Service;
use pagelet_core::content_type::CONTENT_TYPE;
use pagelet_core::fallback::RequestInfo;
use pagelet_core::template::{DependencyResolver, TemplateEngine};
use pagelet_core::{Bootstrap, BootstrapConfig, ContentType, HeaderSink, RenderMode};
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::Instrument;

pub(crate) type Routes = HashMap<String, Arc<dyn Page>>;

/// Hyper service answering every registered page with a streamed response.
#[derive(Clone)]
pub struct PageletService {
    routes: Arc<Routes>,
    config: Arc<BootstrapConfig>,
    template: Arc<dyn TemplateEngine>,
    resolver: Arc<dyn DependencyResolver>,
}

impl PageletService {
    pub(crate) fn new(
        routes: Routes,
        config: BootstrapConfig,
        template: Arc<dyn TemplateEngine>,
        resolver: Arc<dyn DependencyResolver>,
    ) -> Self {
        Self {
            routes: Arc::new(routes),
            config: Arc::new(config),
            template,
            resolver,
        }
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    async fn respond(&self, method: Method, target: &str) -> Response<PageBody> {
        let request = RequestInfo::from_path_and_query(target);
        let path = request.path.as_deref().unwrap_or("/");

        let Some(page) = self.routes.get(path).cloned() else {
            tracing::debug!("No page registered for path");
            return plain(StatusCode::NOT_FOUND, "Not Found");
        };
        if method != Method::GET {
            return plain(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        }

        let mode = if request.forces_sync() {
            RenderMode::Sync
        } else {
            page.mode().unwrap_or(self.config.mode)
        };
        let config = if mode == self.config.mode {
            self.config.clone()
        } else {
            Arc::new(self.config.as_ref().clone().with_mode(mode))
        };

        let (mut sink, pending) = response_channel();
        let content_type = config.content_type.clone().unwrap_or_else(|| {
            format!("{}; charset={}", ContentType::Markup.mime(), config.charset)
        });
        sink.set_header(CONTENT_TYPE, &content_type);

        let built = Bootstrap::builder(config)
            .template(self.template.clone())
            .resolver(self.resolver.clone())
            .request(request.clone())
            .length(i64::try_from(page.expected()).unwrap_or(i64::MAX))
            .child(page.name())
            .sink(sink);
        let mut bootstrap = match built.build() {
            Ok(bootstrap) => bootstrap,
            Err(error) => {
                tracing::error!(%error, "Failed to build bootstrap");
                return plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
            }
        };

        if let Err(error) = bootstrap.render() {
            tracing::error!(%error, "Failed to render bootstrap");
            bootstrap.sink_mut().set_status(StatusCode::INTERNAL_SERVER_ERROR);
            bootstrap.sink_mut().end();
            return pending.await;
        }

        let (sender, receiver) = fragment_channel();
        let request = Arc::new(request);
        tokio::spawn(async move { page.produce(request, sender).await }.in_current_span());
        tokio::spawn(
            async move {
                if let Err(error) = drive(&mut bootstrap, receiver).await {
                    tracing::debug!(%error, "Page output stopped early");
                }
                bootstrap.sink_mut().end();
                tracing::debug!(bootstrap = %bootstrap.id(), "Page complete");
            }
            .in_current_span(),
        );

        pending.await
    }
}

impl std::fmt::Debug for PageletService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut routes: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        routes.sort_unstable();
        f.debug_struct("PageletService")
            .field("routes", &routes)
            .field("mode", &self.config.mode)
            .finish()
    }
}

impl<B> Service<Request<B>> for PageletService {
    type Response = Response<PageBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        let service = self.clone();
        let method = req.method().clone();
        let target = req
            .uri()
            .path_and_query()
            .map(|target| target.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let request_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "PageRequest",
            pagelet.http.method = %method,
            pagelet.http.path = %req.uri().path(),
            pagelet.http.request_id = %request_id
        );

        Box::pin(async move { Ok(service.respond(method, &target).await) }.instrument(span))
    }
}

fn plain(status: StatusCode, body: &'static str) -> Response<PageBody> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())).boxed_unsync());
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
