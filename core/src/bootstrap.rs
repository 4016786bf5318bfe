//! # Bootstrap: one response being composed
//!
//! The bootstrap is the root fragment of every page. It owns the per-response
//! state: the fragment queue, the content-type negotiator and the sink the
//! output goes to. Nothing here is shared between responses.
//!
//! ## Lifecycle
//!
//! 1. `render()` queues the bootstrap's own markup (HEAD, fallback, marker
//!    for the child component).
//! 2. Producers call `queue()` as nested components finish, in any order.
//! 3. The owner calls `reduce()` (markup only) and `flush()`, or flushes
//!    early and repeatedly to stream partial output.

use crate::charset::Charset;
use crate::config::{BootstrapConfig, RenderMode};
use crate::content_type::{ContentType, HeaderSink, Negotiator};
use crate::error::{BootstrapError, FlushError, JoinError};
use crate::fallback::{RequestInfo, fallback};
use crate::flush::{Completion, Done, FlushResult, OutputStream, WriteAck, WriteScope};
use crate::fragment::{Fragment, Payload};
use crate::join::join;
use crate::queue::FragmentQueue;
use crate::reduce::reduce;
use crate::template::{DependencyResolver, TemplateData, TemplateEngine};
use std::sync::Arc;

pub const DEFAULT_CHILD: &str = "root";

/// Builder for [`Bootstrap`]; every collaborator must be supplied.
pub struct BootstrapBuilder<S> {
    config: Arc<BootstrapConfig>,
    template: Option<Arc<dyn TemplateEngine>>,
    resolver: Option<Arc<dyn DependencyResolver>>,
    request: RequestInfo,
    length: i64,
    child: Option<String>,
    sink: Option<S>,
}

impl<S> BootstrapBuilder<S> {
    pub fn new(config: impl Into<Arc<BootstrapConfig>>) -> Self {
        Self {
            config: config.into(),
            template: None,
            resolver: None,
            request: RequestInfo::default(),
            length: 0,
            child: None,
            sink: None,
        }
    }

    pub fn template(mut self, engine: Arc<dyn TemplateEngine>) -> Self {
        self.template = Some(engine);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn DependencyResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn request(mut self, request: RequestInfo) -> Self {
        self.request = request;
        self
    }

    /// Number of fragments expected before the response is complete.
    pub fn length(mut self, length: i64) -> Self {
        self.length = length;
        self
    }

    /// Name of the component whose content the bootstrap wraps.
    pub fn child(mut self, child: impl Into<String>) -> Self {
        self.child = Some(child.into());
        self
    }

    pub fn sink(mut self, sink: S) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<Bootstrap<S>, BootstrapError> {
        let template = self
            .template
            .ok_or(BootstrapError::MissingCollaborator("template engine"))?;
        let resolver = self
            .resolver
            .ok_or(BootstrapError::MissingCollaborator("dependency resolver"))?;
        let sink = self
            .sink
            .ok_or(BootstrapError::MissingCollaborator("output stream"))?;

        let config = self.config;
        let dependencies = resolver
            .resolve(std::slice::from_ref(&config.name))
            .extend(&config.dependencies)
            .into_markup();

        let mut negotiator = Negotiator::new(Charset::from_label_or_default(&config.charset));
        if let Some(content_type) = &config.content_type {
            negotiator = negotiator.with_declared(content_type.clone());
        }

        let id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(mode = ?config.mode, %id, "Initialized bootstrap");

        Ok(Bootstrap {
            fallback: fallback(config.mode, &self.request),
            child: self.child.unwrap_or_else(|| DEFAULT_CHILD.to_string()),
            queue: FragmentQueue::new(self.length),
            dependencies,
            negotiator,
            template,
            config,
            sink,
            id,
        })
    }
}

/// Per-response composition state.
pub struct Bootstrap<S> {
    id: String,
    config: Arc<BootstrapConfig>,
    child: String,
    dependencies: String,
    fallback: String,
    queue: FragmentQueue,
    negotiator: Negotiator,
    template: Arc<dyn TemplateEngine>,
    sink: S,
}

impl<S> Bootstrap<S> {
    pub fn builder(config: impl Into<Arc<BootstrapConfig>>) -> BootstrapBuilder<S> {
        BootstrapBuilder::new(config)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn child(&self) -> &str {
        &self.child
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    pub fn mode(&self) -> RenderMode {
        self.config.mode
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn dependencies(&self) -> &str {
        &self.dependencies
    }

    pub fn content_type(&self) -> ContentType {
        self.negotiator.state()
    }

    pub fn charset(&self) -> Charset {
        self.negotiator.charset()
    }

    pub fn outstanding(&self) -> i64 {
        self.queue.outstanding()
    }

    pub fn set_outstanding(&mut self, outstanding: i64) {
        self.queue.set_outstanding(outstanding);
    }

    pub fn fragments(&self) -> &FragmentQueue {
        &self.queue
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// The data record handed to the template engine.
    pub fn template_data(&self) -> TemplateData {
        let config = &self.config;
        TemplateData {
            title: config.title.clone(),
            description: config.description.clone(),
            keywords: config.keywords.clone(),
            robots: config.robots.clone(),
            favicon: config.favicon.clone(),
            author: config.author.clone(),
            dependencies: self.dependencies.clone(),
            fallback: self.fallback.clone(),
            charset: self.charset().label().to_string(),
            child: self.child.clone(),
            length: self.queue.outstanding(),
            id: self.id.clone(),
            name: config.name.clone(),
        }
    }

    /// Queue the bootstrap's own markup. The first flush pushes it out.
    pub fn render(&mut self) -> Result<&mut Self, BootstrapError> {
        let data = self.template_data();
        let markup = self
            .template
            .render(&self.config.template, &data)
            .map_err(|source| BootstrapError::Template {
                template: self.config.template.clone(),
                source,
            })?;

        tracing::debug!("Queueing initial headers");
        self.queue.push(Fragment::root(self.config.name.clone(), markup));
        Ok(self)
    }

    /// Collapse the queue into the root fragment. A no-op for JSON responses.
    pub fn reduce(&mut self) -> &mut Self {
        if self.negotiator.state() != ContentType::Markup {
            return self;
        }

        let fragments = self.queue.drain();
        tracing::debug!(fragments = fragments.len(), "Reducing fragment queue");
        self.queue.replace(reduce(fragments, &self.config.reduce));
        self
    }

    /// Serialize and drain the queue; the queue is untouched on error.
    pub fn join(&mut self) -> Result<String, JoinError> {
        join(&mut self.queue, self.negotiator.state(), self.config.json).inspect_err(|error| {
            tracing::debug!(%error, "Captured error while joining fragments");
        })
    }
}

impl<S> Bootstrap<S>
where
    S: HeaderSink + OutputStream,
{
    /// Queue a fragment produced by one component.
    pub fn enqueue(&mut self, fragment: Fragment) -> &mut Self {
        self.enqueue_counted(fragment, 1)
    }

    /// Queue a fragment on behalf of `count` components.
    pub fn enqueue_counted(&mut self, fragment: Fragment, count: u32) -> &mut Self {
        // Negotiation must precede the append so no flush sees a stale type.
        self.negotiator.observe(fragment.payload(), &mut self.sink);
        self.queue.enqueue_counted(fragment, count);
        tracing::debug!(
            outstanding = self.queue.outstanding(),
            queued = self.queue.len(),
            "Queued fragment"
        );
        self
    }

    pub fn queue(
        &mut self,
        name: impl Into<String>,
        parent: Option<&str>,
        payload: impl Into<Payload>,
    ) -> &mut Self {
        self.enqueue(Fragment::new(name, parent.map(str::to_string), payload))
    }

    /// Like [`queue`](Self::queue), on behalf of `count` components.
    pub fn queue_counted(
        &mut self,
        name: impl Into<String>,
        parent: Option<&str>,
        payload: impl Into<Payload>,
        count: u32,
    ) -> &mut Self {
        self.enqueue_counted(Fragment::new(name, parent.map(str::to_string), payload), count)
    }

    /// Flush queued fragments; `on_done` is called exactly once.
    pub fn flush<F>(&mut self, on_done: F)
    where
        F: FnOnce(FlushResult) + Send + 'static,
    {
        self.flush_with(Done::new(on_done));
    }

    /// Flush queued fragments, awaiting completion through a future.
    pub fn flush_async(&mut self) -> Completion {
        let (done, completion) = Done::channel();
        self.flush_with(done);
        completion
    }

    fn flush_with(&mut self, done: Done) {
        let closed = self.sink.is_closed();
        if closed {
            done.signal(Err(FlushError::StreamClosed));
        }

        if self.queue.is_empty() {
            done.signal(Ok(()));
            return;
        }

        let output = match self.join() {
            Ok(output) => output,
            Err(error) => {
                done.signal(Err(error.into()));
                return;
            }
        };

        // The queue is drained even when nothing can be written.
        if closed {
            return;
        }

        let charset = self.charset();
        let bytes = charset.encode(&output);
        if bytes.is_empty() {
            done.signal(Ok(()));
            return;
        }

        tracing::debug!(bytes = bytes.len(), %charset, "Writing to response");
        let acknowledges = self.sink.acknowledges_writes();
        let scope = WriteScope::default();
        let ack = acknowledges.then(|| WriteAck::within(done.clone(), scope.clone()));

        let written = self.sink.write(bytes, ack);
        let ack_dropped = scope.close();
        match written {
            Ok(()) if !acknowledges => {
                done.signal(Ok(()));
            }
            Ok(()) if ack_dropped => {
                done.signal(Err(FlushError::AckDropped));
            }
            Ok(()) => {}
            Err(error) => {
                tracing::debug!(%error, "Write to response failed");
                done.signal(Err(FlushError::Write(error)));
            }
        }
    }
}

impl<S> std::fmt::Debug for Bootstrap<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bootstrap")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("content_type", &self.negotiator.state())
            .field("queued", &self.queue.len())
            .field("outstanding", &self.queue.outstanding())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flush::BufferStream;
    use crate::join::tests::cyclic_pair;
    use crate::reduce::ReduceOptions;
    use crate::template::{DefaultTemplate, StaticDependencies};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Header recorder plus in-memory body.
    #[derive(Debug, Default)]
    struct TestSink {
        headers_sent: bool,
        headers: Vec<(String, String)>,
        body: BufferStream,
    }

    impl HeaderSink for TestSink {
        fn headers_sent(&self) -> bool {
            self.headers_sent
        }

        fn set_header(&mut self, name: &str, value: &str) {
            self.headers.push((name.to_string(), value.to_string()));
        }
    }

    impl OutputStream for TestSink {
        fn is_closed(&self) -> bool {
            self.body.is_closed()
        }

        fn write(
            &mut self,
            chunk: bytes::Bytes,
            ack: Option<WriteAck>,
        ) -> Result<(), crate::error::StreamError> {
            self.headers_sent = true;
            self.body.write(chunk, ack)
        }

        fn acknowledges_writes(&self) -> bool {
            self.body.acknowledges_writes()
        }
    }

    fn builder(config: BootstrapConfig) -> BootstrapBuilder<TestSink> {
        Bootstrap::builder(config)
            .template(Arc::new(DefaultTemplate::default()))
            .resolver(Arc::new(StaticDependencies(vec![
                "<script src=\"/pagelet.js\"></script>".into(),
            ])))
    }

    fn with_sink<S>(sink: S) -> Bootstrap<S> {
        Bootstrap::builder(BootstrapConfig::default())
            .template(Arc::new(DefaultTemplate::default()))
            .resolver(Arc::new(StaticDependencies::default()))
            .sink(sink)
            .build()
            .unwrap()
    }

    fn bootstrap() -> Bootstrap<TestSink> {
        builder(BootstrapConfig::default())
            .sink(TestSink::default())
            .build()
            .unwrap()
    }

    /// Acknowledging sink whose writes never reach the client.
    #[derive(Debug, Default)]
    struct BrokenPipe {
        /// Report success while silently dropping the ack.
        swallow: bool,
    }

    impl HeaderSink for BrokenPipe {
        fn headers_sent(&self) -> bool {
            false
        }

        fn set_header(&mut self, _name: &str, _value: &str) {}
    }

    impl OutputStream for BrokenPipe {
        fn is_closed(&self) -> bool {
            false
        }

        fn write(
            &mut self,
            _chunk: bytes::Bytes,
            _ack: Option<WriteAck>,
        ) -> Result<(), crate::error::StreamError> {
            if self.swallow {
                return Ok(());
            }
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe").into())
        }

        fn acknowledges_writes(&self) -> bool {
            true
        }
    }

    /// Flush and collect every completion signal.
    fn flush_counted<S: HeaderSink + OutputStream>(
        bootstrap: &mut Bootstrap<S>,
    ) -> Vec<FlushResult> {
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = results.clone();
        bootstrap.flush(move |result| sink.lock().push(result));
        Arc::try_unwrap(results).map(Mutex::into_inner).unwrap_or_default()
    }

    #[test]
    fn test_missing_collaborators() {
        let err = Bootstrap::<TestSink>::builder(BootstrapConfig::default())
            .sink(TestSink::default())
            .build()
            .unwrap_err();
        assert!(matches!(err, BootstrapError::MissingCollaborator("template engine")));

        let err = Bootstrap::<TestSink>::builder(BootstrapConfig::default())
            .template(Arc::new(DefaultTemplate::default()))
            .sink(TestSink::default())
            .build()
            .unwrap_err();
        assert!(matches!(err, BootstrapError::MissingCollaborator("dependency resolver")));

        let err = builder(BootstrapConfig::default()).build().unwrap_err();
        assert!(matches!(err, BootstrapError::MissingCollaborator("output stream")));
    }

    #[test]
    fn test_render_queues_bootstrap_markup() {
        let mut bootstrap = builder(BootstrapConfig::default())
            .length(2)
            .request(RequestInfo::from_path_and_query("/home?x=1"))
            .sink(TestSink::default())
            .build()
            .unwrap();

        bootstrap.render().unwrap();

        assert_eq!(bootstrap.len(), 1);
        assert_eq!(bootstrap.outstanding(), 2);
        let fragment = &bootstrap.fragments().as_slice()[0];
        assert_eq!(fragment.name(), "bootstrap");
        let html = fragment.payload().as_markup().unwrap();
        assert!(html.contains(r#"<script src="/pagelet.js"></script></head>"#));
        assert!(html.contains(r#"data-pagelet="root""#));
        assert!(html.contains("URL=/home?no_pagelet_js=1&x=1"));
        assert!(html.contains(bootstrap.id()));
    }

    #[test]
    fn test_template_failure() {
        let failing = |_: &str, _: &TemplateData| -> anyhow::Result<String> {
            Err(anyhow::anyhow!("no such template"))
        };
        let mut bootstrap = Bootstrap::builder(BootstrapConfig::default())
            .template(Arc::new(failing))
            .resolver(Arc::new(StaticDependencies::default()))
            .sink(TestSink::default())
            .build()
            .unwrap();

        let err = bootstrap.render().unwrap_err();
        assert!(matches!(err, BootstrapError::Template { .. }));
        assert!(bootstrap.is_empty());
    }

    #[test]
    fn test_configured_dependencies_follow_resolved_ones() {
        let config = BootstrapConfig {
            dependencies: vec!["<link rel=\"stylesheet\" href=\"/a.css\">".into()],
            ..Default::default()
        };
        let bootstrap = builder(config).sink(TestSink::default()).build().unwrap();

        assert_eq!(
            bootstrap.dependencies(),
            r#"<script src="/pagelet.js"></script><link rel="stylesheet" href="/a.css">"#
        );
    }

    #[test]
    fn test_empty_flush_signals_once_without_writing() {
        let mut bootstrap = bootstrap();

        let results = flush_counted(&mut bootstrap);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
        assert!(bootstrap.sink().body.chunks.is_empty());
    }

    #[test]
    fn test_falsy_queue_signals_once_without_writing() {
        let mut bootstrap = bootstrap();
        bootstrap.queue("a", None, Payload::Empty).queue("b", None, "");

        let results = flush_counted(&mut bootstrap);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
        assert!(bootstrap.sink().body.chunks.is_empty());
        assert!(bootstrap.is_empty());
    }

    #[test]
    fn test_flush_writes_in_queue_order() {
        let mut bootstrap = bootstrap();
        bootstrap.queue("a", None, "<a>").queue("b", Some("a"), "<b>");

        let results = flush_counted(&mut bootstrap);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
        assert_eq!(bootstrap.sink().body.contents(), b"<a><b>");
        assert!(bootstrap.is_empty());
        assert_eq!(bootstrap.outstanding(), -2);
    }

    #[test]
    fn test_acknowledged_write_signals_once() {
        let mut bootstrap = builder(BootstrapConfig::default())
            .sink(TestSink {
                body: BufferStream::acknowledging(),
                ..Default::default()
            })
            .build()
            .unwrap();
        bootstrap.queue("a", None, "<a>");

        let results = flush_counted(&mut bootstrap);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
        assert_eq!(bootstrap.sink().body.contents(), b"<a>");
    }

    #[test]
    fn test_queue_counted() {
        let mut bootstrap = builder(BootstrapConfig::default())
            .length(3)
            .sink(TestSink::default())
            .build()
            .unwrap();

        bootstrap.queue_counted("list", Some("root"), "<ul>", 2);
        assert_eq!(bootstrap.outstanding(), 1);
        assert_eq!(bootstrap.fragments().as_slice()[0].parent(), Some("root"));

        bootstrap.queue("footer", None, "<footer>");
        assert_eq!(bootstrap.outstanding(), 0);
    }

    #[test]
    fn test_failed_acknowledged_write_reports_cause() {
        let mut bootstrap = with_sink(BrokenPipe::default());
        bootstrap.queue("a", None, "<a>");

        let results = flush_counted(&mut bootstrap);
        assert_eq!(results.len(), 1);
        match &results[0] {
            Err(FlushError::Write(crate::error::StreamError::Io(error))) => {
                assert_eq!(error.kind(), std::io::ErrorKind::BrokenPipe);
            }
            other => panic!("unexpected flush result: {other:?}"),
        }
    }

    #[test]
    fn test_ack_dropped_by_successful_write() {
        let mut bootstrap = with_sink(BrokenPipe { swallow: true });
        bootstrap.queue("a", None, "<a>");

        let results = flush_counted(&mut bootstrap);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(FlushError::AckDropped)));
    }

    #[test]
    fn test_closed_stream() {
        let mut bootstrap = bootstrap();
        bootstrap.queue("a", None, "<a>");
        bootstrap.sink_mut().body.close();

        let results = flush_counted(&mut bootstrap);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(FlushError::StreamClosed)));
        // Drained for bookkeeping, but nothing written.
        assert!(bootstrap.is_empty());
        assert!(bootstrap.sink().body.chunks.is_empty());
    }

    #[test]
    fn test_structured_response() {
        let mut bootstrap = bootstrap();
        bootstrap
            .queue("a", None, "<p>")
            .queue("api", None, serde_json::json!({ "ok": true }))
            .queue("b", None, "<i>");

        assert_eq!(bootstrap.content_type(), ContentType::Structured);
        assert_eq!(
            bootstrap.sink().headers,
            vec![("Content-Type".to_string(), "application/json".to_string())]
        );

        // Reduction leaves structured responses alone.
        bootstrap.reduce();
        assert_eq!(bootstrap.len(), 3);

        let results = flush_counted(&mut bootstrap);
        assert!(results[0].is_ok());
        assert_eq!(
            bootstrap.sink().body.contents(),
            br#"{"a":"<p>","api":{"ok":true},"b":"<i>"}"#
        );
    }

    #[test]
    fn test_late_structured_payload_after_headers_sent() {
        let mut bootstrap = bootstrap();
        bootstrap.queue("a", None, "<p>");
        assert!(flush_counted(&mut bootstrap)[0].is_ok());
        assert!(bootstrap.sink().headers_sent);

        bootstrap.queue("api", None, serde_json::json!([1]));
        assert_eq!(bootstrap.content_type(), ContentType::Structured);
        assert!(bootstrap.sink().headers.is_empty());
    }

    #[test]
    fn test_circular_json_guard() {
        let (a, b) = cyclic_pair();
        let mut bootstrap = bootstrap();
        bootstrap
            .queue("a", None, Payload::Structured(a.clone()))
            .queue("b", None, Payload::Structured(b));

        assert!(bootstrap.join().is_err());
        assert_eq!(bootstrap.len(), 2);

        let results = flush_counted(&mut bootstrap);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(FlushError::Serialize(_))));
        assert_eq!(bootstrap.len(), 2);
        assert!(bootstrap.sink().body.chunks.is_empty());

        a.next.lock().unwrap().take();
    }

    #[test]
    fn test_sync_page_end_to_end() {
        let config = BootstrapConfig::default().with_mode(RenderMode::Sync);
        let mut bootstrap = builder(config).length(2).sink(TestSink::default()).build().unwrap();

        bootstrap.render().unwrap();
        bootstrap
            .queue("nav", Some("root"), "NAV")
            .queue("root", Some("bootstrap"), r#"<main><nav data-pagelet="nav"></nav></main>"#);
        assert_eq!(bootstrap.outstanding(), 0);

        bootstrap.reduce();
        assert_eq!(bootstrap.len(), 1);

        let results = flush_counted(&mut bootstrap);
        assert!(results[0].is_ok());
        let html = String::from_utf8(bootstrap.sink().body.contents()).unwrap();
        assert!(html.contains(r#"data-pagelet-id=""#));
        assert!(html.contains(r#"><main><nav data-pagelet="nav">NAV</nav></main><script>"#));
    }

    #[test]
    fn test_charset_from_declared_content_type() {
        let config = BootstrapConfig {
            content_type: Some("text/html; charset=iso-8859-1".into()),
            reduce: ReduceOptions::default(),
            ..Default::default()
        };
        let mut bootstrap = builder(config).sink(TestSink::default()).build().unwrap();
        assert_eq!(bootstrap.charset(), Charset::Latin1);

        bootstrap.queue("a", None, "é");
        assert!(flush_counted(&mut bootstrap)[0].is_ok());
        assert_eq!(bootstrap.sink().body.contents(), vec![0xE9]);
    }

    #[tokio::test]
    async fn test_flush_async() {
        let mut bootstrap = bootstrap();
        bootstrap.queue("a", None, "<a>");

        bootstrap.flush_async().await.unwrap();
        assert_eq!(bootstrap.sink().body.contents(), b"<a>");

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        bootstrap.flush(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
