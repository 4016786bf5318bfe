//! # Page
//!
//! The unit a route serves: a named component plus the producers of its
//! fragments.

use crate::compose::FragmentSender;
use async_trait::async_trait;
use pagelet_core::RenderMode;
use pagelet_core::fallback::RequestInfo;
use std::sync::Arc;

/// A routable page made of independently produced fragments.
///
/// `produce` may hand the sender to spawned tasks; the page completes once
/// `expected()` fragments have arrived or every sender clone is dropped.
#[async_trait]
pub trait Page: Send + Sync + 'static {
    /// Name of the component the bootstrap wraps.
    fn name(&self) -> &str;

    /// Number of fragments the page will deliver.
    fn expected(&self) -> usize;

    /// Render mode for this page; `None` follows the configured mode.
    ///
    /// Pages answering with structured payloads want `Sync`, so negotiation
    /// happens before the head is committed.
    fn mode(&self) -> Option<RenderMode> {
        None
    }

    async fn produce(&self, request: Arc<RequestInfo>, fragments: FragmentSender);
}
