//! # Compose
//!
//! Connects fragment producers to a bootstrap. Producers hold a
//! [`FragmentSender`]; [`drive`] owns the bootstrap and feeds it until the
//! page is complete.

use pagelet_core::{
    Bootstrap, FlushError, Fragment, HeaderSink, OutputStream, Payload, RenderMode,
};
use tokio::sync::mpsc;

pub type FragmentReceiver = mpsc::UnboundedReceiver<Fragment>;

/// Cloneable handle producers use to deliver fragments.
#[derive(Debug, Clone)]
pub struct FragmentSender {
    tx: mpsc::UnboundedSender<Fragment>,
}

impl FragmentSender {
    /// Deliver one fragment. Returns false if the page is already complete.
    pub fn send(
        &self,
        name: impl Into<String>,
        parent: Option<&str>,
        payload: impl Into<Payload>,
    ) -> bool {
        self.send_fragment(Fragment::new(name, parent.map(str::to_string), payload))
    }

    pub fn send_fragment(&self, fragment: Fragment) -> bool {
        self.tx.send(fragment).is_ok()
    }
}

pub fn fragment_channel() -> (FragmentSender, FragmentReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FragmentSender { tx }, rx)
}

/// Feed fragments into `bootstrap` until its outstanding count reaches zero
/// or every sender is gone, writing output according to the render mode.
///
/// The bootstrap must already be rendered.
pub async fn drive<S>(
    bootstrap: &mut Bootstrap<S>,
    mut fragments: FragmentReceiver,
) -> Result<(), FlushError>
where
    S: HeaderSink + OutputStream,
{
    match bootstrap.mode() {
        RenderMode::Async => {
            bootstrap.flush_async().await?;
            while bootstrap.outstanding() > 0 {
                let Some(fragment) = fragments.recv().await else {
                    break;
                };
                bootstrap.enqueue(fragment);
                bootstrap.flush_async().await?;
            }
        }
        RenderMode::Sync => {
            while bootstrap.outstanding() > 0 {
                let Some(fragment) = fragments.recv().await else {
                    break;
                };
                bootstrap.enqueue(fragment);
            }
            bootstrap.reduce();
            bootstrap.flush_async().await?;
        }
    }

    if bootstrap.outstanding() > 0 {
        tracing::warn!(
            outstanding = bootstrap.outstanding(),
            "Producers finished before every fragment arrived"
        );
    }

    fragments.close();
    let mut late = 0usize;
    while fragments.try_recv().is_ok() {
        late += 1;
    }
    if late > 0 {
        tracing::debug!(late, "Discarded fragments delivered after completion");
    }

    Ok(())
}
