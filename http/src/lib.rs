//! # Pagelet HTTP
//!
//! Hyper adapter for `pagelet-core`. Each request gets its own bootstrap
//! bound to a streamed response; a [`Page`] produces the fragments.

pub mod compose;
pub mod ingress;
pub mod page;
pub mod service;
pub mod sink;
pub mod telemetry;

pub mod prelude {
    pub use crate::compose::{FragmentSender, drive, fragment_channel};
    pub use crate::ingress::PageletIngress;
    pub use crate::page::Page;
    pub use crate::service::PageletService;
    pub use crate::sink::{HyperSink, PageBody, PendingResponse, response_channel};
    pub use crate::telemetry::init_stdout_tracing;
}

pub use compose::FragmentSender;
pub use ingress::PageletIngress;
pub use page::Page;
pub use service::PageletService;
pub use telemetry::init_stdout_tracing;
