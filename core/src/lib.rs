//! # Pagelet Core
//!
//! Assembles one response body out of many named fragments that arrive in
//! any order. Fragments are queued as their components finish; markers in a
//! parent's markup say where each child belongs; the reducer restores the
//! nesting and the flush path writes the result out.
//!
//! This crate is protocol-agnostic. The response header and body are reached
//! only through the [`HeaderSink`] and [`OutputStream`] traits.

pub mod bootstrap;
pub mod charset;
pub mod config;
pub mod content_type;
pub mod error;
pub mod fallback;
pub mod flush;
pub mod fragment;
pub mod join;
pub mod marker;
pub mod queue;
pub mod reduce;
pub mod template;

pub mod prelude {
    pub use crate::bootstrap::{Bootstrap, BootstrapBuilder};
    pub use crate::config::{BootstrapConfig, RenderMode};
    pub use crate::content_type::{ContentType, HeaderSink};
    pub use crate::error::{BootstrapError, FlushError, JoinError, StreamError};
    pub use crate::fallback::RequestInfo;
    pub use crate::flush::{Completion, FlushResult, OutputStream, WriteAck};
    pub use crate::fragment::{Fragment, Payload};
    pub use crate::reduce::{ReduceOptions, RootPolicy, UnmatchedPolicy};
    pub use crate::template::{
        DefaultTemplate, Dependencies, DependencyResolver, StaticDependencies, TemplateData,
        TemplateEngine,
    };
}

pub use bootstrap::{Bootstrap, BootstrapBuilder};
pub use config::{BootstrapConfig, RenderMode};
pub use content_type::{ContentType, HeaderSink};
pub use error::{BootstrapError, ConfigError, FlushError, JoinError, StreamError};
pub use flush::{Completion, OutputStream};
pub use fragment::{Fragment, Payload};
