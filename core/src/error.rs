use thiserror::Error;

/// Errors raised while building or rendering a [`Bootstrap`](crate::Bootstrap).
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Missing required collaborator: {0}")]
    MissingCollaborator(&'static str),
    #[error("Template `{template}` failed to render: {source}")]
    Template {
        template: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Serializing the queue into one output value failed.
///
/// The queue is left undrained whenever this is returned.
#[derive(Error, Debug)]
pub enum JoinError {
    #[error("Captured error while stringifying JSON data: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors reported by an [`OutputStream`](crate::flush::OutputStream).
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Output stream is closed")]
    Closed,
    #[error("Output stream I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Output stream error: {0}")]
    Other(String),
}

/// The single error channel of one `flush` call.
#[derive(Error, Debug)]
pub enum FlushError {
    #[error("Response was closed, unable to flush content")]
    StreamClosed,
    #[error(transparent)]
    Serialize(#[from] JoinError),
    #[error("Failed to write to response: {0}")]
    Write(#[source] StreamError),
    #[error("Write acknowledgement dropped before completion")]
    AckDropped,
    #[error("Flush completion abandoned")]
    Abandoned,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
