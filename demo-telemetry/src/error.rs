use std::path::PathBuf;

use opentelemetry_otlp::ExporterBuildError;
use opentelemetry_sdk::error::OTelSdkError;

/// Errors raised while wiring telemetry up or tearing it down.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// TLS material could not be read from disk.
    #[error("failed to read TLS material from {path}: {source}")]
    TlsRead {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An OTLP exporter could not be constructed.
    #[error("failed to build OTLP exporter: {0}")]
    ExporterBuild(#[from] ExporterBuildError),

    /// The global `tracing` subscriber could not be installed.
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),

    /// A provider failed to flush or shut down.
    #[error("telemetry shutdown failed: {0}")]
    Shutdown(OTelSdkError),
}
