//! Telemetry wiring for the demo services.
//!
//! This crate owns everything the two demo services need in order to emit
//! correlated telemetry: OTLP pipeline setup for traces, metrics, and logs
//! (the [`trace`], [`metrics`], and [`logs`] modules), mutual-TLS
//! configuration for the collector transport ([`TlsSettings`]), and the
//! [`CorrelationBridge`] — a `tracing` layer that forwards every log event
//! into the OpenTelemetry logs pipeline while mirroring it onto the active
//! span.
//!
//! [`Telemetry::init`] wires all of it up in one call:
//!
//! ```no_run
//! use demo_telemetry::{Telemetry, TelemetryConfig};
//!
//! # fn main() -> Result<(), demo_telemetry::Error> {
//! let telemetry = Telemetry::init(TelemetryConfig {
//!     service_name: "demo-svc-a".to_owned(),
//!     ..TelemetryConfig::default()
//! })?;
//!
//! tracing::info!(message = "telemetry is up");
//!
//! telemetry.shutdown()?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
mod config;
mod error;
pub mod logs;
pub mod metrics;
mod tls;
pub mod trace;

pub use bridge::CorrelationBridge;
pub use config::TelemetryConfig;
pub use error::Error;
pub use tls::TlsSettings;

use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Owned handles to the installed telemetry providers.
///
/// The providers are also registered globally so instrumentation can reach
/// them through `opentelemetry::global`, but shutdown stays explicit: hold on
/// to this value and call [`Telemetry::shutdown`] before the process exits so
/// batched spans, metrics, and logs are flushed.
#[derive(Debug)]
pub struct Telemetry {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
    logger_provider: SdkLoggerProvider,
}

impl Telemetry {
    /// Initializes the trace, metric, and log pipelines and installs the
    /// global `tracing` subscriber: a JSON console layer plus the
    /// [`CorrelationBridge`].
    pub fn init(config: TelemetryConfig) -> Result<Self, Error> {
        let tracer_provider = trace::init(&config)?;
        let meter_provider = metrics::init(&config)?;
        let logger_provider = logs::init(&config)?;

        // The OTLP pipelines speak gRPC themselves. Their transport stack
        // must stay out of the bridge, or every export would log its own
        // activity back into the exporter.
        let bridge_filter =
            EnvFilter::new("info,hyper=off,h2=off,tonic=off,tower=off,opentelemetry=off");
        let console_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(CorrelationBridge::new(&logger_provider).with_filter(bridge_filter))
            .with(tracing_subscriber::fmt::layer().json().with_filter(console_filter))
            .try_init()
            .map_err(|err| Error::Subscriber(err.to_string()))?;

        Ok(Telemetry {
            tracer_provider,
            meter_provider,
            logger_provider,
        })
    }

    /// Flushes and shuts down all three providers.
    pub fn shutdown(&self) -> Result<(), Error> {
        self.tracer_provider.shutdown().map_err(Error::Shutdown)?;
        self.meter_provider.shutdown().map_err(Error::Shutdown)?;
        self.logger_provider.shutdown().map_err(Error::Shutdown)?;
        Ok(())
    }
}
