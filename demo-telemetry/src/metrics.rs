use opentelemetry::global;
use opentelemetry_otlp::{MetricExporter, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};

use crate::config::TelemetryConfig;
use crate::error::Error;

/// Builds the OTLP metric pipeline behind a periodic reader and installs the
/// meter provider globally.
pub fn init(config: &TelemetryConfig) -> Result<SdkMeterProvider, Error> {
    let mut builder = MetricExporter::builder()
        .with_tonic()
        .with_endpoint(config.endpoint.clone());
    if let Some(tls) = config.tls_config()? {
        builder = builder.with_tls_config(tls);
    }
    let exporter = builder.build()?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(config.metrics_interval)
        .build();

    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(config.resource())
        .build();
    global::set_meter_provider(provider.clone());

    Ok(provider)
}
