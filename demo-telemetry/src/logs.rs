use opentelemetry_otlp::{LogExporter, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::logs::SdkLoggerProvider;

use crate::config::TelemetryConfig;
use crate::error::Error;

/// Builds the OTLP log pipeline. The returned provider is not installed
/// anywhere global; it feeds the [`CorrelationBridge`] layer.
///
/// [`CorrelationBridge`]: crate::CorrelationBridge
pub fn init(config: &TelemetryConfig) -> Result<SdkLoggerProvider, Error> {
    let mut builder = LogExporter::builder()
        .with_tonic()
        .with_endpoint(config.endpoint.clone());
    if let Some(tls) = config.tls_config()? {
        builder = builder.with_tls_config(tls);
    }
    let exporter = builder.build()?;

    Ok(SdkLoggerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(config.resource())
        .build())
}
