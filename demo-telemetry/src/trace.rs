use opentelemetry::global;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry_otlp::{SpanExporter, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};

use crate::config::TelemetryConfig;
use crate::error::Error;

/// Builds the OTLP span pipeline and installs it globally, together with a
/// W3C TraceContext + Baggage propagator for cross-service headers.
///
/// Sampling is head-based: respect the parent's decision when there is one,
/// otherwise keep `sample_ratio` of new traces.
pub fn init(config: &TelemetryConfig) -> Result<SdkTracerProvider, Error> {
    let mut builder = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.endpoint.clone());
    if let Some(tls) = config.tls_config()? {
        builder = builder.with_tls_config(tls);
    }
    let exporter = builder.build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(config.resource())
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
            config.sample_ratio,
        ))))
        .build();
    global::set_tracer_provider(provider.clone());

    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));

    Ok(provider)
}
