use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::{DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_VERSION};
use tonic::transport::ClientTlsConfig;

use crate::error::Error;
use crate::tls::TlsSettings;

/// Configuration shared by the trace, metric, and log pipelines.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Value of the `service.name` resource attribute.
    pub service_name: String,
    /// Value of the `service.version` resource attribute.
    pub service_version: String,
    /// Value of the `deployment.environment.name` resource attribute.
    pub deployment_environment: String,
    /// OTLP/gRPC collector endpoint, e.g. `https://otel-collector:4317`.
    pub endpoint: String,
    /// Mutual-TLS material for the collector transport. `None` leaves the
    /// channel in plain text, which is only suitable outside production.
    pub tls: Option<TlsSettings>,
    /// Head-based sampling ratio in `[0.0, 1.0]`. Parent decisions win.
    pub sample_ratio: f64,
    /// Interval between periodic metric exports.
    pub metrics_interval: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            service_name: "demo-svc".to_owned(),
            service_version: "0.0.1".to_owned(),
            deployment_environment: "staging".to_owned(),
            endpoint: "http://localhost:4317".to_owned(),
            tls: None,
            sample_ratio: 0.3,
            metrics_interval: Duration::from_secs(2),
        }
    }
}

impl TelemetryConfig {
    /// Resource attributes common to all three pipelines.
    pub(crate) fn resource(&self) -> Resource {
        Resource::builder()
            .with_service_name(self.service_name.clone())
            .with_attributes([
                KeyValue::new(SERVICE_VERSION, self.service_version.clone()),
                KeyValue::new(
                    DEPLOYMENT_ENVIRONMENT_NAME,
                    self.deployment_environment.clone(),
                ),
            ])
            .build()
    }

    pub(crate) fn tls_config(&self) -> Result<Option<ClientTlsConfig>, Error> {
        self.tls.as_ref().map(TlsSettings::load).transpose()
    }
}
