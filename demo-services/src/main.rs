//! Entry point: picks one of the two demo services and wires telemetry
//! around it.
//!
//! Run the pair in two terminals and poke serviceA:
//!
//! ```text
//! demo-services --service b
//! demo-services --service a
//! curl http://127.0.0.1:8081/serviceA
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use demo_telemetry::{Telemetry, TelemetryConfig, TlsSettings};
use tracing::info;

mod service_a;
mod service_b;

/// Two demo HTTP services that call each other and export correlated
/// traces, metrics, and logs to an OpenTelemetry collector.
#[derive(Debug, Parser)]
#[command(name = "demo-services", version)]
struct Args {
    /// Which service to run.
    #[arg(short, long, value_enum)]
    service: ServiceKind,

    /// Port serviceA listens on.
    #[arg(long, default_value_t = 8081)]
    port_a: u16,

    /// Port serviceB listens on (serviceA also dials it there).
    #[arg(long, default_value_t = 8082)]
    port_b: u16,

    /// OTLP/gRPC collector endpoint.
    #[arg(long, default_value = "http://localhost:4317")]
    collector: String,

    /// PEM-encoded CA bundle for mutual TLS towards the collector.
    #[arg(long)]
    tls_ca: Option<PathBuf>,

    /// PEM-encoded client certificate for mutual TLS.
    #[arg(long)]
    tls_cert: Option<PathBuf>,

    /// PEM-encoded client key for mutual TLS.
    #[arg(long)]
    tls_key: Option<PathBuf>,

    /// Head-based sampling ratio; parent decisions win.
    #[arg(long, default_value_t = 0.3)]
    sample_ratio: f64,

    /// Seconds between metric exports.
    #[arg(long, default_value_t = 2)]
    metrics_interval_secs: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ServiceKind {
    /// serviceA: calls serviceB on every request.
    A,
    /// serviceB: computes an answer under an inner span.
    B,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let service_name = match args.service {
        ServiceKind::A => "demo-svc-a",
        ServiceKind::B => "demo-svc-b",
    };
    let tls = match (&args.tls_ca, &args.tls_cert, &args.tls_key) {
        (None, None, None) => None,
        (Some(ca), Some(cert), Some(key)) => Some(TlsSettings {
            ca_certificate: ca.clone(),
            client_certificate: cert.clone(),
            client_key: key.clone(),
            domain_name: None,
        }),
        _ => panic!("--tls-ca, --tls-cert and --tls-key must be provided together"),
    };

    let telemetry = Telemetry::init(TelemetryConfig {
        service_name: service_name.to_owned(),
        endpoint: args.collector.clone(),
        tls,
        sample_ratio: args.sample_ratio,
        metrics_interval: Duration::from_secs(args.metrics_interval_secs),
        ..TelemetryConfig::default()
    })
    .expect("telemetry setup failed");

    let addr_a = SocketAddr::from(([127, 0, 0, 1], args.port_a));
    let addr_b = SocketAddr::from(([127, 0, 0, 1], args.port_b));
    let server = match args.service {
        ServiceKind::A => {
            tokio::spawn(service_a::run(addr_a, format!("http://{addr_b}/serviceB")))
        }
        ServiceKind::B => tokio::spawn(service_b::run(addr_b)),
    };

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");
    info!(message = "shutting down, flushing telemetry");
    server.abort();
    telemetry.shutdown().expect("telemetry shutdown failed");
}
