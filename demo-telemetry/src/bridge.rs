//! Log/trace correlation for `tracing` events.
//!
//! [`CorrelationBridge`] is a `tracing-subscriber` [`Layer`] that plays the
//! role a logging hook plays in other observability stacks. For every event
//! it
//!
//! 1. emits an OpenTelemetry [`LogRecord`] carrying the event's severity,
//!    name, target, message body, and structured fields, with the active
//!    span's trace id, span id, and trace flags stamped on when a span with
//!    a valid context is current, and
//! 2. mirrors the event onto the active span as a span event named `"log"`
//!    (attributes `log.severity`, `log.message`, plus the event's fields),
//!    escalating the span's status to error when the event severity is
//!    ERROR.
//!
//! A missing, invalid, or non-recording span turns the correlation half into
//! a no-op; the event still reaches the logs pipeline.

use std::fmt::Debug;
use std::marker::PhantomData;

use opentelemetry::logs::{AnyValue, LogRecord, Logger, LoggerProvider, Severity};
use opentelemetry::trace::{Status, TraceContextExt};
use opentelemetry::{Context, Key, KeyValue, StringValue, Value};
use opentelemetry_semantic_conventions::attribute::EXCEPTION_MESSAGE;
use tracing::Level;
use tracing_core::field::Field;
use tracing_subscriber::Layer;

const INSTRUMENTATION_SCOPE_NAME: &str = "demo-telemetry";

const LOG_EVENT_NAME: &str = "log";
const LOG_SEVERITY_KEY: &str = "log.severity";
const LOG_MESSAGE_KEY: &str = "log.message";

/// Forwards `tracing` events to an OpenTelemetry [`Logger`] and mirrors them
/// onto the active span.
pub struct CorrelationBridge<P, L>
where
    P: LoggerProvider<Logger = L> + Send + Sync,
    L: Logger + Send + Sync,
{
    logger: L,
    _provider: PhantomData<P>,
}

impl<P, L> CorrelationBridge<P, L>
where
    P: LoggerProvider<Logger = L> + Send + Sync,
    L: Logger + Send + Sync,
{
    /// Creates a bridge emitting through `provider`.
    pub fn new(provider: &P) -> Self {
        CorrelationBridge {
            logger: provider.logger(INSTRUMENTATION_SCOPE_NAME),
            _provider: PhantomData,
        }
    }
}

impl<S, P, L> Layer<S> for CorrelationBridge<P, L>
where
    S: tracing::Subscriber,
    P: LoggerProvider<Logger = L> + Send + Sync + 'static,
    L: Logger + Send + Sync + 'static,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let meta = event.metadata();
        let severity = severity_of_level(meta.level());

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let mut record = self.logger.create_log_record();
        record.set_severity_number(severity);
        record.set_severity_text(meta.level().as_str());
        record.set_target(meta.target().to_owned());
        // Events named explicitly (`info!(name: "...", ...)`) keep their
        // name; the default "event <file>:<line>" is noise.
        if !meta.name().starts_with("event ") {
            record.set_event_name(meta.name());
        }
        if let Some(message) = visitor.message.clone() {
            record.set_body(message);
        }
        record.add_attributes(visitor.attributes.clone());

        Context::map_current(|cx| {
            let span = cx.span();
            let span_context = span.span_context();
            if span_context.is_valid() {
                record.set_trace_context(
                    span_context.trace_id(),
                    span_context.span_id(),
                    Some(span_context.trace_flags()),
                );
            }
            if !span.is_recording() {
                return;
            }

            let mut event_attributes = Vec::with_capacity(visitor.attributes.len() + 2);
            event_attributes.push(KeyValue::new(LOG_SEVERITY_KEY, meta.level().as_str()));
            if let Some(message) = &visitor.message {
                event_attributes.push(KeyValue::new(LOG_MESSAGE_KEY, attribute_value(message)));
            }
            event_attributes.extend(
                visitor
                    .attributes
                    .iter()
                    .map(|(key, value)| KeyValue::new(key.clone(), attribute_value(value))),
            );
            span.add_event(LOG_EVENT_NAME, event_attributes);

            if severity >= Severity::Error {
                span.set_status(Status::error(status_description(&visitor.message)));
            }
        });

        self.logger.emit(record);
    }
}

/// Collects a `tracing` event's message and fields as OpenTelemetry values.
#[derive(Default)]
struct EventVisitor {
    message: Option<AnyValue>,
    attributes: Vec<(Key, AnyValue)>,
}

impl tracing::field::Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}").into());
        } else {
            self.attributes
                .push((field.name().into(), format!("{value:?}").into()));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_owned().into());
        } else {
            self.attributes
                .push((field.name().into(), value.to_owned().into()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.attributes.push((field.name().into(), value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        match i64::try_from(value) {
            Ok(value) => self.attributes.push((field.name().into(), value.into())),
            Err(_) => self
                .attributes
                .push((field.name().into(), value.to_string().into())),
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.attributes.push((field.name().into(), value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.attributes.push((field.name().into(), value.into()));
    }

    fn record_error(&mut self, _field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.attributes
            .push((EXCEPTION_MESSAGE.into(), value.to_string().into()));
    }
}

const fn severity_of_level(level: &Level) -> Severity {
    match *level {
        Level::TRACE => Severity::Trace,
        Level::DEBUG => Severity::Debug,
        Level::INFO => Severity::Info,
        Level::WARN => Severity::Warn,
        Level::ERROR => Severity::Error,
    }
}

fn attribute_value(value: &AnyValue) -> Value {
    match value {
        AnyValue::Int(value) => Value::I64(*value),
        AnyValue::Double(value) => Value::F64(*value),
        AnyValue::Boolean(value) => Value::Bool(*value),
        AnyValue::String(value) => Value::String(value.clone()),
        other => Value::String(StringValue::from(format!("{other:?}"))),
    }
}

fn status_description(message: &Option<AnyValue>) -> String {
    match message {
        Some(AnyValue::String(message)) => message.to_string(),
        Some(other) => format!("{other:?}"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{TraceContextExt, Tracer, TracerProvider};
    use opentelemetry::trace::{SpanId, TraceId};
    use opentelemetry_sdk::logs::{InMemoryLogExporter, SdkLoggerProvider};
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};
    use tracing::subscriber::with_default;
    use tracing_subscriber::layer::SubscriberExt;

    fn log_pipeline() -> (InMemoryLogExporter, SdkLoggerProvider) {
        let exporter = InMemoryLogExporter::default();
        let provider = SdkLoggerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        (exporter, provider)
    }

    fn span_pipeline() -> (InMemorySpanExporter, SdkTracerProvider) {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        (exporter, provider)
    }

    fn attribute<'a>(
        attributes: &'a [KeyValue],
        key: &str,
    ) -> Option<&'a opentelemetry::Value> {
        attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }

    #[test]
    fn stamps_trace_context_and_mirrors_onto_span() {
        let (log_exporter, logger_provider) = log_pipeline();
        let (span_exporter, tracer_provider) = span_pipeline();
        let subscriber =
            tracing_subscriber::registry().with(CorrelationBridge::new(&logger_provider));

        let tracer = tracer_provider.tracer("bridge-test");
        let mut expected = (TraceId::INVALID, SpanId::INVALID);
        with_default(subscriber, || {
            tracer.in_span("operation", |cx| {
                let span_context = cx.span().span_context().clone();
                expected = (span_context.trace_id(), span_context.span_id());
                tracing::info!(order_id = 7_i64, message = "order accepted");
            });
        });

        let logs = log_exporter.get_emitted_logs().unwrap();
        assert_eq!(logs.len(), 1);
        let record = &logs[0].record;
        let trace_context = record.trace_context().expect("record lacks trace context");
        assert_eq!(trace_context.trace_id, expected.0);
        assert_eq!(trace_context.span_id, expected.1);
        assert_eq!(record.severity_number(), Some(Severity::Info));
        assert_eq!(
            record.body(),
            Some(&AnyValue::String("order accepted".into()))
        );
        assert!(record
            .attributes_iter()
            .any(|(key, value)| key.as_str() == "order_id" && *value == AnyValue::Int(7)));

        let spans = span_exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        let events = &spans[0].events;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "log");
        assert_eq!(
            attribute(&events[0].attributes, LOG_MESSAGE_KEY),
            Some(&Value::from("order accepted"))
        );
        assert_eq!(
            attribute(&events[0].attributes, LOG_SEVERITY_KEY),
            Some(&Value::from("INFO"))
        );
        assert_eq!(
            attribute(&events[0].attributes, "order_id"),
            Some(&Value::I64(7))
        );
        assert_eq!(spans[0].status, Status::Unset);
    }

    #[test]
    fn error_event_escalates_span_status() {
        let (_log_exporter, logger_provider) = log_pipeline();
        let (span_exporter, tracer_provider) = span_pipeline();
        let subscriber =
            tracing_subscriber::registry().with(CorrelationBridge::new(&logger_provider));

        let tracer = tracer_provider.tracer("bridge-test");
        with_default(subscriber, || {
            tracer.in_span("failing", |_cx| {
                tracing::error!(message = "downstream unreachable");
            });
        });

        let spans = span_exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        match &spans[0].status {
            Status::Error { description } => assert_eq!(description, "downstream unreachable"),
            other => panic!("expected error status, got {other:?}"),
        }
    }

    #[test]
    fn warn_event_does_not_touch_span_status() {
        let (_log_exporter, logger_provider) = log_pipeline();
        let (span_exporter, tracer_provider) = span_pipeline();
        let subscriber =
            tracing_subscriber::registry().with(CorrelationBridge::new(&logger_provider));

        let tracer = tracer_provider.tracer("bridge-test");
        with_default(subscriber, || {
            tracer.in_span("warned", |_cx| {
                tracing::warn!(message = "running low");
            });
        });

        let spans = span_exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, Status::Unset);
    }

    #[test]
    fn no_active_span_is_a_passthrough() {
        let (log_exporter, logger_provider) = log_pipeline();
        let subscriber =
            tracing_subscriber::registry().with(CorrelationBridge::new(&logger_provider));

        with_default(subscriber, || {
            tracing::info!(message = "no span here");
        });

        let logs = log_exporter.get_emitted_logs().unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].record.trace_context().is_none());
    }

    #[test]
    fn maps_field_types_faithfully() {
        let (log_exporter, logger_provider) = log_pipeline();
        let subscriber =
            tracing_subscriber::registry().with(CorrelationBridge::new(&logger_provider));

        with_default(subscriber, || {
            tracing::info!(
                count = 3_i64,
                ratio = 0.5_f64,
                enabled = true,
                big = u64::MAX,
                label = "checkout",
                message = "typed fields"
            );
        });

        let logs = log_exporter.get_emitted_logs().unwrap();
        assert_eq!(logs.len(), 1);
        let attributes: Vec<_> = logs[0].record.attributes_iter().collect();
        let get = |key: &str| {
            attributes
                .iter()
                .find(|(k, _)| k.as_str() == key)
                .map(|(_, v)| v.clone())
        };

        assert_eq!(get("count"), Some(AnyValue::Int(3)));
        assert_eq!(get("ratio"), Some(AnyValue::Double(0.5)));
        assert_eq!(get("enabled"), Some(AnyValue::Boolean(true)));
        // u64::MAX does not fit an i64 attribute and falls back to a string.
        assert_eq!(get("big"), Some(AnyValue::String(u64::MAX.to_string().into())));
        assert_eq!(get("label"), Some(AnyValue::String("checkout".into())));
    }

    #[test]
    fn error_values_map_to_exception_message() {
        use std::fmt;

        #[derive(Debug)]
        struct Unreachable;
        impl fmt::Display for Unreachable {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("peer unreachable")
            }
        }
        impl std::error::Error for Unreachable {}

        let (log_exporter, logger_provider) = log_pipeline();
        let subscriber =
            tracing_subscriber::registry().with(CorrelationBridge::new(&logger_provider));

        with_default(subscriber, || {
            let error = Unreachable;
            tracing::warn!(error = &error as &dyn std::error::Error, message = "call failed");
        });

        let logs = log_exporter.get_emitted_logs().unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0]
            .record
            .attributes_iter()
            .any(|(key, value)| key.as_str() == EXCEPTION_MESSAGE
                && *value == AnyValue::String("peer unreachable".into())));
    }
}
