//! serviceB: the downstream demo service. Requests arrive with serviceA's
//! trace context in the headers, so the SERVER span here parents to the
//! remote CLIENT span. The answer is computed under an inner span that also
//! records a demo error, giving the correlation something to show.

use std::convert::Infallible;
use std::error::Error;
use std::fmt;
use std::net::SocketAddr;
use std::sync::OnceLock;

use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::trace::{FutureExt, Span, SpanKind, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_http::{Bytes, HeaderExtractor};
use opentelemetry_semantic_conventions::trace::HTTP_RESPONSE_STATUS_CODE;
use tokio::net::TcpListener;
use tracing::{info, warn};

fn tracer() -> &'static BoxedTracer {
    static TRACER: OnceLock<BoxedTracer> = OnceLock::new();
    TRACER.get_or_init(|| global::tracer("demo-services/service-b"))
}

fn extract_context<B>(req: &Request<B>) -> Context {
    global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor(req.headers()))
    })
}

fn full(body: String) -> BoxBody<Bytes, hyper::Error> {
    Full::new(Bytes::from(body)).map_err(|err| match err {}).boxed()
}

/// Serves serviceB until the task is dropped or aborted.
pub async fn run(addr: SocketAddr) {
    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind serviceB listener");
    info!(address = %addr, message = "serviceB listening");

    loop {
        let (stream, _remote) = listener.accept().await.expect("serviceB accept failed");
        tokio::spawn(async move {
            if let Err(err) = Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(stream), service_fn(router))
                .await
            {
                warn!(error = %err, message = "serviceB connection error");
            }
        });
    }
}

async fn router(
    req: Request<Incoming>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/serviceB") => handle(req).await,
        _ => {
            let parent_cx = extract_context(&req);
            let mut span = tracer()
                .span_builder("not_found")
                .with_kind(SpanKind::Server)
                .start_with_context(tracer(), &parent_cx);
            span.set_attribute(KeyValue::new(HTTP_RESPONSE_STATUS_CODE, 404_i64));

            let mut not_found = Response::new(BoxBody::default());
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            Ok(not_found)
        }
    }
}

pub(crate) async fn handle<B>(
    req: Request<B>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Infallible> {
    let parent_cx = extract_context(&req);
    let span = tracer()
        .span_builder("serviceB_handler")
        .with_kind(SpanKind::Server)
        .start_with_context(tracer(), &parent_cx);
    let cx = parent_cx.with_span(span);

    let response = process().with_context(cx.clone()).await;
    cx.span()
        .set_attribute(KeyValue::new(HTTP_RESPONSE_STATUS_CODE, 200_i64));
    Ok(response)
}

async fn process() -> Response<BoxBody<Bytes, hyper::Error>> {
    info!(message = "serviceB called");

    let answer = add(42, 1813);
    Response::new(full(format!("hello from serviceB: Answer is: {answer}")))
}

/// The demo error `add` records on its span.
#[derive(Debug)]
struct AnswerError;

impl fmt::Display for AnswerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("demo failure: answer not found")
    }
}

impl Error for AnswerError {}

/// Adds the two operands under an inner span carrying demo attributes, and
/// records a demo error so span status and exception events show up in a
/// backend.
pub(crate) fn add(x: i64, y: i64) -> i64 {
    let span = tracer()
        .span_builder("add")
        .with_attributes([
            KeyValue::new("method", "GET"),
            KeyValue::new("endpoint", "/serviceB"),
        ])
        .start(tracer());
    let cx = Context::current_with_span(span);
    let _guard = cx.clone().attach();

    cx.span().record_error(&AnswerError);
    info!(message = "add called");

    x + y
}
