//! serviceA: the upstream demo service. Every request opens a SERVER span,
//! bumps a counter, and calls serviceB with the trace context injected into
//! the outgoing headers.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::metrics::Counter;
use opentelemetry::trace::{FutureExt, Span, SpanKind, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_http::{Bytes, HeaderExtractor, HeaderInjector};
use opentelemetry_semantic_conventions::trace::HTTP_RESPONSE_STATUS_CODE;
use tokio::net::TcpListener;
use tracing::{info, warn};

fn tracer() -> &'static BoxedTracer {
    static TRACER: OnceLock<BoxedTracer> = OnceLock::new();
    TRACER.get_or_init(|| global::tracer("demo-services/service-a"))
}

fn request_counter() -> &'static Counter<u64> {
    static COUNTER: OnceLock<Counter<u64>> = OnceLock::new();
    COUNTER.get_or_init(|| {
        global::meter("demo-services")
            .u64_counter("service_a_requests")
            .with_description("Number of times the serviceA handler has been called.")
            .build()
    })
}

fn extract_context<B>(req: &Request<B>) -> Context {
    global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor(req.headers()))
    })
}

fn full(body: &'static str) -> BoxBody<Bytes, hyper::Error> {
    Full::new(Bytes::from_static(body.as_bytes()))
        .map_err(|err| match err {})
        .boxed()
}

/// Serves serviceA until the task is dropped or aborted.
pub async fn run(addr: SocketAddr, peer_url: String) {
    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind serviceA listener");
    info!(address = %addr, message = "serviceA listening");

    let peer_url: Arc<str> = peer_url.into();
    loop {
        let (stream, _remote) = listener.accept().await.expect("serviceA accept failed");
        let peer_url = peer_url.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let peer_url = peer_url.clone();
                async move { router(req, &peer_url).await }
            });
            if let Err(err) = Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                warn!(error = %err, message = "serviceA connection error");
            }
        });
    }
}

async fn router<B>(
    req: Request<B>,
    peer_url: &str,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/serviceA") => handle(req, peer_url).await,
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

async fn handle<B>(
    req: Request<B>,
    peer_url: &str,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Infallible> {
    let parent_cx = extract_context(&req);
    let span = tracer()
        .span_builder("serviceA_handler")
        .with_kind(SpanKind::Server)
        .start_with_context(tracer(), &parent_cx);
    let cx = parent_cx.with_span(span);

    let response = process(peer_url).with_context(cx.clone()).await;
    cx.span()
        .set_attribute(KeyValue::new(HTTP_RESPONSE_STATUS_CODE, 200_i64));
    Ok(response)
}

async fn process(peer_url: &str) -> Response<BoxBody<Bytes, hyper::Error>> {
    request_counter().add(1, &[]);
    info!(message = "serviceA called");

    let status = call_service_b(peer_url).await;
    info!(status = status.as_u16(), message = "serviceA called serviceB");

    Response::new(full("hello from serviceA"))
}

/// Issues the outbound request to serviceB under a CLIENT span, with the
/// trace context injected into the outgoing headers. A transport failure is
/// fatal for the request task.
async fn call_service_b(peer_url: &str) -> StatusCode {
    let span = tracer()
        .span_builder("call_serviceB")
        .with_kind(SpanKind::Client)
        .start(tracer());
    let cx = Context::current_with_span(span);

    let client = Client::builder(TokioExecutor::new()).build_http();
    let mut req = Request::builder().uri(peer_url);
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(
            &cx,
            &mut HeaderInjector(req.headers_mut().expect("fresh request builder")),
        )
    });
    let req = req
        .body(Empty::<Bytes>::new())
        .expect("serviceB request is well-formed");

    let response = client.request(req).await.expect("serviceB call failed");
    let status = response.status();
    cx.span().set_attribute(KeyValue::new(
        HTTP_RESPONSE_STATUS_CODE,
        i64::from(status.as_u16()),
    ));
    status
}
