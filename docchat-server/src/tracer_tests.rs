use super::tracer::*;
use crate::middleware::request_context::RequestContext;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use std::time::Duration;
use tower_http::{classify::ServerErrorsFailureClass, trace::MakeSpan};
use tracing::{Level, span};
use tracing_subscriber::util::SubscriberInitExt;

fn request(accept: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::GET)
        .uri("/api/chat/0f7a/messages-stream?x=1");
    if let Some(accept) = accept {
        builder = builder.header("accept", accept);
    }
    builder.body(Body::empty()).unwrap()
}

#[test]
fn event_stream_requests_are_detected_from_accept_header() {
    assert!(wants_event_stream(&request(Some("text/event-stream"))));
    assert!(wants_event_stream(&request(Some(
        "application/json, text/event-stream;q=0.9"
    ))));
    assert!(!wants_event_stream(&request(Some("application/json"))));
    assert!(!wants_event_stream(&request(None)));
}

#[test]
fn stream_requests_expose_their_chat_id() {
    let chat_id = uuid::Uuid::new_v4();

    assert_eq!(
        stream_chat_id(&format!("/api/chat/{chat_id}/messages-stream")),
        Some(chat_id)
    );
    assert_eq!(stream_chat_id(&format!("/api/chat/{chat_id}/messages")), None);
    assert_eq!(stream_chat_id("/api/chat/0f7a/messages-stream"), None);
    assert_eq!(stream_chat_id("/healthz"), None);
}

#[test]
fn make_span_reads_request_id_from_context() {
    let _guard = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .set_default();

    let mut request = request(None);
    request.extensions_mut().insert(RequestContext {
        request_id: "req-42".into(),
        user_id: None,
    });

    let span = HttpMakeSpan.make_span(&request);
    assert_eq!(
        span.metadata().map(|metadata| metadata.name()),
        Some("http_request")
    );
}

#[test]
fn handlers_log_inside_span_without_panicking() {
    let _guard = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .set_default();
    let span = span!(Level::INFO, "test_span");

    on_request_handler(&request(None), &span);
    on_failure_handler(
        ServerErrorsFailureClass::StatusCode(StatusCode::BAD_GATEWAY),
        Duration::from_millis(12),
        &span,
    );
    let _layer = create_trace_layer();
}
