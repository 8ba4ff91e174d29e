//! Response body plumbing shared by both transports.

use bytes::Bytes;
use futures::Stream;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{CACHE_CONTROL, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use std::convert::Infallible;

pub type BoxedBody = BoxBody<Bytes, Infallible>;
pub type HttpResponse = Response<BoxedBody>;

/// A JSON body with the given status.
pub fn json_response(status: StatusCode, value: &serde_json::Value) -> HttpResponse {
    let body = serde_json::to_string(value)
        .unwrap_or_else(|_| r#"{"error":"serialization failure"}"#.to_string());
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)).boxed())
        .expect("static response parts are valid")
}

/// An empty body with the given status.
pub fn empty_response(status: StatusCode) -> HttpResponse {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()).boxed())
        .expect("static response parts are valid")
}

/// A `text/event-stream` response wrapping the given frame stream.
pub fn sse_response<S>(stream: S) -> HttpResponse
where
    S: Stream<Item = String> + Send + Sync + 'static,
{
    use futures::StreamExt;
    let body = StreamBody::new(
        stream.map(|chunk| Ok::<_, Infallible>(Frame::data(Bytes::from(chunk)))),
    );
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache, no-transform")
        .header("connection", "keep-alive")
        .body(BodyExt::boxed(body))
        .expect("static response parts are valid")
}
