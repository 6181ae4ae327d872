//! Per-method entry points.
//!
//! An [`Endpoint`] is what a builder's `get`/`post`/… returns: a frozen
//! pipeline the hosting framework calls once per request. Routing stays with
//! the host. It matches the path, puts the captured parameters into the
//! request extensions as [`RouteParams`](crate::RouteParams), and hands the
//! request over through one of:
//!
//! - [`Endpoint::respond`] for an already-buffered `http::Request<Bytes>`;
//! - [`Endpoint::handle`] for any streaming body, returning the `http` type
//!   hyper writes out;
//! - the [`hyper::service::Service`] impl, for `serve_connection`.

use std::convert::Infallible;
use std::fmt;

use bytes::Bytes;
use http::Method;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Incoming};

use crate::error::BoxError;
use crate::handler::{BoxFuture, BoxedPipeline};
use crate::request::RawRequest;
use crate::response::Response;

/// A configured route for one HTTP method. Cheap to clone and share.
#[derive(Clone)]
pub struct Endpoint {
    method: Method,
    pipeline: BoxedPipeline,
}

impl Endpoint {
    pub(crate) fn new(method: Method, pipeline: BoxedPipeline) -> Self {
        Self { method, pipeline }
    }

    /// The method this endpoint was built for. The host routes on it; the
    /// endpoint itself does not check the incoming method.
    pub fn method(&self) -> &Method { &self.method }

    /// Runs the pipeline on a buffered request.
    pub async fn respond(&self, req: http::Request<Bytes>) -> Response {
        let (parts, body) = req.into_parts();
        let raw = RawRequest::new(http::Request::from_parts(parts, ()), Ok(body));
        self.pipeline.call(raw).await
    }

    /// Buffers the body, runs the pipeline, and converts the result.
    ///
    /// A body that fails to arrive is reported as a body validation failure.
    pub async fn handle<Bd>(&self, req: http::Request<Bd>) -> http::Response<Full<Bytes>>
    where
        Bd: Body + Send + 'static,
        Bd::Data: Send,
        Bd::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) => {
                let e: BoxError = e.into();
                Err(format!("failed to read request body: {e}"))
            }
        };
        let raw = RawRequest::new(http::Request::from_parts(parts, ()), body);
        self.pipeline.call(raw).await.into_http()
    }
}

impl hyper::service::Service<http::Request<Incoming>> for Endpoint {
    type Response = http::Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Infallible>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let endpoint = self.clone();
        Box::pin(async move { Ok(endpoint.handle(req).await) })
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint").field("method", &self.method).finish_non_exhaustive()
    }
}
