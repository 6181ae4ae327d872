//! Outgoing response type and the [`IntoResponse`] conversion trait.
//!
//! A handler's return value becomes the response in one of two ways:
//!
//! - **Wrapped.** Plain values (`Json<T>`, `serde_json::Value`, `String`,
//!   `&'static str`, `()`) are serialized as a JSON body with `200 OK`. A
//!   value that fails to serialize is an unhandled failure like any other.
//! - **Passed through.** A [`Response`] (or a bare [`StatusCode`]) is the
//!   framework's own response type. It goes out exactly as built: status,
//!   headers, cookies and body untouched. This is the escape hatch for
//!   redirects, `201 Created`, `Set-Cookie`, non-JSON bodies and so on.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue, SET_COOKIE};
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;
use tracing::{error, warn};

use crate::error::Error;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
pub enum ContentType {
    Csv,          // text/csv
    FormData,     // application/x-www-form-urlencoded
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::FormData    => "application/x-www-form-urlencoded",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use http::StatusCode;
/// use tollgate::{ContentType, Response};
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::status(StatusCode::NO_CONTENT);
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .cookie("session=abc; HttpOnly")
///     .bytes(ContentType::Csv, b"id\n42\n".to_vec());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub(crate) body: Bytes,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) status: StatusCode,
}

impl Response {
    /// `200 OK`, `application/json`, body as given.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { body: Bytes::new(), headers: Vec::new(), status: code }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: StatusCode::OK }
    }

    /// `200 OK` with `value` serialized as JSON.
    pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_vec(value).map(Self::json)
    }

    /// Serializes an error body. Falls back to the generic 500 body if that
    /// fails.
    pub(crate) fn to_json_with_status<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => Self::builder().status(status).json(bytes),
            Err(e) => {
                error!(error = %e, "response body failed to serialize");
                Self::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .json(&br#"{"message":"Internal server error","type":"INTERNAL_SERVER_ERROR"}"#[..])
            }
        }
    }

    pub fn code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    /// Case-insensitive header lookup. Returns the first match.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Converts into the `http` type hyper writes out.
    ///
    /// Headers that are not valid HTTP are dropped with a warning.
    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        for (name, value) in self.headers {
            match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
                (Ok(n), Ok(v)) => {
                    res.headers_mut().append(n, v);
                }
                _ => warn!(header = %name, "dropping invalid response header"),
            }
        }
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`. Terminated by
/// a typed body method.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Appends a `Set-Cookie` header. Call once per cookie.
    pub fn cookie(self, cookie: &str) -> Self {
        self.header(SET_COOKIE.as_str(), cookie)
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.finish(ContentType::Json.as_str(), body.into())
    }

    /// Terminate with a plain-text body.
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(ContentType::Text.as_str(), Bytes::from(body.into()))
    }

    /// Terminate with a typed body.
    pub fn bytes(self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.finish(content_type.as_str(), body.into())
    }

    /// Terminate with no body (e.g. `204`, redirects).
    pub fn no_body(self) -> Response {
        Response { body: Bytes::new(), headers: self.headers, status: self.status }
    }

    fn finish(self, content_type: &str, body: Bytes) -> Response {
        let mut headers = vec![(CONTENT_TYPE.as_str().to_owned(), content_type.to_owned())];
        headers.extend(self.headers);
        Response { body, headers, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion of a handler's success value into a [`Response`].
///
/// An `Err` is treated as an unhandled failure: the client gets the generic
/// 500 and the failure hook sees the error.
///
/// Implement on your own types to return them directly from handlers. Most
/// types want [`Json`]:
///
/// ```rust
/// use serde::Serialize;
/// use tollgate::{Error, IntoResponse, Json, Response};
///
/// #[derive(Serialize)]
/// struct User { id: u64 }
///
/// impl IntoResponse for User {
///     fn into_response(self) -> Result<Response, Error> { Json(self).into_response() }
/// }
/// ```
pub trait IntoResponse {
    fn into_response(self) -> Result<Response, Error>;
}

/// Serializes the wrapped value as a `200 OK` JSON body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Result<Response, Error> { Ok(Response::to_json(&self.0)?) }
}

/// Pass-through: the escape hatch.
impl IntoResponse for Response {
    fn into_response(self) -> Result<Response, Error> { Ok(self) }
}

/// Pass-through: status only, no body.
impl IntoResponse for StatusCode {
    fn into_response(self) -> Result<Response, Error> { Ok(Response::status(self)) }
}

impl IntoResponse for serde_json::Value {
    fn into_response(self) -> Result<Response, Error> { Ok(Response::to_json(&self)?) }
}

impl IntoResponse for String {
    fn into_response(self) -> Result<Response, Error> { Ok(Response::to_json(&self)?) }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Result<Response, Error> { Ok(Response::to_json(self)?) }
}

/// `200 OK` with a `null` body.
impl IntoResponse for () {
    fn into_response(self) -> Result<Response, Error> { Ok(Response::to_json(&self)?) }
}
