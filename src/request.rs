//! What middleware and handlers receive.
//!
//! The hosting framework hands over an `http::Request`; the pipeline splits
//! it into a shared [`RequestHead`] plus raw params, query and body, then
//! validates those into the values steps actually see:
//!
//! - middleware gets an [`Input<C>`]: head, validated values (type-erased,
//!   because a middleware may be registered before the route declares its
//!   schemas), and the context `C` accumulated so far;
//! - the handler gets a [`Request<P, Q, B, C>`] with everything fully typed.

use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};

use crate::context::Has;

/// Route parameters, as matched by the host's router.
///
/// Insert into the request extensions before calling the endpoint:
///
/// ```rust
/// use tollgate::RouteParams;
///
/// let mut req = http::Request::new(bytes::Bytes::new());
/// req.extensions_mut().insert(RouteParams::from_iter([("id", "42")]));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteParams(pub Vec<(String, String)>);

impl<K, V> FromIterator<(K, V)> for RouteParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Method, URI and headers of the incoming request. Shared, read-only.
#[derive(Debug)]
pub struct RequestHead {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
}

impl RequestHead {
    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }

    /// Header lookup. `None` when absent or not visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

// ── Raw request ───────────────────────────────────────────────────────────────

/// The unvalidated request, as the pipeline first sees it.
#[doc(hidden)]
pub struct RawRequest {
    pub(crate) head: Arc<RequestHead>,
    pub(crate) params: Vec<(String, String)>,
    pub(crate) query: Vec<(String, String)>,
    /// `Err` carries the reason the body could not be read.
    pub(crate) body: Result<Bytes, String>,
}

impl RawRequest {
    pub(crate) fn new(req: http::Request<()>, body: Result<Bytes, String>) -> Self {
        let (mut parts, ()) = req.into_parts();
        let params = parts.extensions.remove::<RouteParams>().map(|p| p.0).unwrap_or_default();
        let query = parts.uri.query().map(decode_pairs).unwrap_or_default();
        let head = RequestHead { method: parts.method, uri: parts.uri, headers: parts.headers };
        Self { head: Arc::new(head), params, query, body }
    }
}

/// Decodes `a=1&b=two` into pairs. Undecodable input yields no pairs.
pub(crate) fn decode_pairs(encoded: &str) -> Vec<(String, String)> {
    serde_urlencoded::from_str(encoded).unwrap_or_default()
}

// ── Validated values ──────────────────────────────────────────────────────────

pub(crate) type Shared = Arc<dyn Any + Send + Sync>;

/// Validated values in the form middleware sees them.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// signature of the public [`Chain`](crate::Chain) trait.
#[doc(hidden)]
pub struct Validated {
    pub(crate) params: Shared,
    pub(crate) query: Shared,
    pub(crate) body: Shared,
    pub(crate) metadata: Option<Shared>,
}

// ── Input ─────────────────────────────────────────────────────────────────────

/// The argument of every middleware step.
pub struct Input<C> {
    head: Arc<RequestHead>,
    validated: Arc<Validated>,
    ctx: C,
}

impl<C> Input<C> {
    pub(crate) fn new(head: Arc<RequestHead>, validated: Arc<Validated>, ctx: C) -> Self {
        Self { head, validated, ctx }
    }

    pub fn head(&self) -> &RequestHead { &self.head }
    pub fn header(&self, name: &str) -> Option<&str> { self.head.header(name) }

    /// The context accumulated by the steps before this one.
    pub fn ctx(&self) -> &C { &self.ctx }

    /// One field of the context, by type.
    pub fn get<T, I>(&self) -> &T
    where
        C: Has<T, I>,
    {
        self.ctx.get()
    }

    /// Validated route params, if they were parsed into a `T`.
    ///
    /// Without a params schema the stored value is `()`.
    pub fn params<T: Any>(&self) -> Option<&T> { self.validated.params.downcast_ref() }
    pub fn query<T: Any>(&self) -> Option<&T> { self.validated.query.downcast_ref() }
    pub fn body<T: Any>(&self) -> Option<&T> { self.validated.body.downcast_ref() }

    /// Route metadata, if any was attached and it is a `T`.
    pub fn metadata<T: Any>(&self) -> Option<&T> {
        self.validated.metadata.as_deref().and_then(|m| m.downcast_ref())
    }
}

// ── Request ───────────────────────────────────────────────────────────────────

/// The argument of the terminal handler: validated params `P`, query `Q`,
/// body `B`, and the fully accumulated context `C`.
pub struct Request<P, Q, B, C> {
    head: Arc<RequestHead>,
    params: Arc<P>,
    query: Arc<Q>,
    body: Arc<B>,
    metadata: Option<Shared>,
    ctx: C,
}

impl<P, Q, B, C> Request<P, Q, B, C> {
    pub(crate) fn new(
        head: Arc<RequestHead>,
        (params, query, body): (Arc<P>, Arc<Q>, Arc<B>),
        metadata: Option<Shared>,
        ctx: C,
    ) -> Self {
        Self { head, params, query, body, metadata, ctx }
    }

    pub fn head(&self) -> &RequestHead { &self.head }
    pub fn header(&self, name: &str) -> Option<&str> { self.head.header(name) }
    pub fn params(&self) -> &P { &self.params }
    pub fn query(&self) -> &Q { &self.query }
    pub fn body(&self) -> &B { &self.body }
    pub fn ctx(&self) -> &C { &self.ctx }

    /// Takes the context out, dropping the rest of the request.
    pub fn into_ctx(self) -> C { self.ctx }

    pub fn get<T, I>(&self) -> &T
    where
        C: Has<T, I>,
    {
        self.ctx.get()
    }

    pub fn metadata<T: Any>(&self) -> Option<&T> {
        self.metadata.as_deref().and_then(|m| m.downcast_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_request_takes_params_from_extensions() {
        let mut req = http::Request::builder()
            .method(Method::GET)
            .uri("/posts/7?draft=true&tag=a%20b")
            .header("x-user", "ada")
            .body(())
            .unwrap();
        req.extensions_mut().insert(RouteParams::from_iter([("id", "7")]));

        let raw = RawRequest::new(req, Ok(Bytes::new()));
        assert_eq!(raw.params, vec![("id".to_owned(), "7".to_owned())]);
        assert_eq!(raw.query, vec![
            ("draft".to_owned(), "true".to_owned()),
            ("tag".to_owned(), "a b".to_owned()),
        ]);
        assert_eq!(raw.head.header("X-User"), Some("ada"));
        assert_eq!(raw.head.path(), "/posts/7");
    }

    #[test]
    fn input_downcasts_validated_values() {
        let validated = Arc::new(Validated {
            params: Arc::new(42_u32),
            query: Arc::new(()),
            body: Arc::new(()),
            metadata: Some(Arc::new("admin")),
        });
        let head = RawRequest::new(http::Request::new(()), Ok(Bytes::new())).head;
        let input = Input::new(head, validated, crate::context::Nil);

        assert_eq!(input.params::<u32>(), Some(&42));
        assert_eq!(input.params::<String>(), None);
        assert_eq!(input.query::<()>(), Some(&()));
        assert_eq!(input.metadata::<&str>(), Some(&"admin"));
    }
}
