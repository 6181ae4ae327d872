//! The per-request state machine.
//!
//! ```text
//! Start ─params─▶ ─query─▶ ─body─▶ middleware[0..N] ─▶ handler ─▶ Responded
//!   │               │        │          │                 │
//!   └───────────────┴────────┴──────────┴─────────────────┴──▶ Failed
//! ```
//!
//! Every arrow is awaited to completion before the next starts, and the first
//! failure ends the request. Validation always runs before any middleware,
//! no matter where in the builder chain the schemas were declared, so no
//! middleware ever sees unvalidated input.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;
use tracing::{Instrument, info_span};

use crate::error::{Error, Panicked, RouteError};
use crate::handler::{BoxFuture, ErasedPipeline, guarded};
use crate::middleware::Chain;
use crate::normalize::{FailureHook, Outcome};
use crate::request::{RawRequest, Request, Shared, Validated, decode_pairs};
use crate::response::{IntoResponse, Response};
use crate::schema::{Issue, Raw, Schema};

// ── Input classes ─────────────────────────────────────────────────────────────

/// The three validated input classes, in validation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InputClass {
    Params,
    Query,
    Body,
}

impl InputClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Params => "params",
            Self::Query  => "query",
            Self::Body   => "body",
        }
    }

    pub(crate) fn invalid_message(self) -> &'static str {
        match self {
            Self::Params => "Invalid params",
            Self::Query  => "Invalid query",
            Self::Body   => "Invalid body",
        }
    }
}

// ── Slots ─────────────────────────────────────────────────────────────────────

/// One schema position on the builder: [`Unset`] or [`Configured`].
pub trait Slot: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    #[doc(hidden)]
    fn extract(&self, class: InputClass, raw: &RawRequest) -> Result<Self::Output, Vec<Issue>>;
}

/// No schema for this class. Yields `()` without looking at the input.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unset;

impl Slot for Unset {
    type Output = ();

    fn extract(&self, _: InputClass, _: &RawRequest) -> Result<(), Vec<Issue>> {
        Ok(())
    }
}

/// A schema attached to one class.
pub struct Configured<S>(pub(crate) S);

impl<S: Schema> Slot for Configured<S> {
    type Output = S::Output;

    fn extract(&self, class: InputClass, raw: &RawRequest) -> Result<S::Output, Vec<Issue>> {
        match class {
            InputClass::Params => self.0.validate(Raw::Pairs(&raw.params)),
            InputClass::Query => self.0.validate(Raw::Pairs(&raw.query)),
            InputClass::Body => match decode_body(raw)? {
                Decoded::Json(value) => self.0.validate(Raw::Json(&value)),
                Decoded::Form(pairs) => self.0.validate(Raw::Pairs(&pairs)),
            },
        }
    }
}

enum Decoded {
    Json(Value),
    Form(Vec<(String, String)>),
}

/// Form bodies decode to pairs, anything else is JSON. Empty means `null`.
fn decode_body(raw: &RawRequest) -> Result<Decoded, Vec<Issue>> {
    let bytes = raw.body.as_ref().map_err(|reason| vec![Issue::new(reason.clone())])?;

    let is_form = raw.head.header("content-type").is_some_and(|ct| {
        ct.split(';').next().is_some_and(|mime| {
            mime.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
    });

    if is_form {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| vec![Issue::new("form body is not valid UTF-8")])?;
        return Ok(Decoded::Form(decode_pairs(text)));
    }
    if bytes.is_empty() {
        return Ok(Decoded::Json(Value::Null));
    }
    serde_json::from_slice(bytes)
        .map(Decoded::Json)
        .map_err(|e| vec![Issue::new(format!("malformed JSON: {e}"))])
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Everything a builder has recorded. Cloning is a handful of `Arc` bumps.
pub(crate) struct Config<P, Q, B, M> {
    pub(crate) params: Arc<P>,
    pub(crate) query: Arc<Q>,
    pub(crate) body: Arc<B>,
    pub(crate) chain: Arc<M>,
    pub(crate) hook: Option<FailureHook>,
    pub(crate) metadata: Option<Shared>,
}

impl<P, Q, B, M> Clone for Config<P, Q, B, M> {
    fn clone(&self) -> Self {
        Self {
            params: Arc::clone(&self.params),
            query: Arc::clone(&self.query),
            body: Arc::clone(&self.body),
            chain: Arc::clone(&self.chain),
            hook: self.hook.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// A frozen configuration plus its terminal handler.
pub(crate) struct Pipeline<P, Q, B, M, H> {
    config: Config<P, Q, B, M>,
    handler: Arc<H>,
}

impl<P, Q, B, M, H> Pipeline<P, Q, B, M, H> {
    pub(crate) fn new(config: Config<P, Q, B, M>, handler: H) -> Self {
        Self { config, handler: Arc::new(handler) }
    }
}

impl<P, Q, B, M, H, Fut, R> ErasedPipeline for Pipeline<P, Q, B, M, H>
where
    P: Slot,
    Q: Slot,
    B: Slot,
    M: Chain,
    H: Fn(Request<P::Output, Q::Output, B::Output, M::Ctx>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoResponse,
{
    fn call(&self, raw: RawRequest) -> BoxFuture<'static, Response> {
        let config = self.config.clone();
        let handler = Arc::clone(&self.handler);
        let head = Arc::clone(&raw.head);
        let span = info_span!("pipeline", method = %head.method(), path = head.path());

        Box::pin(
            async move {
                let outcome = Outcome::from(execute(&config, &*handler, raw).await);
                outcome.respond(head, config.hook.as_ref())
            }
            .instrument(span),
        )
    }
}

/// Runs the state machine for one request.
async fn execute<P, Q, B, M, H, Fut, R>(
    config: &Config<P, Q, B, M>,
    handler: &H,
    raw: RawRequest,
) -> Result<Response, Error>
where
    P: Slot,
    Q: Slot,
    B: Slot,
    M: Chain,
    H: Fn(Request<P::Output, Q::Output, B::Output, M::Ctx>) -> Fut,
    Fut: Future<Output = Result<R, Error>>,
    R: IntoResponse,
{
    let params = validate(&*config.params, InputClass::Params, &raw)?;
    let query = validate(&*config.query, InputClass::Query, &raw)?;
    let body = validate(&*config.body, InputClass::Body, &raw)?;

    let validated = Arc::new(Validated {
        params: erase(&params),
        query: erase(&query),
        body: erase(&body),
        metadata: config.metadata.clone(),
    });
    let ctx = config.chain.run(Arc::clone(&raw.head), validated).await?;

    let request = Request::new(raw.head, (params, query, body), config.metadata.clone(), ctx);
    guarded(|| async move { handler(request).await?.into_response() }).await
}

/// Runs one schema. A panicking schema is an unhandled failure, the same as
/// a panicking middleware.
fn validate<S: Slot>(slot: &S, class: InputClass, raw: &RawRequest) -> Result<Arc<S::Output>, Error> {
    let extracted = panic::catch_unwind(AssertUnwindSafe(|| slot.extract(class, raw)))
        .map_err(|payload| Error::Unhandled(Box::new(Panicked::from_payload(payload))))?;
    extracted
        .map(Arc::new)
        .map_err(|issues| RouteError::validation(class, issues).into())
}

fn erase<T: Any + Send + Sync>(value: &Arc<T>) -> Shared {
    Arc::clone(value) as Shared
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde::Deserialize;

    use crate::schema::{Schema, typed};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Post {
        title: String,
    }

    fn raw(content_type: Option<&str>, body: Result<Bytes, String>) -> RawRequest {
        let mut req = http::Request::builder().method("POST").uri("/posts");
        if let Some(ct) = content_type {
            req = req.header("content-type", ct);
        }
        RawRequest::new(req.body(()).unwrap(), body)
    }

    #[test]
    fn unset_slot_ignores_malformed_input() {
        let raw = raw(None, Ok(Bytes::from_static(b"{not json")));
        assert_eq!(Unset.extract(InputClass::Body, &raw), Ok(()));
    }

    #[test]
    fn malformed_json_is_a_body_issue() {
        let raw = raw(Some("application/json"), Ok(Bytes::from_static(b"{not json")));
        let issues = Configured(typed::<Post>()).extract(InputClass::Body, &raw).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.starts_with("malformed JSON"));
    }

    #[test]
    fn form_bodies_decode_to_pairs() {
        let raw = raw(
            Some("application/x-www-form-urlencoded; charset=utf-8"),
            Ok(Bytes::from_static(b"title=hello+world")),
        );
        let post = Configured(typed::<Post>()).extract(InputClass::Body, &raw).unwrap();
        assert_eq!(post.title, "hello world");
    }

    #[test]
    fn empty_body_is_null() {
        let raw = raw(None, Ok(Bytes::new()));
        let post = Configured(typed::<Option<Post>>()).extract(InputClass::Body, &raw).unwrap();
        assert_eq!(post, None);
    }

    #[test]
    fn panicking_schema_is_an_unhandled_failure() {
        let schema = Configured(typed::<Post>().refine(|_: &Post| -> Result<(), Issue> {
            panic!("refine bug")
        }));
        let raw = raw(None, Ok(Bytes::from_static(br#"{"title":"x"}"#)));

        match validate(&schema, InputClass::Body, &raw) {
            Err(Error::Unhandled(e)) => assert_eq!(e.to_string(), "pipeline step panicked: refine bug"),
            Err(Error::Handled(e)) => panic!("expected unhandled, got {e}"),
            Ok(_) => panic!("expected a failure"),
        }
    }

    #[test]
    fn unreadable_body_is_a_body_issue() {
        let raw = raw(None, Err("connection reset".to_owned()));
        let issues = Configured(typed::<Post>()).extract(InputClass::Body, &raw).unwrap_err();
        assert_eq!(issues, vec![Issue::new("connection reset")]);
    }
}
