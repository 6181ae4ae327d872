//! The chainable, immutable route builder.
//!
//! Every configuration method borrows `self` and returns a *new* builder, so
//! a base builder can be specialised in several directions without the
//! branches seeing each other's additions:
//!
//! ```rust
//! use tollgate::{Error, Input, Nil, RouteBuilder, RouteError};
//!
//! #[derive(Clone)]
//! struct User { id: String }
//!
//! async fn authenticate(input: Input<Nil>) -> Result<User, Error> {
//!     let id = input.header("x-user").ok_or_else(|| RouteError::unauthorized("sign in"))?;
//!     Ok(User { id: id.to_owned() })
//! }
//!
//! let public_api = RouteBuilder::new().on_failure(|failed| async move {
//!     eprintln!("{} failed: {}", failed.request.path(), failed.error);
//! });
//! let protected_api = public_api.with(authenticate);
//!
//! // `public_api` is untouched: routes built from it skip `authenticate`.
//! let health = public_api.get(|_| async { Ok::<_, Error>("ok") });
//! let me = protected_api.get(|req| async move {
//!     let user: &User = req.get();
//!     Ok::<_, Error>(user.id.clone())
//! });
//! ```
//!
//! Schemas are tracked in the builder's type. Each of `params`, `query` and
//! `body` can be set once; a second call on the same chain does not compile.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use http::Method;

use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::middleware::{Chain, Root, Then};
use crate::normalize::{FailedRequest, FailureHook};
use crate::pipeline::{Config, Configured, Pipeline, Slot, Unset};
use crate::request::{Input, Request};
use crate::response::IntoResponse;
use crate::schema::Schema;

/// A route configuration under construction.
///
/// - `P`, `Q`, `B`: the params, query and body slots ([`Unset`] or
///   [`Configured`]).
/// - `M`: the middleware chain; `M::Ctx` is the context the handler sees.
pub struct RouteBuilder<P = Unset, Q = Unset, B = Unset, M = Root> {
    config: Config<P, Q, B, M>,
}

impl RouteBuilder {
    /// No schemas, no middleware, no failure hook.
    pub fn new() -> Self {
        Self {
            config: Config {
                params: Arc::new(Unset),
                query: Arc::new(Unset),
                body: Arc::new(Unset),
                chain: Arc::new(Root),
                hook: None,
                metadata: None,
            },
        }
    }
}

impl Default for RouteBuilder {
    fn default() -> Self { Self::new() }
}

impl<P, Q, B, M> Clone for RouteBuilder<P, Q, B, M> {
    fn clone(&self) -> Self {
        Self { config: self.config.clone() }
    }
}

// ── Schemas ───────────────────────────────────────────────────────────────────

impl<Q, B, M> RouteBuilder<Unset, Q, B, M> {
    /// Validates route parameters with `schema`.
    #[doc(alias = "context")]
    pub fn params<S: Schema>(&self, schema: S) -> RouteBuilder<Configured<S>, Q, B, M> {
        let c = self.config.clone();
        RouteBuilder {
            config: Config {
                params: Arc::new(Configured(schema)),
                query: c.query,
                body: c.body,
                chain: c.chain,
                hook: c.hook,
                metadata: c.metadata,
            },
        }
    }
}

impl<P, B, M> RouteBuilder<P, Unset, B, M> {
    /// Validates the query string with `schema`.
    pub fn query<S: Schema>(&self, schema: S) -> RouteBuilder<P, Configured<S>, B, M> {
        let c = self.config.clone();
        RouteBuilder {
            config: Config {
                params: c.params,
                query: Arc::new(Configured(schema)),
                body: c.body,
                chain: c.chain,
                hook: c.hook,
                metadata: c.metadata,
            },
        }
    }
}

impl<P, Q, M> RouteBuilder<P, Q, Unset, M> {
    /// Validates the request body with `schema`.
    ///
    /// JSON unless the request says `application/x-www-form-urlencoded`.
    pub fn body<S: Schema>(&self, schema: S) -> RouteBuilder<P, Q, Configured<S>, M> {
        let c = self.config.clone();
        RouteBuilder {
            config: Config {
                params: c.params,
                query: c.query,
                body: Arc::new(Configured(schema)),
                chain: c.chain,
                hook: c.hook,
                metadata: c.metadata,
            },
        }
    }
}

// ── Middleware, hook, metadata, terminals ─────────────────────────────────────

impl<P, Q, B, M> RouteBuilder<P, Q, B, M>
where
    P: Slot,
    Q: Slot,
    B: Slot,
    M: Chain,
{
    /// Appends a middleware step.
    ///
    /// The step receives the context built so far and returns a fragment,
    /// which is merged on top of it for every later step and the handler.
    /// Steps run in the order they were added.
    #[doc(alias = "use")]
    pub fn with<W, Fut, T>(&self, middleware: W) -> RouteBuilder<P, Q, B, Then<M, W>>
    where
        W: Fn(Input<M::Ctx>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let c = self.config.clone();
        RouteBuilder {
            config: Config {
                params: c.params,
                query: c.query,
                body: c.body,
                chain: Arc::new(Then::new(c.chain, middleware)),
                hook: c.hook,
                metadata: c.metadata,
            },
        }
    }

    /// Sets the observer for unhandled failures, replacing any inherited one.
    ///
    /// The hook is spawned, never awaited by the request; nothing it does
    /// changes the 500 the client receives.
    #[doc(alias = "failed")]
    pub fn on_failure<F, Fut>(&self, hook: F) -> Self
    where
        F: Fn(FailedRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut next = self.clone();
        next.config.hook = Some(FailureHook::new(hook));
        next
    }

    /// Attaches a read-only value every step can look up by type, e.g. the
    /// roles a route requires. Replaces any inherited metadata.
    pub fn metadata<T: Any + Send + Sync>(&self, value: T) -> Self {
        let mut next = self.clone();
        next.config.metadata = Some(Arc::new(value));
        next
    }

    /// Number of middleware steps configured so far.
    pub fn middleware_len(&self) -> usize {
        self.config.chain.len()
    }

    pub fn get<H, Fut, R>(&self, handler: H) -> Endpoint
    where
        H: Fn(Request<P::Output, Q::Output, B::Output, M::Ctx>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: IntoResponse + 'static,
    {
        self.endpoint(Method::GET, handler)
    }

    pub fn post<H, Fut, R>(&self, handler: H) -> Endpoint
    where
        H: Fn(Request<P::Output, Q::Output, B::Output, M::Ctx>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: IntoResponse + 'static,
    {
        self.endpoint(Method::POST, handler)
    }

    pub fn put<H, Fut, R>(&self, handler: H) -> Endpoint
    where
        H: Fn(Request<P::Output, Q::Output, B::Output, M::Ctx>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: IntoResponse + 'static,
    {
        self.endpoint(Method::PUT, handler)
    }

    pub fn patch<H, Fut, R>(&self, handler: H) -> Endpoint
    where
        H: Fn(Request<P::Output, Q::Output, B::Output, M::Ctx>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: IntoResponse + 'static,
    {
        self.endpoint(Method::PATCH, handler)
    }

    pub fn delete<H, Fut, R>(&self, handler: H) -> Endpoint
    where
        H: Fn(Request<P::Output, Q::Output, B::Output, M::Ctx>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: IntoResponse + 'static,
    {
        self.endpoint(Method::DELETE, handler)
    }

    /// Freezes the configuration and pairs it with `handler`.
    fn endpoint<H, Fut, R>(&self, method: Method, handler: H) -> Endpoint
    where
        H: Fn(Request<P::Output, Q::Output, B::Output, M::Ctx>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: IntoResponse + 'static,
    {
        let pipeline = Pipeline::new(self.config.clone(), handler);
        Endpoint::new(method, Arc::new(pipeline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Nil;

    #[derive(Clone)]
    struct Tag(&'static str);

    async fn tag_a(_: Input<Nil>) -> Result<Tag, Error> {
        Ok(Tag("a"))
    }

    #[test]
    fn branches_do_not_share_later_middleware() {
        let base = RouteBuilder::new();
        let left = base.with(tag_a);
        let right = base.with(tag_a).with(|_| async { Ok::<_, Error>(()) });

        assert_eq!(base.middleware_len(), 0);
        assert_eq!(left.middleware_len(), 1);
        assert_eq!(right.middleware_len(), 2);
    }

    #[test]
    fn endpoints_carry_their_method() {
        let base = RouteBuilder::new();
        let ok = |_| async { Ok::<_, Error>(()) };
        assert_eq!(*base.get(ok).method(), Method::GET);
        assert_eq!(*base.post(ok).method(), Method::POST);
        assert_eq!(*base.put(ok).method(), Method::PUT);
        assert_eq!(*base.patch(ok).method(), Method::PATCH);
        assert_eq!(*base.delete(ok).method(), Method::DELETE);
    }
}
