//! The middleware chain.
//!
//! Each [`RouteBuilder::with`](crate::RouteBuilder::with) call wraps the
//! chain so far in a [`Then`]. The chain is a linked list pointing back at
//! its prefix through an `Arc`, which gives branching for free:
//!
//! ```text
//! public  = Root
//! authed  = Then(public, load_session)         ─┐ share `public`
//! other   = Then(public, rate_limit)           ─┘
//! admin   = Then(authed, require_admin)        ← shares `authed`
//! ```
//!
//! Running a chain runs the prefix first, then the last step with the
//! context the prefix produced, then merges that step's fragment on top.
//! Steps are awaited one at a time; the first failure stops the chain.

use std::future::Future;
use std::sync::Arc;

use tracing::trace;

use crate::context::{Context, Cons, Nil};
use crate::error::Error;
use crate::handler::{BoxFuture, guarded};
use crate::request::{Input, RequestHead, Validated};

/// A sequence of middleware steps producing a context of type `Ctx`.
///
/// Implemented only by [`Root`] and [`Then`]; build chains through
/// [`RouteBuilder::with`](crate::RouteBuilder::with).
pub trait Chain: Send + Sync + 'static {
    type Ctx: Context;

    /// Number of steps in the chain.
    fn len(&self) -> usize;

    #[doc(hidden)]
    fn run(
        &self,
        head: Arc<RequestHead>,
        validated: Arc<Validated>,
    ) -> BoxFuture<'static, Result<Self::Ctx, Error>>;
}

/// The empty chain.
#[derive(Clone, Copy, Debug, Default)]
pub struct Root;

impl Chain for Root {
    type Ctx = Nil;

    fn len(&self) -> usize { 0 }

    fn run(&self, _: Arc<RequestHead>, _: Arc<Validated>) -> BoxFuture<'static, Result<Nil, Error>> {
        Box::pin(std::future::ready(Ok(Nil)))
    }
}

/// A chain `Prev` followed by one more step `W`.
pub struct Then<Prev, W> {
    prev: Arc<Prev>,
    step: Arc<W>,
}

impl<Prev, W> Then<Prev, W> {
    pub(crate) fn new(prev: Arc<Prev>, step: W) -> Self {
        Self { prev, step: Arc::new(step) }
    }
}

impl<Prev, W, Fut, T> Chain for Then<Prev, W>
where
    Prev: Chain,
    W: Fn(Input<Prev::Ctx>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, Error>> + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    type Ctx = Cons<T, Prev::Ctx>;

    fn len(&self) -> usize { self.prev.len() + 1 }

    fn run(
        &self,
        head: Arc<RequestHead>,
        validated: Arc<Validated>,
    ) -> BoxFuture<'static, Result<Self::Ctx, Error>> {
        let prev = Arc::clone(&self.prev);
        let step = Arc::clone(&self.step);
        let index = self.prev.len();

        Box::pin(async move {
            let ctx = prev.run(Arc::clone(&head), Arc::clone(&validated)).await?;
            trace!(index, "middleware");
            let input = Input::new(head, validated, ctx.clone());
            let fragment = guarded(|| (*step)(input)).await?;
            Ok(ctx.merge(fragment))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use bytes::Bytes;

    use crate::context::Has;
    use crate::error::RouteError;
    use crate::request::RawRequest;

    fn fixtures() -> (Arc<RequestHead>, Arc<Validated>) {
        let head = RawRequest::new(http::Request::new(()), Ok(Bytes::new())).head;
        let validated = Arc::new(Validated {
            params: Arc::new(()),
            query: Arc::new(()),
            body: Arc::new(()),
            metadata: None,
        });
        (head, validated)
    }

    #[derive(Clone, Debug, PartialEq)]
    struct X(u32);

    #[derive(Clone, Debug, PartialEq)]
    struct Y(u32);

    #[tokio::test]
    async fn later_steps_see_earlier_fragments() {
        let first = Arc::new(Root);
        let chain = Then::new(Arc::new(Then::new(first, |_: Input<Nil>| async { Ok::<_, Error>(X(1)) })), {
            |input: Input<Cons<X, Nil>>| async move {
                let x: &X = input.get();
                Ok::<_, Error>(Y(x.0 + 1))
            }
        });
        assert_eq!(chain.len(), 2);

        let (head, validated) = fixtures();
        let ctx = chain.run(head, validated).await.unwrap();
        let x: &X = ctx.get();
        let y: &Y = ctx.get();
        assert_eq!((x, y), (&X(1), &Y(2)));
    }

    #[tokio::test]
    async fn failure_stops_the_chain() {
        let ran = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&ran);
        let failing = Then::new(Arc::new(Root), move |_: Input<Nil>| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push("first");
                Err::<(), _>(Error::from(RouteError::forbidden("no")))
            }
        });
        let log = Arc::clone(&ran);
        let chain = Then::new(Arc::new(failing), move |_: Input<Cons<(), Nil>>| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push("second");
                Ok::<_, Error>(())
            }
        });

        let (head, validated) = fixtures();
        let err = chain.run(head, validated).await.unwrap_err();
        assert!(err.is_handled());
        assert_eq!(*ran.lock().unwrap(), ["first"]);
    }
}
