//! Type erasure for configured pipelines.
//!
//! Every finished route has a different concrete type: three schema slots,
//! a middleware chain nested once per `.with()`, and a handler. Hosts want to
//! store them side by side, so [`Endpoint`](crate::Endpoint) hides the
//! concrete type behind a trait object:
//!
//! ```text
//! builder.post(create_post)                         ← user writes this
//!        ↓
//! Pipeline { params, query, body, chain, handler }  ← fully typed
//!        ↓  stored as BoxedPipeline = Arc<dyn ErasedPipeline>
//! pipeline.call(raw)  at request time               ← one vtable dispatch
//!        ↓
//! BoxFuture<'static, Response>
//! ```
//!
//! Per request that is one `Arc` clone and one virtual call, plus one boxed
//! future per middleware step.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::FutureExt;

use crate::error::{Error, Panicked};
use crate::request::RawRequest;
use crate::response::Response;

/// A heap-allocated, type-erased future.
///
/// `Send + 'a` so tokio can move it across worker threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Internal dispatch interface. One implementation per concrete route type.
pub(crate) trait ErasedPipeline {
    fn call(&self, raw: RawRequest) -> BoxFuture<'static, Response>;
}

/// A configured pipeline shared by every request to its endpoint.
pub(crate) type BoxedPipeline = Arc<dyn ErasedPipeline + Send + Sync + 'static>;

/// Runs one pipeline step, turning a panic into an unhandled failure.
///
/// `step` is called inside the guard, so a panic while building the future
/// is caught as well as one while polling it.
pub(crate) async fn guarded<F, Fut, T>(step: F) -> Result<T, Error>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    match AssertUnwindSafe(async move { step().await }).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(Error::Unhandled(Box::new(Panicked::from_payload(payload)))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guarded_passes_results_through() {
        let ok = guarded(|| async { Ok::<_, Error>(1) }).await;
        assert_eq!(ok.unwrap(), 1);

        let err = guarded(|| async { Err::<(), _>(Error::unhandled("db down")) }).await;
        assert!(!err.unwrap_err().is_handled());
    }

    #[tokio::test]
    async fn guarded_catches_panics() {
        let err = guarded(|| async {
            if true {
                panic!("kaboom");
            }
            Ok::<(), Error>(())
        })
        .await
        .unwrap_err();

        match err {
            Error::Unhandled(e) => assert!(e.to_string().contains("kaboom")),
            Error::Handled(e) => panic!("expected unhandled, got {e}"),
        }
    }

    #[tokio::test]
    async fn guarded_catches_panics_before_the_future_exists() {
        fn explode() -> std::future::Ready<Result<(), Error>> {
            panic!("eager")
        }
        let err = guarded(explode).await.unwrap_err();
        assert!(!err.is_handled());
    }
}
