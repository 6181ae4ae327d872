//! Error normalization and the failure hook.
//!
//! Every request ends in exactly one [`Outcome`], and every outcome becomes
//! exactly one [`Response`]:
//!
//! | Outcome | Status | Body | Failure hook |
//! |---|---|---|---|
//! | `Success` | as built | as built | no |
//! | `HandledFailure` | the error's status | `{"message", "type"}` (+ `"issues"`) | never |
//! | `UnhandledFailure` | 500 | generic `{"message", "type"}` | spawned, not awaited |
//!
//! The hook runs on its own task. Whatever it does, including panicking,
//! cannot reach the response, which is already decided when it is spawned.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{debug, error, warn};

use crate::error::{BoxError, Error, RouteError};
use crate::handler::BoxFuture;
use crate::request::RequestHead;
use crate::response::Response;

/// How one request ended.
#[derive(Debug)]
pub enum Outcome {
    Success(Response),
    HandledFailure(RouteError),
    UnhandledFailure(BoxError),
}

impl From<Result<Response, Error>> for Outcome {
    fn from(result: Result<Response, Error>) -> Self {
        match result {
            Ok(res) => Self::Success(res),
            Err(Error::Handled(e)) => Self::HandledFailure(e),
            Err(Error::Unhandled(e)) => Self::UnhandledFailure(e),
        }
    }
}

impl Outcome {
    /// Produces the response, reporting unhandled failures to `hook`.
    pub(crate) fn respond(self, request: Arc<RequestHead>, hook: Option<&FailureHook>) -> Response {
        match self {
            Self::Success(res) => {
                debug!(status = res.code().as_u16(), "responded");
                res
            }
            Self::HandledFailure(e) => {
                debug!(status = e.status().as_u16(), kind = e.kind(), "handled failure");
                Response::to_json_with_status(e.status(), &e)
            }
            Self::UnhandledFailure(e) => {
                error!(error = %e, "unhandled failure");
                if let Some(hook) = hook {
                    hook.notify(FailedRequest { request, error: e });
                }
                let internal = RouteError::internal();
                Response::to_json_with_status(internal.status(), &internal)
            }
        }
    }
}

// ── Failure hook ──────────────────────────────────────────────────────────────

/// What the failure hook receives: the request that failed and the original
/// error, which the client never sees.
#[derive(Debug)]
pub struct FailedRequest {
    pub request: Arc<RequestHead>,
    pub error: BoxError,
}

/// An observer for unhandled failures. Shared by every builder derived from
/// the one it was attached to.
#[derive(Clone)]
pub struct FailureHook(Arc<dyn Fn(FailedRequest) -> BoxFuture<'static, ()> + Send + Sync>);

impl FailureHook {
    pub(crate) fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(FailedRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self(Arc::new(move |failed| -> BoxFuture<'static, ()> { Box::pin(f(failed)) }))
    }

    /// Fire-and-observe: spawns the hook and returns immediately.
    fn notify(&self, failed: FailedRequest) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime; failure hook skipped");
            return;
        };
        let hook = Arc::clone(&self.0);
        runtime.spawn(async move {
            if AssertUnwindSafe(async move { (*hook)(failed).await }).catch_unwind().await.is_err() {
                warn!("failure hook panicked");
            }
        });
    }
}

impl fmt::Debug for FailureHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FailureHook")
    }
}
