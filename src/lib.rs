//! # tollgate
//!
//! Validated, middleware-chained route handlers for `http`/hyper services.
//! Nothing more. Nothing less.
//!
//! ## The contract
//!
//! The host framework routes. tollgate does not. What it does is everything
//! between "this request matched `POST /posts/{id}`" and "here is the
//! response":
//!
//! 1. validate route params, query and body against their schemas;
//! 2. run the middleware chain in order, folding each step's fragment into a
//!    typed context;
//! 3. run the handler with the validated input and the full context;
//! 4. turn the result, or the first failure, into exactly one response.
//!
//! Failures come in two kinds. A [`RouteError`] is intentional and goes to
//! the client as `{"message", "type"}` with its own status. Anything else
//! (a `std::error::Error`, a panic) becomes a generic 500 and is reported to
//! the optional failure hook; its details never reach the client.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use serde::Deserialize;
//! use tollgate::{Error, Input, Json, Nil, RouteBuilder, RouteError, RouteParams, schema};
//!
//! #[derive(Clone)]
//! struct User { name: String }
//!
//! #[derive(Deserialize)]
//! struct PostId { id: u64 }
//!
//! #[derive(Deserialize)]
//! struct NewComment { text: String }
//!
//! async fn authenticate(input: Input<Nil>) -> Result<User, Error> {
//!     match input.header("authorization") {
//!         Some(token) => Ok(User { name: token.to_owned() }),
//!         None => Err(RouteError::unauthorized("missing credentials").into()),
//!     }
//! }
//!
//! # async fn run() {
//! let public_api = RouteBuilder::new();
//! let protected_api = public_api.with(authenticate);
//!
//! let comment = protected_api
//!     .params(schema::typed::<PostId>())
//!     .body(schema::typed::<NewComment>())
//!     .post(|req| async move {
//!         let user: &User = req.get();
//!         Ok::<_, Error>(Json(serde_json::json!({
//!             "post": req.params().id,
//!             "author": user.name,
//!             "text": req.body().text,
//!         })))
//!     });
//!
//! // The host matched `/posts/{id}` and hands the request over:
//! let mut req = http::Request::new(bytes::Bytes::from_static(br#"{"text":"hi"}"#));
//! req.extensions_mut().insert(RouteParams::from_iter([("id", "7")]));
//! let res = comment.respond(req).await;
//! # }
//! ```

mod builder;
mod context;
mod endpoint;
mod error;
mod handler;
mod normalize;
mod pipeline;
mod request;
mod response;

pub mod middleware;
pub mod schema;

pub use builder::RouteBuilder;
pub use context::{Cons, Context, Has, Here, Nil, There};
pub use endpoint::Endpoint;
pub use error::{BoxError, Error, Panicked, RouteError};
pub use handler::BoxFuture;
pub use middleware::Chain;
pub use normalize::{FailedRequest, FailureHook, Outcome};
pub use pipeline::{Configured, InputClass, Slot, Unset};
pub use request::{Input, Request, RequestHead, RouteParams};
pub use response::{ContentType, IntoResponse, Json, Response, ResponseBuilder};
