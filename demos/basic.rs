//! A small posts API served by hyper, with tollgate handling everything past
//! routing.
//!
//! Run with:
//!   RUST_LOG=info,tollgate=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/health
//!   curl http://localhost:3000/posts/1
//!   curl http://localhost:3000/posts/nope                      # 400, issues
//!   curl -X POST http://localhost:3000/posts \
//!        -H 'authorization: Bearer ada' \
//!        -H 'content-type: application/json' \
//!        -d '{"title":"hello"}'                                 # 201
//!   curl -X DELETE http://localhost:3000/posts/1 -H 'authorization: Bearer ada'   # 403
//!   curl -X DELETE http://localhost:3000/posts/1 -H 'authorization: Bearer root'  # 204
//!   curl http://localhost:3000/boom                            # 500, hook logs it
//!
//! The listen address comes from `TOLLGATE_ADDR` (default `127.0.0.1:3000`).

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tollgate::schema::{self, Issue, Schema};
use tollgate::{
    Cons, Endpoint, Error, FailedRequest, Input, Json, Nil, Response, RouteBuilder, RouteError,
    RouteParams,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// ── Domain ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
struct User {
    name: String,
}

#[derive(Clone, Serialize)]
struct Post {
    id: u64,
    title: String,
    author: String,
}

#[derive(Deserialize)]
struct PostId {
    id: u64,
}

#[derive(Deserialize)]
struct NewPost {
    title: String,
}

/// Roles a route requires, attached as route metadata.
struct Roles(&'static [&'static str]);

type Store = Arc<RwLock<HashMap<u64, Post>>>;

// ── Middleware ────────────────────────────────────────────────────────────────

async fn authenticate(input: Input<Nil>) -> Result<User, Error> {
    let name = input
        .header("authorization")
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| RouteError::unauthorized("missing bearer token"))?;
    Ok(User { name: name.to_owned() })
}

async fn require_role(input: Input<Cons<User, Nil>>) -> Result<(), Error> {
    let user: &User = input.get();
    let required = input.metadata::<Roles>().map_or(&[][..], |r| r.0);
    if required.contains(&"admin") && user.name != "root" {
        return Err(RouteError::forbidden(format!("{} is not an admin", user.name)).into());
    }
    Ok(())
}

// ── Routes ────────────────────────────────────────────────────────────────────

fn routes(store: Store) -> Result<Routes, matchit::InsertError> {
    let public_api = RouteBuilder::new().on_failure(|failed: FailedRequest| async move {
        error!(path = failed.request.path(), error = %failed.error, "request failed");
    });
    let protected_api = public_api.with(authenticate);
    let admin_api = protected_api.metadata(Roles(&["admin"])).with(require_role);

    let post_id = schema::typed::<PostId>();

    let mut routes = Routes::default();

    routes.add("/health", public_api.get(|_| async { Ok::<_, Error>("ok") }))?;

    routes.add("/boom", public_api.get(|_| async {
        let broken = std::io::Error::other("database connection refused");
        Err::<(), _>(Error::from(broken))
    }))?;

    let s = Arc::clone(&store);
    routes.add("/posts/{id}", public_api.params(post_id).get(move |req| {
        let store = Arc::clone(&s);
        async move {
            let id = req.params().id;
            match store.read().await.get(&id) {
                Some(post) => Ok(Json(post.clone())),
                None => Err(Error::from(RouteError::not_found(format!("no post {id}")))),
            }
        }
    }))?;

    let s = Arc::clone(&store);
    let create = protected_api
        .body(schema::typed::<NewPost>().refine(|p| {
            if p.title.trim().is_empty() {
                Err(Issue::new("must not be blank").at("title"))
            } else {
                Ok(())
            }
        }))
        .post(move |req| {
            let store = Arc::clone(&s);
            async move {
                let author: &User = req.get();
                let mut posts = store.write().await;
                let id = posts.keys().max().map_or(1, |max| max + 1);
                let post = Post { id, title: req.body().title.clone(), author: author.name.clone() };
                let body = serde_json::to_vec(&post)?;
                posts.insert(id, post);
                Ok::<_, Error>(
                    Response::builder()
                        .status(StatusCode::CREATED)
                        .header("location", &format!("/posts/{id}"))
                        .json(body),
                )
            }
        });
    routes.add("/posts", create)?;

    let s = Arc::clone(&store);
    routes.add("/posts/{id}", admin_api.params(schema::typed::<PostId>()).delete(move |req| {
        let store = Arc::clone(&s);
        async move {
            match store.write().await.remove(&req.params().id) {
                Some(_) => Ok(StatusCode::NO_CONTENT),
                None => Err(Error::from(RouteError::not_found("no such post"))),
            }
        }
    }))?;

    Ok(routes)
}

/// The host's routing table: one matchit tree per method.
#[derive(Default)]
struct Routes {
    trees: HashMap<Method, matchit::Router<Endpoint>>,
}

impl Routes {
    fn add(&mut self, path: &str, endpoint: Endpoint) -> Result<(), matchit::InsertError> {
        self.trees.entry(endpoint.method().clone()).or_default().insert(path, endpoint)
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(Endpoint, RouteParams)> {
        let matched = self.trees.get(method)?.at(path).ok()?;
        Some((matched.value.clone(), matched.params.iter().collect()))
    }
}

async fn dispatch(
    routes: Arc<Routes>,
    mut req: http::Request<Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    match routes.lookup(req.method(), req.uri().path()) {
        Some((endpoint, params)) => {
            req.extensions_mut().insert(params);
            Ok(endpoint.handle(req).await)
        }
        None => Ok(Response::status(StatusCode::NOT_FOUND).into_http()),
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let addr: SocketAddr = std::env::var("TOLLGATE_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:3000".to_owned())
        .parse()?;

    let store: Store = Arc::default();
    store.write().await.insert(1, Post { id: 1, title: "first".into(), author: "root".into() });
    let routes = Arc::new(routes(store)?);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    let mut tasks = tokio::task::JoinSet::new();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            () = &mut shutdown => {
                info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let routes = Arc::clone(&routes);
                let io = TokioIo::new(stream);

                tasks.spawn(async move {
                    let svc = service_fn(move |req| dispatch(Arc::clone(&routes), req));
                    if let Err(e) = ConnBuilder::new(TokioExecutor::new()).serve_connection(io, svc).await {
                        error!(%peer, "connection error: {e}");
                    }
                });
            }

            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    while tasks.join_next().await.is_some() {}
    info!("stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
