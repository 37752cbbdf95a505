//! HTTP server implementation
//!
//! hyper http1 with TokioIo; one spawned task per connection, match-based
//! dispatch to the route modules.

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::auth::{IdentityProvider, JwtValidator, LocalIdentityProvider};
use crate::config::Args;
use crate::db::MongoClient;
use crate::routes;
use crate::routes::helpers::{cors_preflight, not_found_response, BoxBody};
use crate::types::FarmgateError;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub mongo: MongoClient,
    /// Token issue/verify + credential storage
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    pub fn new(args: Args, mongo: MongoClient) -> Self {
        let jwt = JwtValidator::new(&args.jwt_secret(), args.jwt_expiry_seconds);
        let identity: Arc<dyn IdentityProvider> =
            Arc::new(LocalIdentityProvider::new(mongo.clone(), jwt));

        Self {
            args,
            mongo,
            identity,
        }
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), FarmgateError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Farmgate listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    // CORS preflight
    if method == Method::OPTIONS {
        return Ok(cors_preflight());
    }

    // Auth routes consume the request
    if path.starts_with("/auth") {
        if let Some(response) = routes::handle_auth_request(req, Arc::clone(&state)).await {
            return Ok(response);
        }
        return Ok(not_found_response(&path));
    }

    let response = match (method, path.as_str()) {
        // Liveness probe
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }

        // Readiness probe (checks MongoDB)
        (Method::GET, "/ready") | (Method::GET, "/readyz") => {
            routes::readiness_check(Arc::clone(&state)).await
        }

        // Version info for deployment verification
        (Method::GET, "/version") => routes::version_info(),

        // Resource modules
        (_, p) if p.starts_with("/api/cows") => {
            routes::handle_cow_request(req, Arc::clone(&state)).await
        }
        (_, p) if p.starts_with("/api/milk") => {
            routes::handle_milk_request(req, Arc::clone(&state)).await
        }
        (_, p) if p.starts_with("/api/feeds") => {
            routes::handle_feed_request(req, Arc::clone(&state)).await
        }
        (_, p) if p.starts_with("/api/health-records") => {
            routes::handle_health_record_request(req, Arc::clone(&state)).await
        }
        (_, p) if p.starts_with("/api/chicken") => {
            routes::handle_chicken_request(req, Arc::clone(&state)).await
        }
        (_, p) if p.starts_with("/api/farms") => {
            routes::handle_farm_request(req, Arc::clone(&state)).await
        }
        (_, p) if p.starts_with("/api/stats") => {
            routes::handle_stats_request(req, Arc::clone(&state)).await
        }
        (_, p) if p.starts_with("/api/users") => {
            routes::handle_user_request(req, Arc::clone(&state)).await
        }

        _ => not_found_response(&path),
    };

    Ok(response)
}
