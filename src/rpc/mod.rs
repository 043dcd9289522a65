//! JSON-RPC HTTP surface (`spec.md` §6): a thin `axum` translation layer
//! between the wire protocol and [`VerifyingProvider`]. No verification
//! logic lives here; it exists only so the core is reachable.

mod dispatch;
mod envelope;

use std::sync::Arc;

use axum::{routing::post, Router};
use tower_http::cors::{Any, CorsLayer};

use crate::provider::VerifyingProvider;

pub use envelope::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

/// Builds the `axum` router exposing `POST /` per `spec.md` §6, with a
/// permissive CORS layer (`Access-Control-Allow-Origin: *`) so browser
/// wallets can talk to the proxy directly.
pub fn router(provider: VerifyingProvider) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", post(dispatch::handle))
        .with_state(Arc::new(provider))
        .layer(cors)
}
