pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod methods;
pub mod rpc;
pub mod state;
pub mod transport;

use std::sync::Arc;

use axum::Router;

use error::BridgeResult;
use rpc::Dispatcher;
use state::AppContext;
use transport::sse::PushTransport;

/// Dispatcher with every method registered against `ctx`.
pub fn build_dispatcher(ctx: &AppContext) -> BridgeResult<Arc<Dispatcher>> {
    let mut dispatcher = Dispatcher::new();
    methods::register_all(&mut dispatcher, ctx)?;
    Ok(Arc::new(dispatcher))
}

/// Build the push-transport router for `ctx`.
/// Extracted from `main()` so integration tests can construct the app
/// without binding to a network port.
pub fn create_router(ctx: &AppContext) -> BridgeResult<Router> {
    let dispatcher = build_dispatcher(ctx)?;
    Ok(PushTransport::new().router(dispatcher))
}
