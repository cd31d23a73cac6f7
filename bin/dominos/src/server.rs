use axum::{routing::get, Router};
use dominos_core::GenericError;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::{handlers::*, state::AppState};

/// Builds the HTTP router.
///
/// - `GET /service` streams a fresh simulation to each client as Server-Sent Events.
/// - `GET /topology` returns the reverse dependency index as JSON.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/service", get(handle_service_stream))
        .route("/topology", get(handle_topology))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves `router` on `listener` until `shutdown` is cancelled.
///
/// In-flight simulations are cancelled along with `shutdown`, so their streams end and the server can drain.
pub async fn serve(listener: TcpListener, router: Router, shutdown: CancellationToken) -> Result<(), GenericError> {
    let local_addr = listener.local_addr()?;
    info!("dominos server started: listening on {}", local_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(Into::into)
}
