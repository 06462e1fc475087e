use std::net::SocketAddr;

use axum::{routing::get, Router};
use tokio::net::TcpListener;

/// Serve a bare `GET /` acknowledgment so the host can tell the
/// process is alive. Never returns on success; any failure is logged
/// and the bot keeps running without the endpoint.
pub async fn serve_liveness(port: u16) {
    let app = Router::new().route("/", get(|| async { "Bot is running!" }));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("Could not bind the liveness endpoint to {}: {}", addr, e);
            return;
        }
    };

    log::info!("Liveness endpoint listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        log::error!("Liveness endpoint died: {}", e);
    }
}
