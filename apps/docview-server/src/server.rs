//! HTTP server lifecycle

use anyhow::{Context, Result};
use tracing::info;

use docview_api::{create_router, AppState};

pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Serve until ctrl-c.
    pub async fn run(self) -> Result<()> {
        let address = self.state.config.server.address();
        let router = create_router(self.state);

        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .with_context(|| format!("failed to bind {}", address))?;
        info!(%address, "listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server error")?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
