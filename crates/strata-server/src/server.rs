use std::future::Future;

use strata_core::{Deps, Strata};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// Strata API server.
pub struct StrataServer {
    config: ServerConfig,
    state: AppState,
}

impl StrataServer {
    /// A server over in-memory stores. With `local_storage` set, the
    /// server also answers the presigned URLs it hands out.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;
        let (strata, objects) = Strata::in_memory(config.core.clone())?;
        let mut state = AppState::new(strata);
        if config.local_storage {
            state = state.with_local_storage(objects);
        }
        Ok(Self { config, state })
    }

    /// A server over caller-provided backends.
    pub fn with_deps(config: ServerConfig, deps: Deps) -> ServerResult<Self> {
        config.validate()?;
        let strata = Strata::new(deps, config.core.clone())?;
        Ok(Self {
            config,
            state: AppState::new(strata),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn strata(&self) -> &Strata {
        &self.state.strata
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Serve until Ctrl-C.
    pub async fn serve(self) -> ServerResult<()> {
        self.serve_until(shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves. The background garbage collector,
    /// if configured, runs for the same span.
    pub async fn serve_until<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let addr = listener.local_addr()?;
        let cancel = CancellationToken::new();
        let gc = self.state.strata.spawn_gc(cancel.child_token());
        info!(
            %addr,
            local_storage = self.state.local_storage.is_some(),
            gc = gc.is_some(),
            "Strata server listening"
        );

        let result = axum::serve(listener, build_router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()));

        cancel.cancel();
        if let Some(handle) = gc {
            if let Err(e) = handle.await {
                warn!(error = %e, "garbage collector task failed");
            }
        }
        info!("Strata server stopped");
        result
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => {
            warn!(error = %e, "cannot listen for Ctrl-C; serving until killed");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;

    #[test]
    fn server_construction() {
        let server = StrataServer::new(ServerConfig::default()).unwrap();
        assert_eq!(
            server.config().bind_addr,
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(server.strata().config().default_branch, "stable");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = ServerConfig::default();
        config.core.gc_page_size = 0;
        assert!(matches!(
            StrataServer::new(config),
            Err(ServerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn serves_until_shutdown() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = StrataServer::new(config).unwrap();
        server.serve_until(async {}).await.unwrap();
    }
}
