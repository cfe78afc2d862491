use crate::config::{Config, IdentitySource, StoreBackend};
use crate::error::ThrottlerError;
use crate::handlers::{
    clear_client, get_client_status, get_config, health_check, index, AppState, SharedState,
};
use crate::identity::{RealIp, RemoteIp};
use crate::key_generator::{PrefixedKey, SanitizedKey};
use crate::middleware::{logging_middleware, throttle_requests};
use crate::store::{FsStore, MemoryStore, RedisStore, Store};
use crate::throttler::Throttler;
use axum::routing::get;
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builds the router. Only the application routes are throttled; health and
/// admin routes stay reachable for limited clients.
pub fn create_app(state: SharedState) -> Router {
    let throttled = Router::new()
        .route("/", get(index))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            throttle_requests,
        ));

    let admin = Router::new()
        .route("/health", get(health_check))
        .route("/config", get(get_config))
        .route(
            "/throttle/:identity",
            get(get_client_status).delete(clear_client),
        );

    throttled.merge(admin).with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .layer(middleware::from_fn(logging_middleware)),
    )
}

pub struct Server {
    app: Router,
    bind_addr: SocketAddr,
    janitor: Option<JoinHandle<()>>,
}

impl Server {
    /// Validates `config`, then opens the store it names.
    pub async fn new(config: Config) -> Result<Self, ThrottlerError> {
        config.check()?;

        let mut janitor = None;
        let store: Arc<dyn Store> = match config.store {
            StoreBackend::Memory => {
                let store = MemoryStore::new();
                janitor = Some(store.spawn_janitor(config.cleanup_interval()));
                Arc::new(store)
            }
            StoreBackend::Filesystem => Arc::new(FsStore::open(&config.cache_dir).await?),
            StoreBackend::Redis => Arc::new(RedisStore::connect(&config.redis_url).await?),
        };

        let mut builder = Throttler::builder()
            .shared_store(store)
            .key_generator(SanitizedKey::new(PrefixedKey::new(config.key_prefix.clone())))
            .throttle_condition(config.interval, config.max_requests)
            .failure_mode(config.failure_mode)
            .serialize_per_key(config.serialize_per_key);

        builder = match config.identity {
            IdentitySource::RealIp => builder.identity_provider(RealIp),
            IdentitySource::RemoteIp => builder.identity_provider(RemoteIp),
        };

        if let Some(timeout) = config.store_timeout {
            builder = builder.store_timeout(timeout);
        }

        let throttler = builder.build()?;

        tracing::info!(
            store = throttler.store().backend(),
            interval = ?config.interval,
            max_requests = config.max_requests,
            failure_mode = ?config.failure_mode,
            "Throttler configured"
        );

        Ok(Self {
            app: create_app(AppState::new(throttler)),
            bind_addr: config.bind_addr,
            janitor,
        })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        tracing::info!("Throttler server listening on {}", self.bind_addr);
        tracing::info!("Health check available at /health");

        // Peer addresses feed the remote-ip identity source.
        let result = axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        if let Some(janitor) = self.janitor {
            janitor.abort();
        }

        result?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let config = Config {
            max_requests: 0,
            ..Config::default()
        };

        assert!(matches!(
            Server::new(config).await,
            Err(ThrottlerError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_new_with_memory_store() {
        let server = Server::new(Config::default()).await.unwrap();

        assert_eq!(server.bind_addr, Config::default().bind_addr);
        let janitor = server.janitor.unwrap();
        assert!(!janitor.is_finished());
        janitor.abort();
    }
}
