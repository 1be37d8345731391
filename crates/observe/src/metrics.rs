use {
    axum::{Router, http::StatusCode, routing::get},
    prometheus::{Encoder, Registry, TextEncoder},
    prometheus_metric_storage::StorageRegistry,
    std::{collections::HashMap, net::SocketAddr, sync::Arc, sync::OnceLock},
};

static REGISTRY: OnceLock<StorageRegistry> = OnceLock::new();

/// Configures the global metrics registry, optionally with a name
/// prefix and constant labels. May be called at most once, before any
/// metric is created.
pub fn setup_registry(prefix: Option<String>, labels: Option<HashMap<String, String>>) {
    let registry = Registry::new_custom(prefix, labels).expect("invalid metrics registry config");
    REGISTRY
        .set(StorageRegistry::new(registry))
        .expect("metrics registry already initialized");
}

/// The global metric storage registry, for
/// `Metrics::instance(observe::metrics::get_storage_registry())`.
pub fn get_storage_registry() -> &'static StorageRegistry {
    REGISTRY.get_or_init(|| StorageRegistry::new(Registry::new_custom(None, None).unwrap()))
}

pub fn get_registry() -> &'static Registry {
    get_storage_registry().registry()
}

/// Liveness probe answered on `/liveness` by the metrics server.
#[async_trait::async_trait]
pub trait LivenessChecking: Send + Sync {
    async fn is_alive(&self) -> bool;
}

/// Serves `/metrics` and `/liveness` until the listener fails.
pub async fn serve_metrics(
    liveness: Arc<dyn LivenessChecking>,
    address: SocketAddr,
) -> std::io::Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route(
            "/liveness",
            get(move || {
                let liveness = liveness.clone();
                async move {
                    if liveness.is_alive().await {
                        StatusCode::OK
                    } else {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                }
            }),
        );
    tracing::info!(%address, "serving metrics");
    let listener = tokio::net::TcpListener::bind(address).await?;
    axum::serve(listener, app).await
}

async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(error) = encoder.encode(&get_registry().gather(), &mut buffer) {
        tracing::error!(?error, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_usable_without_setup() {
        let registry = get_registry();
        assert!(registry.gather().is_empty());
    }
}
