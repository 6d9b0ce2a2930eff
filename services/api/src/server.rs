use crate::admin::ensure_admin;
use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_ops_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use enrollment::config::{AppConfig, StoreBackend};
use enrollment::error::AppError;
use enrollment::payments::SimulatedProcessor;
use enrollment::portal::{portal_router, PortalState};
use enrollment::store::{MemoryStore, SqliteStore, Store};
use enrollment::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    for (amount, categories) in config.fees.ambiguous_amounts() {
        let labels: Vec<&str> = categories.iter().map(|category| category.label()).collect();
        warn!(
            %amount,
            categories = %labels.join(", "),
            "amount configured for several payment categories; uncategorized payments of \
             this amount are attributed to the first"
        );
    }

    match config.storage.backend {
        StoreBackend::Sqlite => {
            let store = SqliteStore::open(&config.storage.database_path)?;
            info!(path = %config.storage.database_path.display(), "using sqlite store");
            serve(config, Arc::new(store), args.seed_admin).await
        }
        StoreBackend::Memory => {
            warn!("using in-memory store; all data is lost on shutdown");
            serve(config, Arc::new(MemoryStore::new()), args.seed_admin).await
        }
    }
}

async fn serve<S: Store>(config: AppConfig, store: Arc<S>, seed_admin: bool) -> Result<(), AppError> {
    if seed_admin {
        ensure_admin(store.clone(), &config.admin)?;
    }

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let portal_state = PortalState::new(
        store,
        Arc::new(SimulatedProcessor),
        config.fees.clone(),
        &config.storage,
    );
    let app = with_ops_routes(portal_router(portal_state, &config.session))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "enrollment portal ready");

    axum::serve(listener, app).await?;
    Ok(())
}
