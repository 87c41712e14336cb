use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use clap::Parser;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use colony::checkpoint::gap::GapStore;
use colony::client::HttpAgentClient;
use colony::config::{self, Settings};
use colony::frame_dict::FrameDictionary;
use colony::gap_recovery::GapRecoveryService;
use colony::metrics::{setup_metrics_recorder, Metrics};
use colony::poller::base::BasePoller;
use colony::poller::otel::OtelSpanPoller;
use colony::poller::profiles::{CpuProfilePoller, MemoryProfilePoller};
use colony::poller::red::{GrpcRedPoller, HttpRedPoller, SqlRedPoller};
use colony::poller::sysmetrics::SystemMetricsPoller;
use colony::poller::traces::TracePoller;
use colony::registry::HttpAgentRegistry;
use colony::store::Store;

#[derive(Parser)]
struct Args {
    /// Run schema migrations then exit, without starting the poll loops.
    #[arg(long)]
    migrate_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    config::validate_required_env_vars().unwrap_or_else(|e| {
        error!("Missing required configuration: {:?}", e);
        std::process::exit(1);
    });

    let settings = Settings::new().unwrap_or_else(|e| {
        error!("Failed to load configuration: {:?}", e);
        std::process::exit(1);
    });
    config::validate_database_settings(&settings).unwrap_or_else(|e| {
        error!("Invalid configuration: {:?}", e);
        std::process::exit(1);
    });
    let settings = Arc::new(settings);

    info!("Loaded settings for application on {}:{}", settings.application.host, settings.application.port);

    let prometheus_handle = setup_metrics_recorder();
    let metrics = Metrics::new(prometheus_handle);
    info!("Prometheus metrics initialized");

    let store = Store::open(&settings.database, false).await?;
    info!("Successfully connected to the colony store and applied schema");

    if args.migrate_only {
        info!("--migrate-only set, exiting after schema initialization");
        return Ok(());
    }

    let registry_url = std::env::var("REGISTRY_URL").unwrap_or_else(|_| "http://localhost:8089".to_string());
    let registry: Arc<dyn colony::registry::AgentRegistry> = Arc::new(HttpAgentRegistry::new(registry_url));
    let client: Arc<dyn colony::client::AgentClient> =
        Arc::new(HttpAgentClient::new(settings.poller.query_timeout()));
    let frames = Arc::new(FrameDictionary::new(store.pool().clone()));

    let poll_interval = settings.poller.poll_interval();
    let cleanup_interval = settings.poller.cleanup_interval();

    let http_red = BasePoller::new(
        Arc::new(HttpRedPoller::new(store.clone(), registry.clone(), client.clone(), settings.clone())),
        poll_interval,
        cleanup_interval,
    );
    let grpc_red = BasePoller::new(
        Arc::new(GrpcRedPoller::new(store.clone(), registry.clone(), client.clone(), settings.clone())),
        poll_interval,
        cleanup_interval,
    );
    let sql_red = BasePoller::new(
        Arc::new(SqlRedPoller::new(store.clone(), registry.clone(), client.clone(), settings.clone())),
        poll_interval,
        cleanup_interval,
    );
    let otel_spans = BasePoller::new(
        Arc::new(OtelSpanPoller::new(store.clone(), registry.clone(), client.clone(), settings.clone())),
        poll_interval,
        cleanup_interval,
    );
    let traces = BasePoller::new(
        Arc::new(TracePoller::new(store.clone(), registry.clone(), client.clone(), settings.clone())),
        poll_interval,
        cleanup_interval,
    );
    let cpu_profiles = BasePoller::new(
        Arc::new(CpuProfilePoller::new(
            store.clone(),
            registry.clone(),
            client.clone(),
            settings.clone(),
            frames.clone(),
        )),
        poll_interval,
        cleanup_interval,
    );
    let memory_profiles = BasePoller::new(
        Arc::new(MemoryProfilePoller::new(
            store.clone(),
            registry.clone(),
            client.clone(),
            settings.clone(),
            frames.clone(),
        )),
        poll_interval,
        cleanup_interval,
    );
    let system_metrics = BasePoller::new(
        Arc::new(SystemMetricsPoller::new(store.clone(), registry.clone(), client.clone(), settings.clone())),
        poll_interval,
        cleanup_interval,
    );
    let gap_recovery = BasePoller::new(
        Arc::new(GapRecoveryService::new(store.clone(), registry.clone(), client.clone(), frames.clone(), settings.clone())),
        settings.gap_recovery.interval(),
        cleanup_interval,
    );

    http_red.start().await;
    grpc_red.start().await;
    sql_red.start().await;
    otel_spans.start().await;
    traces.start().await;
    cpu_profiles.start().await;
    memory_profiles.start().await;
    system_metrics.start().await;
    gap_recovery.start().await;
    info!("All nine typed pollers and the gap recovery service are running");

    let cors = CorsLayer::new()
        .allow_origin(
            settings
                .application
                .cors_allow_origin
                .parse::<HeaderValue>()
                .unwrap_or_else(|_| HeaderValue::from_static("*")),
        )
        .allow_methods(
            settings
                .application
                .cors_allow_methods
                .split(',')
                .map(|s| s.trim().parse::<Method>().unwrap_or(Method::GET))
                .collect::<Vec<Method>>(),
        )
        .allow_headers(
            settings
                .application
                .cors_allow_headers
                .split(',')
                .map(|s| match s.trim().to_lowercase().as_str() {
                    "content-type" => header::CONTENT_TYPE,
                    "authorization" => header::AUTHORIZATION,
                    _ => header::HeaderName::from_lowercase(s.trim().to_lowercase().as_bytes())
                        .unwrap_or(header::CONTENT_TYPE),
                })
                .collect::<Vec<_>>(),
        );

    let api_router = colony::api::create_router(Arc::new(store.pool().clone()));
    let app = Router::new()
        .merge(api_router)
        .route(
            "/metrics",
            axum::routing::get(move || {
                let metrics = metrics.clone();
                async move {
                    let body = metrics.prometheus_handle.render();
                    ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
                }
            }),
        )
        .layer(cors);

    let addr = SocketAddr::from((
        settings.application.host.parse::<std::net::IpAddr>().unwrap_or_else(|_| "0.0.0.0".parse().unwrap()),
        settings.application.port,
    ));
    let listener = TcpListener::bind(addr).await?;
    info!("listening on {}", addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("Stopping pollers");
    http_red.stop().await;
    grpc_red.stop().await;
    sql_red.stop().await;
    otel_spans.stop().await;
    traces.stop().await;
    cpu_profiles.stop().await;
    memory_profiles.stop().await;
    system_metrics.stop().await;
    gap_recovery.stop().await;

    let retention = chrono::Duration::days(settings.gap_recovery.gap_retention_days as i64);
    if let Ok(deleted) = GapStore::cleanup(store.pool(), retention).await {
        if deleted > 0 {
            info!("cleaned up {} terminal gap rows on shutdown", deleted);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
