use anyhow::Context;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use treasurehunt_api::{
    config::Config, create_router, services::sync_worker::SessionSyncWorker, services::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let provider = init_telemetry();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "treasurehunt_api=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    // JSON lines in production, human-readable output elsewhere
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v == "json");
    match (provider.as_ref(), json_logs) {
        (Some(provider), true) => {
            use opentelemetry::trace::TracerProvider as _;
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .with(tracing_opentelemetry::layer().with_tracer(provider.tracer("treasurehunt-api")))
                .init();
        }
        (Some(provider), false) => {
            use opentelemetry::trace::TracerProvider as _;
            registry
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_opentelemetry::layer().with_tracer(provider.tracer("treasurehunt-api")))
                .init();
        }
        (None, true) => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        (None, false) => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    tracing::info!("Starting Treasure Hunt API");

    let config = Config::load().context("Failed to load configuration")?;
    tracing::info!(
        "Configuration loaded for environment: {:?}",
        std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string())
    );

    let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri)
        .await
        .context("Failed to connect to MongoDB")?;
    tracing::info!("MongoDB connected");

    let redis_client =
        redis::Client::open(config.redis_uri.clone()).context("Failed to create Redis client")?;

    let bind_addr = config.bind_addr.clone();
    let sync_config = config.sync.clone();

    let app_state = Arc::new(
        AppState::new(config, mongo_client, redis_client)
            .await
            .context("Failed to initialize application state")?,
    );

    let worker = SessionSyncWorker::new(app_state.sessions.clone(), sync_config);
    tokio::spawn(async move {
        if let Err(e) = worker.run().await {
            tracing::error!("Session sync worker stopped: {:#}", e);
        }
    });

    let sessions = app_state.sessions.clone();
    let app = create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Persist whatever the worker has not flushed yet
    let report = sessions.flush_all().await;
    tracing::info!(
        flushed = report.flushed,
        failed = report.failed,
        "Final session flush completed"
    );

    shutdown_telemetry(provider);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// OTLP exporter, or `None` when it cannot be built (tracing still works
/// without span export).
fn init_telemetry() -> Option<SdkTracerProvider> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::Resource;

    let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4318".to_string());

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(otlp_endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("WARNING: OpenTelemetry exporter disabled: {}", e);
            return None;
        }
    };

    let resource = Resource::builder_empty()
        .with_service_name("treasurehunt-api")
        .with_attributes(vec![KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION"),
        )])
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());

    Some(provider)
}

fn shutdown_telemetry(provider: Option<SdkTracerProvider>) {
    if let Some(provider) = provider {
        tracing::info!("Shutting down OpenTelemetry");
        if let Err(e) = provider.shutdown() {
            eprintln!("OpenTelemetry shutdown failed: {}", e);
        }
    }
}
