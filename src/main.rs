use {
    mpesa_sync::{
        AppState,
        config::{DarajaConfig, ServerConfig},
        domain::{error::ConfigError, provider::CallbackSink},
        infra::postgres::audit_repo::{self, PgAuditSink},
        services::{
            correlator::Correlator,
            gateway::PaymentGateway,
            sink::{FanoutSink, TracingSink},
            sweeper::run_sweeper,
        },
        transport::http::router,
    },
    std::sync::Arc,
    tokio::{signal, sync::watch},
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();
    let config = ServerConfig::from_env().expect("invalid configuration");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background = Vec::new();

    let mut sinks: Vec<Arc<dyn CallbackSink>> = vec![Arc::new(TracingSink)];
    if let Some(database_url) = &config.database_url {
        let pool = audit_repo::connect(database_url)
            .await
            .expect("failed to set up audit database");

        let (sink, writer) = PgAuditSink::spawn(pool, shutdown_rx.clone());
        sinks.push(Arc::new(sink));
        background.push(writer);
        tracing::info!("callback audit persisted to postgres");
    }

    let correlator = Arc::new(Correlator::new(
        config.correlator.clone(),
        Arc::new(FanoutSink::new(sinks)),
    ));
    background.push(tokio::spawn(run_sweeper(
        correlator.clone(),
        config.sweep_interval,
        shutdown_rx,
    )));

    let gateway = match DarajaConfig::from_env() {
        Ok(daraja) => Some(Arc::new(
            PaymentGateway::from_config(&daraja, correlator.clone())
                .expect("failed to set up payment gateway"),
        )),
        Err(ConfigError::Missing(key)) => {
            tracing::warn!(%key, "daraja credentials not set, initiation disabled");
            None
        }
        Err(e) => panic!("invalid daraja configuration: {e}"),
    };

    let app = router(
        AppState {
            correlator: correlator.clone(),
            gateway,
        },
        config.request_timeout,
    );

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .expect("failed to bind listener");
    tracing::info!(
        addr = %config.listen_addr,
        callback_deadline_secs = config.correlator.callback_deadline.as_secs(),
        "listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    correlator.close();
    let _ = shutdown_tx.send(true);
    for task in background {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "background task panicked");
        }
    }

    let stats = correlator.stats();
    tracing::info!(
        pending = stats.pending,
        orphans = stats.orphans,
        applied = stats.applied,
        "shutdown complete"
    );
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
