use {
    crate::domain::{
        audit::NewAuditEntry, callback::CallbackPayload, error::AuditError,
        error::CorrelationError, provider::CallbackSink,
    },
    sqlx::{PgPool, postgres::PgPoolOptions},
    std::time::Duration,
    tokio::{
        sync::{mpsc, watch},
        task::JoinHandle,
    },
};

/// Connect and bring `callback_audit` up to date.
pub async fn connect(database_url: &str) -> Result<PgPool, AuditError> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(3))
        .connect(database_url)
        .await?;
    sqlx::migrate!().run(&pool).await?;
    Ok(pool)
}

pub async fn insert_audit_entry(pool: &PgPool, entry: &NewAuditEntry) -> Result<bool, AuditError> {
    let result = sqlx::query(
        r#"
        INSERT INTO callback_audit (id, correlation_id, kind, action, result_code, detail, recorded_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(entry.id)
    .bind(&entry.correlation_id)
    .bind(entry.kind.as_deref())
    .bind(&entry.action)
    .bind(entry.result_code)
    .bind(&entry.detail)
    .bind(entry.recorded_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Persists correlation anomalies to `callback_audit`.
///
/// `record` is called with the correlator's registry lock released but still
/// on the callback request path, so it only enqueues. A background writer
/// owns the pool.
pub struct PgAuditSink {
    tx: mpsc::UnboundedSender<NewAuditEntry>,
}

impl PgAuditSink {
    pub fn spawn(pool: PgPool, shutdown: watch::Receiver<bool>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_audit_writer(pool, rx, shutdown));
        (Self { tx }, writer)
    }
}

impl CallbackSink for PgAuditSink {
    fn record(&self, anomaly: &CorrelationError, payload: Option<&CallbackPayload>) {
        let entry = NewAuditEntry::from_anomaly(anomaly, payload);
        if self.tx.send(entry).is_err() {
            tracing::warn!(anomaly = %anomaly, "audit writer stopped, entry dropped");
        }
    }
}

async fn run_audit_writer(
    pool: PgPool,
    mut rx: mpsc::UnboundedReceiver<NewAuditEntry>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("audit writer started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            entry = rx.recv() => match entry {
                Some(entry) => write(&pool, &entry).await,
                None => return,
            },
        }
    }

    // Flush whatever was queued before shutdown.
    rx.close();
    let mut drained = 0usize;
    while let Some(entry) = rx.recv().await {
        write(&pool, &entry).await;
        drained += 1;
    }
    tracing::info!(drained, "audit writer shutting down");
}

async fn write(pool: &PgPool, entry: &NewAuditEntry) {
    match insert_audit_entry(pool, entry).await {
        Ok(true) => {}
        Ok(false) => tracing::debug!(id = %entry.id, "audit entry already stored"),
        Err(e) => tracing::error!(
            error = %e,
            correlation_id = %entry.correlation_id,
            action = %entry.action,
            "failed to write audit entry"
        ),
    }
}
