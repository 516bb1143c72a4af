use edusuite_payments::api::{router, AppState};
use edusuite_payments::billing::{
    BillingSweeper, CallbackRegistry, InvoicePayments, PgEffectDispatcher,
};
use edusuite_payments::cache::{init_cache_pool, CacheConfig};
use edusuite_payments::config::Config;
use edusuite_payments::database::webhook_repository::WebhookRepository;
use edusuite_payments::database::{init_pool, PoolConfig};
use edusuite_payments::payments::PaystackGateway;
use edusuite_payments::webhooks::{RedisIdempotencyStore, WebhookReceiver, WebhookVerifier};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;
    init_tracing(&config.server.environment);

    // Log startup info
    tracing::info!("Starting EduSuite payments service");
    tracing::info!("Environment: {}", config.server.environment);
    tracing::info!("Default currency: {}", config.billing.default_currency);
    if config.webhook.secret.is_none() {
        tracing::warn!(
            "PAYSTACK_WEBHOOK_SECRET is not set; webhook deliveries will be answered with 500"
        );
    }

    // Infrastructure pools
    let pool = init_pool(
        &config.database.url,
        Some(PoolConfig::with_max_connections(
            config.database.max_connections,
        )),
    )
    .await?;
    let redis_pool = init_cache_pool(CacheConfig {
        redis_url: config.redis.url.clone(),
        ..CacheConfig::default()
    })
    .await?;

    // Settlement pipeline. Domain modules register their post-payment hooks
    // on the callback registry; none ship in this service.
    let callbacks = CallbackRegistry::new();
    let dispatcher = Arc::new(PgEffectDispatcher::new(pool.clone(), callbacks));
    let verifier = WebhookVerifier::new(config.webhook.secret.clone());
    let guard = Arc::new(RedisIdempotencyStore::new(redis_pool.clone()));
    let audit = Arc::new(WebhookRepository::new(pool.clone()));
    let receiver = WebhookReceiver::new(
        verifier,
        guard,
        dispatcher.clone(),
        config.webhook.idempotency_ttl(),
    )
    .with_audit(audit);

    // Outbound gateway stack: checkout initiation and reconciliation
    let gateway = Arc::new(
        PaystackGateway::new(config.paystack.clone()).with_verify_cache(redis_pool.clone()),
    );
    let payments = Arc::new(InvoicePayments::new(gateway, pool.clone(), dispatcher));

    // Background aging of invoices and stale transactions; stale pendings are
    // reconciled against the gateway before they age out
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = BillingSweeper::new(
        pool.clone(),
        config.billing.sweep_interval(),
        config.billing.pending_timeout(),
    )
    .with_reconciler(payments);
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown_rx));

    // Start server
    let state = AppState {
        config: config.clone(),
        receiver: Arc::new(receiver),
    };
    let app = router(state);
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped, draining background tasks");
    shutdown_tx.send(true).ok();
    let _ = sweeper_handle.await;

    Ok(())
}

/// JSON logs in production, human-readable elsewhere. RUST_LOG overrides the
/// default `info` filter.
fn init_tracing(environment: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if environment == "production" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
