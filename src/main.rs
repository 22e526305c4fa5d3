use customer_ledger_rust::api::{self, AppState};
use customer_ledger_rust::config::StoreBackend;
use customer_ledger_rust::db::run_migrations;
use customer_ledger_rust::{
    create_pool, AllocationEngine, AppConfig, BalanceAggregator, LedgerStore, MemoryLedgerStore,
    PgLedgerStore,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::load()?;
    info!("Starting server with config: {:?}", config);

    let store: Arc<dyn LedgerStore> = match config.database.backend {
        StoreBackend::Postgres => {
            let pool = create_pool(&config.database).await?;
            info!("Database pool created");
            if config.database.run_migrations {
                run_migrations(&pool).await?;
            }
            Arc::new(PgLedgerStore::new(pool))
        }
        StoreBackend::Memory => {
            info!("Using in-memory ledger store, data is not persisted");
            Arc::new(MemoryLedgerStore::new())
        }
    };

    let state = AppState {
        engine: Arc::new(AllocationEngine::new(store.clone(), config.allocation.clone())),
        aggregator: BalanceAggregator::new(store),
    };

    let app = api::router(state).layer(ServiceBuilder::new());

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST   /api/tenants/:tenant/customers/:customer/payments");
    info!("  DELETE /api/tenants/:tenant/customers/:customer/payments/:payment");
    info!("  POST   /api/tenants/:tenant/customers/:customer/sales");
    info!("  GET    /api/tenants/:tenant/customers/:customer/summary");
    info!("  GET    /api/tenants/:tenant/customers/:customer/ledger");
    info!("  GET    /api/tenants/:tenant/customers");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
