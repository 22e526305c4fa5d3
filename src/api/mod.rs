pub mod handlers;

pub use handlers::*;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use crate::service::{AllocationEngine, BalanceAggregator};

/// 共享状态：分配引擎与余额汇总
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AllocationEngine>,
    pub aggregator: BalanceAggregator,
}

/// 构建全部路由
pub fn router(state: AppState) -> Router {
    let customer_routes = Router::new()
        .route("/api/tenants/:tenant/customers", get(customer_overview))
        .route("/api/tenants/:tenant/customers/:customer/payments", post(apply_payment))
        .route(
            "/api/tenants/:tenant/customers/:customer/payments/:payment",
            delete(delete_payment),
        )
        .route("/api/tenants/:tenant/customers/:customer/sales", post(record_sale))
        .route("/api/tenants/:tenant/customers/:customer/summary", get(customer_summary))
        .route("/api/tenants/:tenant/customers/:customer/ledger", get(customer_ledger))
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .merge(customer_routes)
}
