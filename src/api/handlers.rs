use crate::api::AppState;
use crate::error::LedgerError;
use crate::models::{
    CustomerBalanceSummary, CustomerKey, LedgerRow, LedgerView, PaymentMethod,
};
use crate::service::{PaymentOutcome, PaymentRequest, SaleOutcome, SaleRequest};
use axum::{
    extract::{rejection::JsonRejection, Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 付款请求体
#[derive(Debug, Deserialize)]
pub struct PaymentBody {
    #[serde(default)]
    pub supplier_name: String,
    pub amount: BigDecimal,
    pub date: String,
    #[serde(default)]
    pub method: PaymentMethod,
    pub notes: Option<String>,
}

/// 销售请求体
#[derive(Debug, Deserialize)]
pub struct SaleBody {
    #[serde(default)]
    pub supplier_name: String,
    pub amount: BigDecimal,
    pub date: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub supplier: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    pub supplier: Option<String>,
    pub include_supplier_receipts: Option<bool>,
}

/// 响应体
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

fn ok<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    let response = ApiResponse {
        success: true,
        message: message.into(),
        data: Some(data),
    };
    (StatusCode::OK, Json(response)).into_response()
}

fn error_response(e: LedgerError) -> Response {
    let status = match &e {
        LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
        LedgerError::ConcurrencyConflict { .. } | LedgerError::PaymentAllocated(_) => {
            StatusCode::CONFLICT
        }
        LedgerError::PaymentNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::StoreCommitFailure(_) | LedgerError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let response = ApiResponse::<()> {
        success: false,
        message: format!("Error: {}", e),
        data: None,
    };
    (status, Json(response)).into_response()
}

/// 请求体无法解析 (金额格式错误等) 按校验错误处理
fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, LedgerError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| LedgerError::validation(rejection.body_text()))
}

fn parse_date(raw: &str) -> Result<NaiveDate, LedgerError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| LedgerError::validation(format!("malformed date '{raw}': {e}")))
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 客户付款 (触发先进先出分配)
pub async fn apply_payment(
    State(state): State<AppState>,
    Path((tenant_id, customer)): Path<(Uuid, String)>,
    payload: Result<Json<PaymentBody>, JsonRejection>,
) -> Response {
    let (body, date) = match parse_body(payload)
        .and_then(|body| parse_date(&body.date).map(|date| (body, date)))
    {
        Ok(parsed) => parsed,
        Err(e) => return error_response(e),
    };
    let req = PaymentRequest {
        key: CustomerKey::new(tenant_id, customer),
        supplier_name: body.supplier_name,
        amount: body.amount,
        date,
        method: body.method,
        notes: body.notes,
    };

    match state.engine.apply_payment(req).await {
        Ok(outcome) => ok::<PaymentOutcome>(
            format!(
                "Payment applied to {} invoices",
                outcome.updated_invoices.len()
            ),
            outcome,
        ),
        Err(e) => error_response(e),
    }
}

/// 删除付款 (仅允许未被使用的付款)
pub async fn delete_payment(
    State(state): State<AppState>,
    Path((tenant_id, customer, payment_id)): Path<(Uuid, String, Uuid)>,
) -> Response {
    let key = CustomerKey::new(tenant_id, customer);
    match state.engine.delete_payment(&key, payment_id).await {
        Ok(()) => ok(format!("Payment {payment_id} deleted"), payment_id),
        Err(e) => error_response(e),
    }
}

/// 新销售发票 (先抵扣贷方余额)
pub async fn record_sale(
    State(state): State<AppState>,
    Path((tenant_id, customer)): Path<(Uuid, String)>,
    payload: Result<Json<SaleBody>, JsonRejection>,
) -> Response {
    let (body, date) = match parse_body(payload)
        .and_then(|body| parse_date(&body.date).map(|date| (body, date)))
    {
        Ok(parsed) => parsed,
        Err(e) => return error_response(e),
    };
    let req = SaleRequest {
        key: CustomerKey::new(tenant_id, customer),
        supplier_name: body.supplier_name,
        amount: body.amount,
        date,
        description: body.description,
    };

    match state.engine.record_sale(req).await {
        Ok(outcome) => ok::<SaleOutcome>(
            format!("Sale recorded with status {}", outcome.invoice.status),
            outcome,
        ),
        Err(e) => error_response(e),
    }
}

pub async fn customer_summary(
    State(state): State<AppState>,
    Path((tenant_id, customer)): Path<(Uuid, String)>,
    Query(query): Query<SummaryQuery>,
) -> Response {
    let key = CustomerKey::new(tenant_id, customer);
    match state
        .aggregator
        .compute_summary(&key, query.supplier.as_deref())
        .await
    {
        Ok(summary) => ok::<CustomerBalanceSummary>("OK", summary),
        Err(e) => error_response(e),
    }
}

pub async fn customer_ledger(
    State(state): State<AppState>,
    Path((tenant_id, customer)): Path<(Uuid, String)>,
    Query(query): Query<LedgerQuery>,
) -> Response {
    let key = CustomerKey::new(tenant_id, customer);
    let view = LedgerView {
        include_supplier_receipts: query
            .include_supplier_receipts
            .unwrap_or(LedgerView::default().include_supplier_receipts),
    };
    match state
        .aggregator
        .compute_ledger(&key, query.supplier.as_deref(), view)
        .await
    {
        Ok(rows) => ok::<Vec<LedgerRow>>(format!("{} ledger rows", rows.len()), rows),
        Err(e) => error_response(e),
    }
}

/// 客户列表汇总
pub async fn customer_overview(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Response {
    match state.aggregator.customer_overview(tenant_id).await {
        Ok(summaries) => ok(format!("{} customers", summaries.len()), summaries),
        Err(e) => error_response(e),
    }
}
