//! Balance endpoints

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use std::sync::Arc;

use crate::middleware::auth::Identity;
use crate::models::*;
use crate::ApiState;

pub fn router() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/", get(get_balance))
        .route("/deposit", post(deposit))
        .route("/transactions", get(list_transactions))
}

/// Deposit funds into the caller's balance
#[utoipa::path(
    post,
    path = "/api/v1/balance/deposit",
    request_body = DepositRequest,
    responses(
        (status = 200, description = "Updated balance", body = ReceiptView),
        (status = 400, description = "Invalid amount or missing idempotency key")
    ),
    tag = "balance",
    security(("bearer" = []))
)]
pub async fn deposit(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
    Json(input): Json<DepositRequest>,
) -> Result<Json<ApiResponse<ReceiptView>>, ApiError> {
    let receipt = state.platform.ledger.deposit(
        identity.user_id,
        input.amount,
        input.method,
        &input.idempotency_key,
    )?;
    Ok(Json(ApiResponse::success(receipt.into())))
}

/// Current balance and lifetime totals
#[utoipa::path(
    get,
    path = "/api/v1/balance",
    responses(
        (status = 200, description = "Account balance", body = BalanceView),
        (status = 404, description = "No account yet")
    ),
    tag = "balance",
    security(("bearer" = []))
)]
pub async fn get_balance(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiResponse<BalanceView>>, ApiError> {
    let summary = state.platform.ledger.balance(identity.user_id)?;
    Ok(Json(ApiResponse::success(summary.into())))
}

/// Transaction history, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/balance/transactions",
    responses(
        (status = 200, description = "Transactions", body = [TransactionView]),
        (status = 404, description = "No account yet")
    ),
    tag = "balance",
    security(("bearer" = []))
)]
pub async fn list_transactions(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiResponse<Vec<TransactionView>>>, ApiError> {
    let txns = state.platform.ledger.transactions(identity.user_id)?;
    Ok(Json(ApiResponse::success(
        txns.into_iter().map(Into::into).collect(),
    )))
}
