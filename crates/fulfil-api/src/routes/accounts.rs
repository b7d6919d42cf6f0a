//! # Account Routes
//!
//! Balance, fee history, order listing, and operator deposits.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use fulfil_core::{Amount, Order, UserId};
use fulfil_ledger::{FeeHistoryEntry, LedgerResult};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_account_access, require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

/// Longest accepted deposit description.
const MAX_DESCRIPTION_LEN: usize = 200;

/// Build the accounts router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/accounts/:user_id/balance", get(get_balance))
        .route("/v1/accounts/:user_id/history", get(get_history))
        .route("/v1/accounts/:user_id/deposits", post(deposit))
        .route("/v1/accounts/:user_id/orders", get(list_orders))
}

/// Current balance of an account.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub user_id: Uuid,
    /// Balance in minor units.
    pub balance: i64,
}

/// Request to credit an account.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    /// Amount in minor units. Must be positive.
    pub amount: i64,
    #[serde(default)]
    pub description: Option<String>,
}

impl Validate for DepositRequest {
    fn validate(&self) -> Result<(), String> {
        if self.amount <= 0 {
            return Err(format!("amount must be positive, got {}", self.amount));
        }
        if let Some(d) = &self.description {
            if d.len() > MAX_DESCRIPTION_LEN {
                return Err(format!(
                    "description must be at most {MAX_DESCRIPTION_LEN} bytes"
                ));
            }
        }
        Ok(())
    }
}

/// GET /v1/accounts/:user_id/balance
#[utoipa::path(
    get,
    path = "/v1/accounts/{user_id}/balance",
    params(("user_id" = Uuid, Path, description = "Account holder")),
    responses(
        (status = 200, description = "Current balance", body = BalanceResponse),
        (status = 403, description = "Another user's account", body = crate::error::ErrorBody),
    ),
    tag = "accounts"
)]
pub async fn get_balance(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(user_id): Path<Uuid>,
) -> Result<Json<BalanceResponse>, AppError> {
    let user = UserId::from_uuid(user_id);
    require_account_access(&caller, user)?;
    let balance = state.ledger.balance(user).await?;
    Ok(Json(BalanceResponse {
        user_id,
        balance: balance.minor(),
    }))
}

/// GET /v1/accounts/:user_id/history: Fee history, oldest first.
#[utoipa::path(
    get,
    path = "/v1/accounts/{user_id}/history",
    params(("user_id" = Uuid, Path, description = "Account holder")),
    responses(
        (status = 200, description = "History rows", body = Vec<Object>),
        (status = 403, description = "Another user's account", body = crate::error::ErrorBody),
    ),
    tag = "accounts"
)]
pub async fn get_history(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<FeeHistoryEntry>>, AppError> {
    let user = UserId::from_uuid(user_id);
    require_account_access(&caller, user)?;
    Ok(Json(state.ledger.history(user).await?))
}

/// GET /v1/accounts/:user_id/orders: The user's orders, newest first.
#[utoipa::path(
    get,
    path = "/v1/accounts/{user_id}/orders",
    params(("user_id" = Uuid, Path, description = "Account holder")),
    responses(
        (status = 200, description = "Orders", body = Vec<Object>),
        (status = 403, description = "Another user's account", body = crate::error::ErrorBody),
    ),
    tag = "accounts"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Order>>, AppError> {
    let user = UserId::from_uuid(user_id);
    require_account_access(&caller, user)?;
    Ok(Json(state.orders.list_for_user(user)))
}

/// POST /v1/accounts/:user_id/deposits: Credit an account. Operators only.
#[utoipa::path(
    post,
    path = "/v1/accounts/{user_id}/deposits",
    params(("user_id" = Uuid, Path, description = "Account holder")),
    request_body = DepositRequest,
    responses(
        (status = 201, description = "Deposit recorded", body = Object),
        (status = 403, description = "Caller is not an operator", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid amount", body = crate::error::ErrorBody),
    ),
    tag = "accounts"
)]
pub async fn deposit(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(user_id): Path<Uuid>,
    body: Result<Json<DepositRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LedgerResult>), AppError> {
    require_role(&caller, Role::Operator)?;
    let req = extract_validated_json(body)?;
    let user = UserId::from_uuid(user_id);
    let description = req.description.as_deref().unwrap_or("deposit");
    let result = state
        .ledger
        .deposit(user, Amount::from_minor(req.amount), description)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_must_be_positive() {
        let req = DepositRequest {
            amount: 0,
            description: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn long_description_rejected() {
        let req = DepositRequest {
            amount: 100,
            description: Some("x".repeat(MAX_DESCRIPTION_LEN + 1)),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn ordinary_deposit_passes() {
        let req = DepositRequest {
            amount: 10_000,
            description: Some("top-up".into()),
        };
        assert!(req.validate().is_ok());
    }
}
